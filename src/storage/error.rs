//! Storage error types with transient classification.
//!
//! "Does not exist" is never an error: backends answer `Ok(false)`. Errors are either
//! transient (backend unreachable, throttled, 5xx) or permanent (bad path, auth).

/// Error from a storage backend.
#[derive(Debug)]
pub struct StorageError {
    pub kind: StorageErrorKind,
    /// Path the operation was addressed to
    pub path: String,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    pub message: String,
}

impl StorageError {
    pub fn unsupported_scheme(path: &str) -> Self {
        Self {
            kind: StorageErrorKind::UnsupportedScheme,
            path: path.to_string(),
            status_code: None,
            message: "no storage backend handles this path".to_string(),
        }
    }

    pub fn not_configured(path: &str, backend: &str) -> Self {
        Self {
            kind: StorageErrorKind::NotConfigured,
            path: path.to_string(),
            status_code: None,
            message: format!("{} backend is not configured", backend),
        }
    }

    pub fn network(path: &str, message: String) -> Self {
        Self {
            kind: StorageErrorKind::Unavailable,
            path: path.to_string(),
            status_code: None,
            message,
        }
    }

    pub fn io(path: &str, err: std::io::Error) -> Self {
        Self {
            kind: StorageErrorKind::Io,
            path: path.to_string(),
            status_code: None,
            message: err.to_string(),
        }
    }

    pub fn http(path: &str, status_code: u16, message: String) -> Self {
        Self {
            kind: classify_http_status(status_code),
            path: path.to_string(),
            status_code: Some(status_code),
            message,
        }
    }

    /// Whether a retry by the invoking scheduler could succeed.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(
                f,
                "{} (HTTP {}) for {}: {}",
                self.kind, code, self.path, self.message
            ),
            None => write!(f, "{} for {}: {}", self.kind, self.path, self.message),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// Backend unreachable, throttled or failing server-side
    Unavailable,
    /// Request rejected (auth, malformed object name)
    Rejected,
    /// Local filesystem error other than not-found
    Io,
    /// Path scheme has no backend
    UnsupportedScheme,
    /// Path scheme is known but its backend was not set up
    NotConfigured,
}

impl StorageErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "Storage unavailable"),
            Self::Rejected => write!(f, "Storage request rejected"),
            Self::Io => write!(f, "Storage I/O error"),
            Self::UnsupportedScheme => write!(f, "Unsupported storage scheme"),
            Self::NotConfigured => write!(f, "Storage backend not configured"),
        }
    }
}

pub fn classify_http_status(status: u16) -> StorageErrorKind {
    match status {
        408 | 429 => StorageErrorKind::Unavailable,
        400..=499 => StorageErrorKind::Rejected,
        _ => StorageErrorKind::Unavailable,
    }
}

//! Search cluster error types with retry classification.

use std::time::Duration;

/// Error from search cluster calls.
#[derive(Debug)]
pub struct SearchError {
    pub kind: SearchErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    pub message: String,
}

impl SearchError {
    pub fn http(status_code: u16, message: String) -> Self {
        Self {
            kind: classify_http_status(status_code),
            status_code: Some(status_code),
            message,
        }
    }

    pub fn network_error(message: String) -> Self {
        Self {
            kind: SearchErrorKind::NetworkError,
            status_code: None,
            message,
        }
    }

    pub fn parse_error(message: String) -> Self {
        Self {
            kind: SearchErrorKind::ParseError,
            status_code: None,
            message,
        }
    }

    pub fn index_not_found(index: &str) -> Self {
        Self {
            kind: SearchErrorKind::NotFound,
            status_code: Some(404),
            message: format!("index {} does not exist", index),
        }
    }

    /// Some documents in a bulk request were rejected.
    pub fn bulk_rejected(index: &str, failed: usize) -> Self {
        Self {
            kind: SearchErrorKind::BulkRejected,
            status_code: None,
            message: format!("{} documents were rejected by index {}", failed, index),
        }
    }

    pub fn shard_transfer_timeout(index: &str, attempts: u32, interval: Duration) -> Self {
        Self {
            kind: SearchErrorKind::ShardTransferTimeout,
            status_code: None,
            message: format!(
                "shards of {} did not transfer off loading nodes after {} checks {}s apart",
                index,
                attempts,
                interval.as_secs()
            ),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for SearchError {}

/// Classification of search cluster errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchErrorKind {
    /// Rate limited (429) - transient
    RateLimited,
    /// Server error (500, 502, 503, 504) - transient
    ServerError,
    /// Index, repository or snapshot missing
    NotFound,
    /// Client error (400, 401, 403) - permanent
    ClientError,
    /// Connection failed or timed out - transient
    NetworkError,
    /// Response parsing error
    ParseError,
    /// Bulk request partially rejected
    BulkRejected,
    /// Data never left the loading nodes
    ShardTransferTimeout,
}

impl SearchErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::NetworkError
        )
    }
}

impl std::fmt::Display for SearchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "Rate limited"),
            Self::ServerError => write!(f, "Server error"),
            Self::NotFound => write!(f, "Not found"),
            Self::ClientError => write!(f, "Client error"),
            Self::NetworkError => write!(f, "Network error"),
            Self::ParseError => write!(f, "Parse error"),
            Self::BulkRejected => write!(f, "Bulk request rejected"),
            Self::ShardTransferTimeout => write!(f, "Shard transfer timeout"),
        }
    }
}

/// Parse HTTP status code into error kind.
pub fn classify_http_status(status: u16) -> SearchErrorKind {
    match status {
        429 => SearchErrorKind::RateLimited,
        404 => SearchErrorKind::NotFound,
        500 | 502 | 503 | 504 => SearchErrorKind::ServerError,
        400..=499 => SearchErrorKind::ClientError,
        _ => SearchErrorKind::ServerError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SearchErrorKind::RateLimited.is_transient());
        assert!(SearchErrorKind::ServerError.is_transient());
        assert!(SearchErrorKind::NetworkError.is_transient());
        assert!(!SearchErrorKind::ClientError.is_transient());
        assert!(!SearchErrorKind::BulkRejected.is_transient());
        assert!(!SearchErrorKind::ShardTransferTimeout.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), SearchErrorKind::RateLimited);
        assert_eq!(classify_http_status(404), SearchErrorKind::NotFound);
        assert_eq!(classify_http_status(503), SearchErrorKind::ServerError);
        assert_eq!(classify_http_status(400), SearchErrorKind::ClientError);
        assert_eq!(classify_http_status(401), SearchErrorKind::ClientError);
    }

    #[test]
    fn test_display_includes_status() {
        let err = SearchError::http(400, "invalid_index_name_exception".to_string());
        assert_eq!(
            err.to_string(),
            "Client error (HTTP 400): invalid_index_name_exception"
        );
    }
}

//! Shared utility functions used across the codebase.

/// Parse an environment variable as a boolean, returning `default` if unset.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// everything else maps to `false`.
pub fn env_var_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

/// Parse a source-path argument: a JSON list of paths or a single path.
pub fn parse_source_paths(raw: &str) -> Result<Vec<String>, String> {
    let trimmed = raw.trim();
    let paths: Vec<String> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| format!("invalid path list {}: {}", raw, e))?
    } else {
        vec![trimmed.to_string()]
    };
    let paths: Vec<String> = paths
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        return Err("no source path given".to_string());
    }
    Ok(paths)
}

/// Whether a path names a file pattern rather than a single file.
pub fn is_glob(path: &str) -> bool {
    path.contains('*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_paths_accept_json_lists_and_single_paths() {
        assert_eq!(
            parse_source_paths(r#"["gs://b/a.vcf", "gs://b/c.vcf"]"#).unwrap(),
            vec!["gs://b/a.vcf", "gs://b/c.vcf"]
        );
        assert_eq!(parse_source_paths(" /data/x.vcf ").unwrap(), vec!["/data/x.vcf"]);
        assert!(parse_source_paths("[]").is_err());
        assert!(parse_source_paths("[\"unterminated").is_err());
    }

    #[test]
    fn globs() {
        assert!(is_glob("gs://b/shard-*.vcf.gz"));
        assert!(!is_glob("gs://b/all.vcf.gz"));
    }
}

use std::path::Path;

use crate::config::schema::{VaultConfig, LOG_MESSAGE_MAX_LEN};
use crate::error::ConfigError;

/// Loads a config file; `.yaml`/`.yml` files are parsed as YAML, anything
/// else as JSON.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VaultConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        load_config_from_yaml(&content)
    } else {
        load_config_from_str(&content)
    }
}

pub fn load_config_from_str(content: &str) -> Result<VaultConfig, ConfigError> {
    let config: VaultConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_yaml(content: &str) -> Result<VaultConfig, ConfigError> {
    let config: VaultConfig = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &VaultConfig) -> Result<(), ConfigError> {
    if config.lock_timeout_secs <= 0 {
        return Err(ConfigError::Validation {
            message: "lock_timeout_secs must be positive".to_string(),
        });
    }

    if config.log_message_max_len == 0 || config.log_message_max_len > LOG_MESSAGE_MAX_LEN {
        return Err(ConfigError::Validation {
            message: format!(
                "log_message_max_len must be between 1 and {}",
                LOG_MESSAGE_MAX_LEN
            ),
        });
    }

    if config.upload_chunk_size == 0 {
        return Err(ConfigError::Validation {
            message: "upload_chunk_size must be positive".to_string(),
        });
    }

    if config.precheck_refresh_secs <= 0 {
        return Err(ConfigError::Validation {
            message: "precheck_refresh_secs must be positive".to_string(),
        });
    }

    for pattern in &config.backup_exclude_tables {
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: "empty pattern".to_string(),
            });
        }
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            });
        }
    }

    if let Some(reporting) = &config.error_reporting {
        if !reporting.url.starts_with("http://") && !reporting.url.starts_with("https://") {
            return Err(ConfigError::Validation {
                message: format!(
                    "error_reporting.url must be an http(s) URL, got '{}'",
                    reporting.url
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.lock_timeout_secs, 1800);
        assert_eq!(config.log_message_max_len, 1333);
        assert_eq!(config.upload_chunk_size, 100 * 1024 * 1024);
        assert!(config.backup_exclude_tables.is_empty());
        assert!(!config.allow_missing_plugins);
        assert!(!config.debug);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = load_config_from_str(r#"{"lock_timeout_secs": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_rejects_oversized_log_length() {
        let err = load_config_from_str(r#"{"log_message_max_len": 5000}"#).unwrap_err();
        assert!(err.to_string().contains("log_message_max_len"));
    }

    #[test]
    fn test_rejects_bad_table_pattern() {
        let err = load_config_from_str(r#"{"backup_exclude_tables": ["logs_[a"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn test_rejects_non_http_reporting_url() {
        let err = load_config_from_str(r#"{"error_reporting": {"url": "ftp://example.com"}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let err = load_config_from_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(_)));
    }

    #[test]
    fn test_load_yaml_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "lock_timeout_secs: 60").unwrap();
        writeln!(file, "backup_exclude_tables:").unwrap();
        writeln!(file, "  - \"log_*\"").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.lock_timeout_secs, 60);
        assert_eq!(config.backup_exclude_tables, vec!["log_*"]);
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }
}

//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config(
            r#"
            [[hosts]]
            hostname = "a.test"
            [[hosts]]
            hostname = "a.test"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation failed: duplicate virtual host 'a.test'"
        );
    }

    #[test]
    fn syntax_errors_are_parse_errors() {
        let err = parse_config("hosts = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/proxy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn shipped_config_is_valid() {
        let config = parse_config(include_str!("../../proxy.toml")).unwrap();
        let hostnames: Vec<_> = config.hosts.iter().map(|h| h.hostname.as_str()).collect();
        assert_eq!(
            hostnames,
            ["ota.hubble.in", "cs.hubble.in", "api.hubble.in", "bootstrap.hubble.in"]
        );
        assert!(config.hosts[0].routes.is_empty());
    }
}

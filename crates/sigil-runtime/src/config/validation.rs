//! Configuration validation utilities.

use sigil_core::DispatchConfig;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LogRotation, LoggingConfig, SigilConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SigilConfig) -> ConfigResult<()> {
    validate_dispatch_config(&config.dispatch)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// The separator must split tokens without colliding with their content.
fn validate_dispatch_config(config: &DispatchConfig) -> ConfigResult<()> {
    let sep = config.separator;
    if sep.is_alphanumeric() || sep == '_' {
        return Err(ConfigError::validation(format!(
            "Separator {sep:?} would split inside aliases"
        )));
    }
    if sep == '"' || sep == '\'' || sep == '\\' {
        return Err(ConfigError::validation(format!(
            "Separator {sep:?} is reserved for quoting"
        )));
    }
    if sep.is_control() && !sep.is_whitespace() {
        return Err(ConfigError::validation("Separator must be printable"));
    }
    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if config.rotation != LogRotation::Never && config.output != LogOutput::File {
        return Err(ConfigError::validation(
            "Log rotation only applies to file output",
        ));
    }

    #[cfg(not(feature = "json-log"))]
    if config.format == super::schema::LogFormat::Json {
        return Err(ConfigError::validation(
            "JSON log format requires the 'json-log' feature",
        ));
    }

    if let Some(target) = config
        .filters
        .keys()
        .find(|t| t.is_empty() || t.contains(char::is_whitespace) || t.contains('='))
    {
        return Err(ConfigError::validation(format!(
            "Invalid log filter target: {target:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&SigilConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_separator() {
        let mut config = SigilConfig::default();
        for sep in ['.', '/', ':', '\t'] {
            config.dispatch.separator = sep;
            assert!(validate_config(&config).is_ok(), "{sep:?}");
        }
        for sep in ['a', '7', '"', '\\', '\u{7}'] {
            config.dispatch.separator = sep;
            assert!(validate_config(&config).is_err(), "{sep:?}");
        }
    }

    #[test]
    fn test_validate_file_output() {
        let mut config = SigilConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some(PathBuf::from("logs/sigil.log"));
        config.logging.rotation = LogRotation::Daily;
        assert!(validate_config(&config).is_ok());

        config.logging.output = LogOutput::Stderr;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_filter_targets() {
        let mut config = SigilConfig::default();
        config
            .logging
            .filters
            .insert("sigil framework".to_string(), Default::default());
        assert!(validate_config(&config).is_err());
    }
}

use crate::config::Config;
use crate::error::ConfigError;

const ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

/// Cross-field and format rules the derive cannot express.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates environment name
    pub fn validate_environment(env: &str) -> Result<(), ConfigError> {
        if !ENVIRONMENTS.contains(&env) {
            return Err(ConfigError::Invalid(format!(
                "Invalid environment '{}'. Must be one of: {:?}",
                env, ENVIRONMENTS
            )));
        }

        Ok(())
    }

    /// A CORS origin is a scheme plus host, with no path.
    pub fn validate_trusted_origin(origin: &str) -> Result<(), ConfigError> {
        let rest = origin
            .strip_prefix("http://")
            .or_else(|| origin.strip_prefix("https://"))
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Trusted origin '{}' must start with 'http://' or 'https://'",
                    origin
                ))
            })?;

        if rest.is_empty() || rest.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "Trusted origin '{}' must be a bare scheme and host",
                origin
            )));
        }

        Ok(())
    }

    pub fn validate_sender(sender: &str) -> Result<(), ConfigError> {
        if sender.trim().is_empty() || !sender.contains('@') {
            return Err(ConfigError::Invalid(format!(
                "SMTP sender '{}' must contain an email address",
                sender
            )));
        }

        Ok(())
    }

    pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
        Self::validate_environment(&config.env)?;
        for origin in &config.cors_trusted_origins {
            Self::validate_trusted_origin(origin)?;
        }
        Self::validate_sender(&config.smtp_sender)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_environment() {
        assert!(ConfigValidator::validate_environment("development").is_ok());
        assert!(ConfigValidator::validate_environment("production").is_ok());
    }

    #[test]
    fn test_invalid_environment() {
        assert!(ConfigValidator::validate_environment("invalid").is_err());
        assert!(ConfigValidator::validate_environment("Production").is_err());
    }

    #[test]
    fn test_valid_trusted_origin() {
        assert!(ConfigValidator::validate_trusted_origin("http://localhost:9000").is_ok());
        assert!(ConfigValidator::validate_trusted_origin("https://example.com").is_ok());
    }

    #[test]
    fn test_invalid_trusted_origin() {
        assert!(ConfigValidator::validate_trusted_origin("").is_err());
        assert!(ConfigValidator::validate_trusted_origin("localhost:9000").is_err());
        assert!(ConfigValidator::validate_trusted_origin("https://").is_err());
        assert!(ConfigValidator::validate_trusted_origin("https://example.com/app").is_err());
    }

    #[test]
    fn test_sender() {
        assert!(ConfigValidator::validate_sender("Greenlight <no-reply@example.com>").is_ok());
        assert!(ConfigValidator::validate_sender("").is_err());
        assert!(ConfigValidator::validate_sender("nobody").is_err());
    }
}

use clap::{ArgAction, Parser};
use validator::Validate;

use crate::config_validator::ConfigValidator;
use crate::error::ConfigError;
use crate::rate_limit_config::LimiterSettings;

/// Runtime configuration, read from flags with environment fallbacks.
#[derive(Debug, Clone, Parser, Validate)]
#[command(name = "greenlight", version, about = "Greenlight JSON API server")]
pub struct Config {
    /// API server port
    #[arg(long, env = "PORT", default_value_t = 4000)]
    #[validate(range(min = 1))]
    pub port: u16,

    /// Environment (development|staging|production)
    #[arg(long, env = "GREENLIGHT_ENV", default_value = "development")]
    pub env: String,

    /// Rate limiter maximum requests per second
    #[arg(long = "limiter-rps", env = "LIMITER_RPS", default_value_t = 2.0)]
    #[validate(range(exclusive_min = 0.0))]
    pub limiter_rps: f64,

    /// Rate limiter maximum burst
    #[arg(long = "limiter-burst", env = "LIMITER_BURST", default_value_t = 4)]
    #[validate(range(min = 1))]
    pub limiter_burst: u32,

    /// Enable rate limiter
    #[arg(
        long = "limiter-enabled",
        env = "LIMITER_ENABLED",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub limiter_enabled: bool,

    /// Trusted CORS origins (space separated)
    #[arg(
        long = "cors-trusted-origins",
        env = "CORS_TRUSTED_ORIGINS",
        value_delimiter = ' ',
        num_args = 0..
    )]
    pub cors_trusted_origins: Vec<String>,

    /// SMTP sender
    #[arg(
        long = "smtp-sender",
        env = "SMTP_SENDER",
        default_value = "Greenlight <no-reply@greenlight.local>"
    )]
    pub smtp_sender: String,

    /// bcrypt work factor for new passwords
    #[arg(long = "bcrypt-cost", env = "BCRYPT_COST", default_value_t = 12)]
    #[validate(range(min = 4, max = 31))]
    pub bcrypt_cost: u32,
}

impl Config {
    /// Parses the process arguments and environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::parse();
        config.check()?;
        Ok(config)
    }

    /// Field rules first, then the cross-field rules.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        ConfigValidator::validate_config(self)
    }

    pub fn limiter_settings(&self) -> LimiterSettings {
        LimiterSettings {
            requests_per_second: self.limiter_rps,
            burst: self.limiter_burst,
            enabled: self.limiter_enabled,
        }
    }
}

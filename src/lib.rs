pub mod auth;
pub mod background;
pub mod config;
pub mod config_validator;
pub mod data;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod mailer;
pub mod metrics;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod server;
pub mod token_bucket;
pub mod validation;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use handlers::{AppSettings, AppState};
pub use server::{create_app, Server, ServerError, ServerState};

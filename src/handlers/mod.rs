//! HTTP handlers and the state they share.

pub mod movies;
pub mod tokens;
pub mod users;

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::data::Models;
use crate::error::{AppError, AppResult};
use crate::mailer::Mailer;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::rate_limit_config::LimiterSettings;
use crate::rate_limiter::ClientRegistry;
use crate::validation::Validator;

/// Settings handlers read at request time.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub env: String,
    pub bcrypt_cost: u32,
    pub cors_trusted_origins: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            cors_trusted_origins: Vec::new(),
        }
    }
}

impl From<&Config> for AppSettings {
    fn from(config: &Config) -> Self {
        Self {
            env: config.env.clone(),
            bcrypt_cost: config.bcrypt_cost,
            cors_trusted_origins: config.cors_trusted_origins.clone(),
        }
    }
}

/// Application state shared by the pipeline and every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: AppSettings,
    pub models: Models,
    pub registry: Arc<ClientRegistry>,
    pub background: BackgroundTasks,
    pub mailer: Arc<dyn Mailer>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        limiter: LimiterSettings,
        models: Models,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            settings,
            models,
            registry: Arc::new(ClientRegistry::new(limiter)),
            background: BackgroundTasks::new(),
            mailer,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn from_config(config: &Config, models: Models, mailer: Arc<dyn Mailer>) -> Self {
        Self::new(config.into(), config.limiter_settings(), models, mailer)
    }
}

/// Liveness probe with the running environment and version.
pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.settings.env,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

pub async fn debug_vars(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Ids are positive integers; anything else cannot name a record.
pub(crate) fn parse_id(raw: &str) -> AppResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}

pub(crate) fn read_string(qs: &HashMap<String, String>, key: &str, default: &str) -> String {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}

pub(crate) fn read_csv(qs: &HashMap<String, String>, key: &str) -> Vec<String> {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Reads an integer parameter, recording a validation error when it does
/// not parse.
pub(crate) fn read_int(
    qs: &HashMap<String, String>,
    key: &str,
    default: i64,
    v: &mut Validator,
) -> i64 {
    match qs.get(key) {
        Some(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
        _ => default,
    }
}

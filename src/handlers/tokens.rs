use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::data::users::{validate_email, validate_password_plaintext};
use crate::data::{Scope, StoreError, Token};
use crate::error::{AppError, AppResult};
use crate::validation::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAuthenticationTokenInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Exchanges an email and password for a 24 hour bearer token.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    payload: Result<Json<CreateAuthenticationTokenInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let user = match state.models.users.get_by_email(&input.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::InvalidCredentials),
        Err(err) => return Err(err.into()),
    };

    let password = user.password.clone();
    let matches = tokio::task::spawn_blocking(move || password.matches(&input.password))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)?;
    if !matches {
        return Err(AppError::InvalidCredentials);
    }

    let token = Token::generate(user.id, Duration::hours(24), Scope::Authentication);
    state.models.tokens.insert(&token).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    ))
}

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::AppState;
use crate::data::tokens::validate_token_plaintext;
use crate::data::users::validate_password_plaintext;
use crate::data::{Password, Scope, StoreError, Token, User};
use crate::error::{AppError, AppResult};
use crate::mailer::welcome_email;
use crate::validation::Validator;

/// Permission every new account starts with.
pub const DEFAULT_PERMISSION: &str = "movies:read";

/// How long an activation token stays usable.
pub fn activation_ttl() -> Duration {
    Duration::days(3)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserInput {
    #[serde(default)]
    pub token: String,
}

pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;

    let mut user = User::new(input.name, input.email, Password::default());

    let mut v = Validator::new();
    user.validate(&mut v);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    // Hashing is CPU bound.
    let cost = state.settings.bcrypt_cost;
    user.password = tokio::task::spawn_blocking(move || Password::set(&input.password, cost))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)?;

    match state.models.users.insert(&mut user).await {
        Ok(()) => {}
        Err(StoreError::DuplicateEmail) => {
            let mut v = Validator::new();
            v.add_error("email", "a user with this email address already exists");
            return Err(AppError::FailedValidation(v.errors().clone()));
        }
        Err(err) => return Err(err.into()),
    }

    state
        .models
        .permissions
        .add_for_user(user.id, &[DEFAULT_PERMISSION])
        .await?;

    let token = Token::generate(user.id, activation_ttl(), Scope::Activation);
    state.models.tokens.insert(&token).await?;

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let email = welcome_email(&user, &token);
    state.background.spawn("welcome_email", async move {
        if let Err(err) = mailer.send(&recipient, &email).await {
            error!(error = %err, recipient = %recipient, "Failed to send welcome email");
        }
    });

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

pub async fn activate_user(
    State(state): State<AppState>,
    payload: Result<Json<ActivateUserInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.finish()?;

    let mut user = match state
        .models
        .users
        .get_for_token(Scope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            let mut v = Validator::new();
            v.add_error("token", "invalid or expired activation token");
            return Err(AppError::FailedValidation(v.errors().clone()));
        }
        Err(err) => return Err(err.into()),
    };

    user.activated = true;
    state.models.users.update(&mut user).await?;

    state
        .models
        .tokens
        .delete_all_for_user(Scope::Activation, user.id)
        .await?;

    Ok(Json(json!({ "user": user })))
}

//! Bearer-token authentication and the authorization gates.
//!
//! [`authenticate`] runs for every request and always attaches a
//! [`Principal`]: anonymous when no credentials were sent, the token owner
//! otherwise. The gates run per route, in a fixed order: authenticated,
//! then activated, then permitted. Each gate performs the checks of the
//! gates before it, so a cheaper check always short-circuits before a
//! permission lookup.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::data::tokens::validate_token_plaintext;
use crate::data::{PermissionStore, Scope, StoreError, User, UserStore};
use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::identity::{self, Principal};
use crate::validation::Validator;

/// Turns an `Authorization` header value into a principal.
///
/// A missing header is not an error. Anything other than
/// `Bearer <token>` with a well-formed token is rejected before the user
/// store is consulted, and an unknown or expired token is rejected with
/// the same error as a malformed one.
pub async fn resolve_principal(
    users: &dyn UserStore,
    header: Option<&HeaderValue>,
) -> AppResult<Principal> {
    let Some(header) = header else {
        return Ok(Principal::Anonymous);
    };

    let value = header
        .to_str()
        .map_err(|_| AppError::InvalidAuthenticationToken)?;

    let parts: Vec<&str> = value.split(' ').collect();
    let token = match parts.as_slice() {
        ["Bearer", token] => *token,
        _ => return Err(AppError::InvalidAuthenticationToken),
    };

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    if !v.valid() {
        return Err(AppError::InvalidAuthenticationToken);
    }

    match users.get_for_token(Scope::Authentication, token).await {
        Ok(user) => Ok(Principal::user(user)),
        Err(StoreError::NotFound) => Err(AppError::InvalidAuthenticationToken),
        Err(err) => Err(AppError::internal(err)),
    }
}

/// Auth chain middleware.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header = request.headers().get(header::AUTHORIZATION).cloned();

    let mut response = match resolve_principal(state.models.users.as_ref(), header.as_ref()).await {
        Ok(principal) => {
            identity::set_principal(&mut request, principal);
            next.run(request).await
        }
        Err(err) => {
            debug!(error = %err, "Rejected authentication credentials");
            err.into_response()
        }
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

pub fn check_authenticated(principal: &Principal) -> AppResult<&User> {
    principal.as_user().ok_or(AppError::AuthenticationRequired)
}

pub fn check_activated(principal: &Principal) -> AppResult<&User> {
    let user = check_authenticated(principal)?;
    if !user.activated {
        return Err(AppError::InactiveAccount);
    }
    Ok(user)
}

/// Runs the full gate sequence for `code`. Permissions are fetched fresh
/// on every call.
pub async fn check_permission(
    permissions: &dyn PermissionStore,
    principal: &Principal,
    code: &str,
) -> AppResult<()> {
    let user = check_activated(principal)?;

    let granted = permissions
        .get_all_for_user(user.id)
        .await
        .map_err(AppError::internal)?;

    if !granted.include(code) {
        return Err(AppError::NotPermitted);
    }
    Ok(())
}

pub async fn require_authenticated(request: Request, next: Next) -> Response {
    let checked = check_authenticated(identity::principal(&request)).map(|_| ());
    match checked {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

pub async fn require_activated(request: Request, next: Next) -> Response {
    let checked = check_activated(identity::principal(&request)).map(|_| ());
    match checked {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

/// State for a permission gate: the code it demands and where to look
/// grants up.
#[derive(Clone)]
pub struct PermissionGate {
    pub code: &'static str,
    pub permissions: Arc<dyn PermissionStore>,
}

impl PermissionGate {
    pub fn new(code: &'static str, permissions: Arc<dyn PermissionStore>) -> Self {
        Self { code, permissions }
    }
}

pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request,
    next: Next,
) -> Response {
    let principal = identity::principal(&request).clone();

    match check_permission(gate.permissions.as_ref(), &principal, gate.code).await {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

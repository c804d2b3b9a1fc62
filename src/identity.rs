//! The principal carried alongside each request.
//!
//! The auth chain attaches exactly one [`Principal`] to every request it
//! lets through. Reading it before that happened means the pipeline was
//! wired wrongly, so the accessors panic instead of defaulting to
//! anonymous; the panic guard turns that into a 500.

use axum::extract::Request;
use std::sync::Arc;

use crate::data::User;

#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    User(Arc<User>),
}

impl Principal {
    pub fn user(user: User) -> Self {
        Principal::User(Arc::new(user))
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::User(user) => Some(user),
        }
    }
}

/// Attaches `principal`, replacing any earlier one.
pub fn set_principal(request: &mut Request, principal: Principal) {
    request.extensions_mut().insert(principal);
}

pub fn principal(request: &Request) -> &Principal {
    request
        .extensions()
        .get::<Principal>()
        .expect("missing principal in request context")
}

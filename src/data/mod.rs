//! Persistence collaborators.
//!
//! Handlers and middleware only see the store traits defined here. The
//! crate ships an in-memory implementation in [`memory`].

pub mod filters;
pub mod memory;
pub mod movies;
pub mod permissions;
pub mod runtime;
pub mod tokens;
pub mod users;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use filters::{Filters, Metadata};
pub use memory::MemoryStore;
pub use movies::{Movie, MovieQuery};
pub use permissions::Permissions;
pub use runtime::Runtime;
pub use tokens::{Scope, Token};
pub use users::{Password, User};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("store failure: {0}")]
    Unknown(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Stores a new movie and fills in its id, creation time and version.
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()>;
    async fn get(&self, id: i64) -> StoreResult<Movie>;
    async fn get_all(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, Metadata)>;
    /// Saves `movie` if its version still matches and bumps the version.
    async fn update(&self, movie: &mut Movie) -> StoreResult<()>;
    async fn delete(&self, id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &mut User) -> StoreResult<()>;
    async fn get_by_email(&self, email: &str) -> StoreResult<User>;
    async fn update(&self, user: &mut User) -> StoreResult<()>;
    /// Resolves a plaintext token of `scope` to its owner. Expired tokens
    /// resolve to `NotFound`.
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> StoreResult<()>;
    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_all_for_user(&self, user_id: i64) -> StoreResult<Permissions>;
    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> StoreResult<()>;
}

/// The set of collaborators the application is wired with.
#[derive(Clone)]
pub struct Models {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Models {
    /// All collaborators backed by one shared in-memory store.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }
}

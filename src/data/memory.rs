//! In-memory collaborators. Each table sits behind its own `RwLock`;
//! no operation holds more than one lock at a time.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use super::filters::Metadata;
use super::movies::{Movie, MovieQuery};
use super::permissions::Permissions;
use super::tokens::{hash_plaintext, Scope, Token};
use super::users::User;
use super::{MovieStore, PermissionStore, StoreError, StoreResult, TokenStore, UserStore};

#[derive(Default)]
pub struct MemoryStore {
    movies: RwLock<Table<Movie>>,
    users: RwLock<Table<User>>,
    tokens: RwLock<Vec<Token>>,
    permissions: RwLock<HashMap<i64, HashSet<String>>>,
}

struct Table<T> {
    next_id: i64,
    rows: BTreeMap<i64, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        let mut table = self.movies.write().await;
        movie.id = table.allocate_id();
        movie.created_at = Utc::now();
        movie.version = 1;
        table.rows.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let table = self.movies.read().await;
        table.rows.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_all(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, Metadata)> {
        let table = self.movies.read().await;
        let mut matching: Vec<Movie> = table
            .rows
            .values()
            .filter(|movie| query.matches(movie))
            .cloned()
            .collect();

        let filters = &query.filters;
        matching.sort_by(|a, b| {
            let ordering = match filters.sort_column() {
                "title" => a.title.cmp(&b.title),
                "year" => a.year.cmp(&b.year),
                "runtime" => a.runtime.cmp(&b.runtime),
                _ => a.id.cmp(&b.id),
            };
            let ordering = if filters.descending() { ordering.reverse() } else { ordering };
            // id as a stable tie-breaker
            ordering.then(a.id.cmp(&b.id))
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filters.offset())
            .take(filters.limit())
            .collect();

        Ok((page, Metadata::calculate(total, filters.page, filters.page_size)))
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        let mut table = self.movies.write().await;
        let stored = table.rows.get_mut(&movie.id).ok_or(StoreError::EditConflict)?;
        if stored.version != movie.version {
            return Err(StoreError::EditConflict);
        }
        movie.version += 1;
        *stored = movie.clone();
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        let mut table = self.movies.write().await;
        table.rows.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &mut User) -> StoreResult<()> {
        let mut table = self.users.write().await;
        if table.rows.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        user.id = table.allocate_id();
        user.created_at = Utc::now();
        user.version = 1;
        table.rows.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let table = self.users.read().await;
        table
            .rows
            .values()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> StoreResult<()> {
        let mut table = self.users.write().await;
        if table
            .rows
            .values()
            .any(|existing| existing.email == user.email && existing.id != user.id)
        {
            return Err(StoreError::DuplicateEmail);
        }
        let stored = table.rows.get_mut(&user.id).ok_or(StoreError::EditConflict)?;
        if stored.version != user.version {
            return Err(StoreError::EditConflict);
        }
        user.version += 1;
        *stored = user.clone();
        Ok(())
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User> {
        let hash = hash_plaintext(plaintext);
        let now = Utc::now();

        let user_id = {
            let tokens = self.tokens.read().await;
            tokens
                .iter()
                .find(|t| t.hash == hash && t.scope == scope && !t.is_expired(now))
                .map(|t| t.user_id)
                .ok_or(StoreError::NotFound)?
        };

        let table = self.users.read().await;
        table.rows.get(&user_id).cloned().ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> StoreResult<()> {
        self.tokens.write().await.push(token.clone());
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()> {
        self.tokens
            .write()
            .await
            .retain(|t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> StoreResult<Permissions> {
        let permissions = self.permissions.read().await;
        let mut codes: Vec<String> = permissions
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default();
        codes.sort();
        Ok(Permissions(codes))
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> StoreResult<()> {
        let mut permissions = self.permissions.write().await;
        permissions
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|code| code.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filters::Filters;
    use crate::data::movies::SORT_SAFELIST;
    use crate::data::runtime::Runtime;
    use crate::data::users::Password;
    use chrono::Duration;

    fn movie(title: &str, year: i32) -> Movie {
        Movie::new(title.to_string(), year, Runtime(100), vec!["drama".to_string()])
    }

    fn user(email: &str) -> User {
        User::new("Alice".to_string(), email.to_string(), Password::from_hash("hash"))
    }

    #[tokio::test]
    async fn test_movie_crud() {
        let store = MemoryStore::new();
        let mut m = movie("Heat", 1995);
        MovieStore::insert(&store, &mut m).await.unwrap();
        assert_eq!(m.id, 1);
        assert_eq!(m.version, 1);

        let mut fetched = MovieStore::get(&store, 1).await.unwrap();
        fetched.title = "Heat (1995)".to_string();
        MovieStore::update(&store, &mut fetched).await.unwrap();
        assert_eq!(fetched.version, 2);

        MovieStore::delete(&store, 1).await.unwrap();
        assert_eq!(MovieStore::get(&store, 1).await, Err(StoreError::NotFound));
        assert_eq!(MovieStore::delete(&store, 1).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_stale_version_is_edit_conflict() {
        let store = MemoryStore::new();
        let mut m = movie("Heat", 1995);
        MovieStore::insert(&store, &mut m).await.unwrap();

        let mut first = MovieStore::get(&store, m.id).await.unwrap();
        let mut second = first.clone();
        MovieStore::update(&store, &mut first).await.unwrap();
        assert_eq!(
            MovieStore::update(&store, &mut second).await,
            Err(StoreError::EditConflict)
        );
    }

    #[tokio::test]
    async fn test_listing_sorts_and_paginates() {
        let store = MemoryStore::new();
        for (title, year) in [("B", 2001), ("A", 1999), ("C", 2010)] {
            MovieStore::insert(&store, &mut movie(title, year)).await.unwrap();
        }

        let query = MovieQuery {
            title: String::new(),
            genres: vec![],
            filters: Filters {
                page: 1,
                page_size: 2,
                sort: "-year".to_string(),
                sort_safelist: SORT_SAFELIST,
            },
        };
        let (movies, metadata) = store.get_all(&query).await.unwrap();
        let titles: Vec<_> = movies.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "B"]);
        assert_eq!(metadata.total_records, 3);
        assert_eq!(metadata.last_page, 2);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let store = MemoryStore::new();
        UserStore::insert(&store, &mut user("a@example.com")).await.unwrap();
        assert_eq!(
            UserStore::insert(&store, &mut user("a@example.com")).await,
            Err(StoreError::DuplicateEmail)
        );
    }

    #[tokio::test]
    async fn test_get_for_token_respects_scope_and_expiry() {
        let store = MemoryStore::new();
        let mut u = user("a@example.com");
        UserStore::insert(&store, &mut u).await.unwrap();

        let live = Token::generate(u.id, Duration::hours(1), Scope::Authentication);
        let expired = Token::generate(u.id, Duration::hours(-1), Scope::Authentication);
        TokenStore::insert(&store, &live).await.unwrap();
        TokenStore::insert(&store, &expired).await.unwrap();

        let found = store.get_for_token(Scope::Authentication, &live.plaintext).await.unwrap();
        assert_eq!(found.id, u.id);
        assert_eq!(
            store.get_for_token(Scope::Activation, &live.plaintext).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(
            store.get_for_token(Scope::Authentication, &expired.plaintext).await,
            Err(StoreError::NotFound)
        );

        store.delete_all_for_user(Scope::Authentication, u.id).await.unwrap();
        assert_eq!(
            store.get_for_token(Scope::Authentication, &live.plaintext).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_permissions_reflect_current_grants() {
        let store = MemoryStore::new();
        assert!(!store.get_all_for_user(1).await.unwrap().include("movies:read"));
        store.add_for_user(1, &["movies:read"]).await.unwrap();
        store.add_for_user(1, &["movies:write"]).await.unwrap();
        let permissions = store.get_all_for_user(1).await.unwrap();
        assert!(permissions.include("movies:read"));
        assert!(permissions.include("movies:write"));
    }
}

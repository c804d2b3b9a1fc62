use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, patch, post, put};
use axum::{middleware, Router};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{oneshot, watch};
use tokio::time;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::{
    authenticate, require_activated, require_authenticated, require_permission, PermissionGate,
};
use crate::error::AppError;
use crate::handlers::movies::{create_movie, delete_movie, list_movies, show_movie, update_movie};
use crate::handlers::tokens::create_authentication_token;
use crate::handlers::users::{activate_user, register_user};
use crate::handlers::{debug_vars, healthcheck, AppState};
use crate::middleware::{logging_middleware, rate_limit, recover_panic, track_metrics};

/// How long shutdown may spend draining requests and background tasks.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("server error: {0}")]
    Io(#[from] io::Error),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Builds the router with the full request pipeline.
///
/// Layers run outermost first: tracing, request logging, metrics, panic
/// recovery, CORS, rate limiting, then authentication. The movie routes
/// add the authenticated, activated and permission gates in that order.
pub fn create_app(state: AppState) -> Router {
    let permissions = state.models.permissions.clone();
    let can_read = ServiceBuilder::new()
        .layer(middleware::from_fn(require_authenticated))
        .layer(middleware::from_fn(require_activated))
        .layer(middleware::from_fn_with_state(
            PermissionGate::new("movies:read", permissions.clone()),
            require_permission,
        ));
    let can_write = ServiceBuilder::new()
        .layer(middleware::from_fn(require_authenticated))
        .layer(middleware::from_fn(require_activated))
        .layer(middleware::from_fn_with_state(
            PermissionGate::new("movies:write", permissions),
            require_permission,
        ));

    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .route("/v1/movies", get(list_movies).route_layer(can_read.clone()))
        .route("/v1/movies", post(create_movie).route_layer(can_write.clone()))
        .route("/v1/movies/:id", get(show_movie).route_layer(can_read))
        .route(
            "/v1/movies/:id",
            patch(update_movie).delete(delete_movie).route_layer(can_write),
        )
        .route("/v1/users", post(register_user))
        .route("/v1/users/activated", put(activate_user))
        .route("/v1/tokens/authentication", post(create_authentication_token))
        .route("/debug/vars", get(debug_vars))
        .fallback(|| async { AppError::NotFound })
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware))
                .layer(middleware::from_fn_with_state(state.metrics.clone(), track_metrics))
                .layer(middleware::from_fn(recover_panic))
                .layer(cors_layer(&state.settings.cors_trusted_origins))
                .layer(middleware::from_fn_with_state(state.registry.clone(), rate_limit))
                .layer(middleware::from_fn_with_state(state.clone(), authenticate)),
        )
        .with_state(state)
}

fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = trusted_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::OPTIONS,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::GET,
            Method::POST,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Owns the listener and drives the Starting → Serving → ShuttingDown →
/// Stopped lifecycle.
pub struct Server {
    state: AppState,
    addr: SocketAddr,
    grace_period: Duration,
    lifecycle: watch::Sender<ServerState>,
}

impl Server {
    pub fn new(state: AppState, addr: SocketAddr) -> Self {
        let (lifecycle, _) = watch::channel(ServerState::Starting);
        Self {
            state,
            addr,
            grace_period: SHUTDOWN_GRACE_PERIOD,
            lifecycle,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Observes lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.lifecycle.subscribe()
    }

    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })
    }

    /// Binds the configured address and serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(err) => {
                self.lifecycle.send_replace(ServerState::Stopped);
                return Err(err);
            }
        };
        self.run_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `signal` resolves, then drains in-flight
    /// requests and background tasks under one deadline.
    pub async fn run_with_shutdown<F>(self, listener: TcpListener, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let sweeper = self.state.registry.spawn_sweeper();
        let app = create_app(self.state.clone());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            });
        let mut server = tokio::spawn(async move { serve.await });

        self.lifecycle.send_replace(ServerState::Serving);
        info!(addr = %addr, env = %self.state.settings.env, "Starting server");

        tokio::select! {
            result = &mut server => {
                sweeper.abort();
                self.lifecycle.send_replace(ServerState::Stopped);
                error!("Server stopped before shutdown was requested");
                return result?.map_err(ServerError::from);
            }
            _ = signal => {}
        }

        info!(addr = %addr, "Shutting down server");
        self.lifecycle.send_replace(ServerState::ShuttingDown);
        let _ = stop_tx.send(());

        let background = self.state.background.clone();
        // Requests still in flight may spawn background work, so the task
        // counter is only checked once the connections have drained.
        let drained = time::timeout(self.grace_period, async {
            let served = (&mut server).await;
            info!(in_flight_tasks = background.in_flight(), "Completing background tasks");
            background.wait_idle().await;
            served
        })
        .await;

        sweeper.abort();
        self.lifecycle.send_replace(ServerState::Stopped);

        match drained {
            Ok(served) => {
                served??;
                info!(addr = %addr, "Stopped server");
                Ok(())
            }
            Err(_) => {
                server.abort();
                error!(
                    in_flight_tasks = self.state.background.in_flight(),
                    "Shutdown grace period expired"
                );
                Err(ServerError::ShutdownTimeout(self.grace_period))
            }
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(signal = "interrupt", "Caught signal");
        },
        _ = terminate => {
            info!(signal = "terminated", "Caught signal");
        },
    }
}

//! Dashboard proxy server
//!
//! Serves the JSON API the browser dashboard talks to and forwards
//! `/api/proxy/*` calls upstream with credentials attached.

pub mod proxy;
pub mod rate_limit;
pub mod routes;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{any, get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

use crate::client::ApiClient;
use crate::common::{Config, Error, Result};
use crate::testing::{Reporter, RunHistory, TestResult, TestRun, TestRunner};

pub use proxy::{ProxyBody, ProxyClient, ProxyResponse};
pub use rate_limit::RateLimiter;

/// State shared by every handler
pub struct AppState {
    pub config: Config,
    /// Used for health probes so they never wait on a test run
    pub client: ApiClient,
    pub runner: Mutex<TestRunner>,
    /// Copy of the runner's results, replaced when a run finishes
    pub snapshot: RwLock<RunSnapshot>,
    pub proxy: ProxyClient,
    pub limiter: RateLimiter,
}

/// What the dashboard reads between runs
#[derive(Debug, Default)]
pub struct RunSnapshot {
    pub last_results: Vec<TestResult>,
    pub history: RunHistory,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let runner = TestRunner::new(ApiClient::new(config.clone())?, Reporter::silent());
        Self::from_parts(
            config.clone(),
            ApiClient::new(config.clone())?,
            runner,
            ProxyClient::new(config)?,
        )
    }

    pub fn from_parts(
        config: Config,
        client: ApiClient,
        runner: TestRunner,
        proxy: ProxyClient,
    ) -> Result<Self> {
        Ok(Self {
            config,
            client,
            runner: Mutex::new(runner),
            snapshot: RwLock::new(RunSnapshot::default()),
            proxy,
            limiter: RateLimiter::default(),
        })
    }

    pub fn snapshot(&self) -> RwLockReadGuard<'_, RunSnapshot> {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish a finished run to readers
    pub fn record(&self, run: &TestRun) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        snapshot.last_results = run.results.clone();
        snapshot.history.push(run.clone());
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-access-id"),
        ])
}

/// Build the router with all routes and middleware
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.settings.server.cors_origins);

    Router::new()
        .route(
            "/api/proxy/*endpoint",
            any(proxy::proxy_handler).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit::limit_proxy,
            )),
        )
        .route("/api/config", get(routes::get_config))
        .route(
            "/api/run-tests",
            post(routes::run_tests).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit::limit_run_tests,
            )),
        )
        .route("/api/test-results", get(routes::test_results))
        .route("/api/test-history", get(routes::test_history))
        .route("/api/health", get(routes::health))
        .fallback(routes::not_found)
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl-C or SIGTERM
pub async fn start(config: Config) -> Result<()> {
    let server = &config.settings.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|_| {
            Error::Configuration(format!(
                "Invalid listen address {}:{}",
                server.host, server.port
            ))
        })?;

    let masked = config.masked();
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        address = %addr,
        environment = %masked.environment,
        api_key = %masked.api_key,
        base_url = %masked.base_url,
        "Dashboard server listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to create SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down gracefully"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down gracefully"),
    }
}

//! # labgate: Training Batch Scheduling with Time-Gated Lab Access
//!
//! `labgate` runs a small portal for training teams. Administrators schedule time-boxed training
//! batches, assign trainers to them and attach the login for a lab environment. Trainers see only
//! the batches they are assigned to, and can read a batch's lab login only while that batch is
//! running.
//!
//! ## Overview
//!
//! The interesting part is the scheduling engine in [`schedule`]:
//!
//! - A batch's phase (Upcoming, Live, Expired or Cancelled) is derived from the server clock on
//!   every read. It is never stored and never taken from the client.
//! - A trainer cannot be booked into two batches whose windows overlap. Windows are half-open, so
//!   back-to-back batches are fine.
//! - Finished batches are immutable, and a running batch keeps its schedule.
//! - Lab credentials are released by a single decision function, [`schedule::gate::evaluate`],
//!   after the caller's assignment and the batch's phase have been checked.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence is SQLite through
//! `sqlx`. Validation and the write it guards share one transaction, and SQLite serializes writers,
//! so two admins racing to book the same trainer cannot both succeed.
//!
//! ### Core Components
//!
//! - [`api`]: handlers and wire models. Batch responses are projections that redact credentials
//!   for trainers.
//! - [`auth`]: password login, JWT access/refresh cookies, role checks.
//! - [`db`]: repositories over `users`, `batches` and `batch_trainers`.
//! - [`schedule`]: window resolution, overlap detection, the validation pipeline and the gate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use labgate::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = labgate::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     labgate::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod schedule;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::models::users::Role,
    auth::password::{self, Argon2Params},
    config::CorsOrigin,
    db::handlers::{Repository, Users},
    db::models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    openapi::ApiDoc,
    schedule::{Clock, ScheduleRules, SystemClock},
};
use axum::{
    Json, Router, http,
    http::HeaderValue,
    routing::{get, patch, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use chrono::{DateTime, Utc};
pub use config::Config;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{BatchId, UserId};

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `db`: SQLite connection pool
/// - `config`: Application configuration loaded from environment/files
/// - `clock`: Source of "now" for every scheduling decision
/// - `rules`: Scheduling policy resolved from `config.schedule`
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .rules(config.schedule.rules()?)
///     .config(config)
///     .clock(Arc::new(ManualClock::new(start)))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    #[builder(default = system_clock())]
    pub clock: Arc<dyn Clock>,
    #[builder(default)]
    pub rules: ScheduleRules,
}

impl AppState {
    /// Current instant according to the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Argon2 cost parameters for new password and token hashes.
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params::from(&self.config.auth.native.password)
    }
}

fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Get the labgate database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user, or reset its password and role if it already exists.
///
/// Does nothing when no password is configured. Idempotent.
///
/// # Returns
///
/// The id of the admin account, if one was created or updated.
#[instrument(skip_all, fields(email = %email))]
pub async fn create_initial_admin_user(
    email: &str,
    password: Option<&str>,
    params: Argon2Params,
    db: &SqlitePool,
) -> anyhow::Result<Option<UserId>> {
    let Some(password) = password else {
        debug!("No admin password configured, skipping initial admin user");
        return Ok(None);
    };
    let password_hash = password::hash_blocking(password.to_string(), params)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?;

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    let id = match user_repo.get_user_by_email(email).await? {
        Some(existing_user) => {
            let update = UserUpdateDBRequest {
                password_hash: Some(password_hash),
                role: Some(Role::Admin),
                is_active: Some(true),
                ..Default::default()
            };
            user_repo.update(existing_user.id, &update).await?;
            existing_user.id
        }
        None => {
            let create = UserCreateDBRequest {
                full_name: "Administrator".to_string(),
                email: email.to_string(),
                password_hash,
                role: Role::Admin,
                is_active: true,
            };
            let created = user_repo.create(&create).await?;
            info!("Created initial admin user {}", created.email);
            created.id
        }
    };

    tx.commit().await?;
    Ok(Some(id))
}

/// Open the pool, run migrations and seed the initial admin.
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(config.database.acquire_timeout)
        .connect_with(options)
        .await?;
    migrator().run(&pool).await?;

    create_initial_admin_user(
        &config.admin_email,
        config.admin_password.as_deref(),
        Argon2Params::from(&config.auth.native.password),
        &pool,
    )
    .await?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE, http::header::AUTHORIZATION])
        .allow_credentials(config.auth.security.cors.allow_credentials);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// - Authentication routes under `/authentication`
/// - Batch and trainer-directory routes under `/api/v1`
/// - OpenAPI document and Scalar UI
/// - Optional Prometheus metrics
/// - CORS and tracing layers
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route(
            "/authentication/register",
            get(api::handlers::auth::get_registration_info).post(api::handlers::auth::register),
        )
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/refresh", post(api::handlers::auth::refresh))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .route("/authentication/me", get(api::handlers::auth::me))
        .with_state(state.clone());

    let api_routes = Router::new()
        // Batches
        .route(
            "/batches",
            get(api::handlers::batches::list_batches).post(api::handlers::batches::create_batch),
        )
        .route(
            "/batches/{id}",
            get(api::handlers::batches::get_batch)
                .put(api::handlers::batches::update_batch)
                .delete(api::handlers::batches::delete_batch),
        )
        .route("/batches/{id}/cancel", patch(api::handlers::batches::cancel_batch))
        .route("/batches/{id}/credentials", get(api::handlers::batches::get_batch_credentials))
        // Users
        .route("/users/trainers", get(api::handlers::users::list_trainers))
        .route("/users/current", get(api::handlers::users::get_current_user))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(auth_routes)
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// A configured service: database ready, router built.
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting labgate with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        Self::with_state(
            AppState::builder()
                .db(pool)
                .rules(config.schedule.rules()?)
                .config(config)
                .build(),
        )
    }

    /// Wrap existing state, e.g. one carrying a test clock.
    pub fn with_state(state: AppState) -> anyhow::Result<Self> {
        let router = build_router(&state)?;
        Ok(Self {
            router,
            pool: state.db.clone(),
            config: state.config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("labgate listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{TestDb, create_test_config};

    #[test_log::test(tokio::test)]
    async fn test_create_initial_admin_user_is_idempotent() {
        let db = TestDb::new().await;
        let params = Argon2Params::from(&create_test_config().auth.native.password);

        let first = create_initial_admin_user("root@example.com", Some("Initial#Pass1"), params, &db.pool)
            .await
            .unwrap()
            .unwrap();
        let second = create_initial_admin_user("root@example.com", Some("Rotated#Pass2"), params, &db.pool)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, second);

        let mut conn = db.pool.acquire().await.unwrap();
        let admin = Users::new(&mut conn).get_by_id(first).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(password::verify_string("Rotated#Pass2", &admin.password_hash).unwrap());
    }

    #[test_log::test(tokio::test)]
    async fn test_no_admin_without_password() {
        let db = TestDb::new().await;
        let params = Argon2Params::from(&create_test_config().auth.native.password);

        assert!(
            create_initial_admin_user("root@example.com", None, params, &db.pool)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_setup_database_seeds_admin() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.database.url = format!("sqlite://{}/labgate.db", dir.path().display());
        config.admin_email = "root@example.com".to_string();
        config.admin_password = Some("Initial#Pass1".to_string());

        let pool = setup_database(&config).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let admin = Users::new(&mut conn).get_user_by_email("root@example.com").await.unwrap();
        assert!(admin.is_some_and(|a| a.role == Role::Admin && a.is_active));
    }

    #[tokio::test]
    async fn test_health_and_openapi_endpoints() {
        let db = TestDb::new().await;
        let config = create_test_config();
        let state = AppState::builder().db(db.pool.clone()).config(config).build();
        let server = Application::with_state(state).unwrap().into_test_server();

        let health = server.get("/healthz").await;
        health.assert_status_ok();
        health.assert_text("OK");

        let spec = server.get("/api-docs/openapi.json").await;
        spec.assert_status_ok();
        let body: serde_json::Value = spec.json();
        assert!(body["paths"]["/api/v1/batches"].is_object());
        assert!(body["paths"]["/api/v1/batches/{id}/credentials"].is_object());
    }
}

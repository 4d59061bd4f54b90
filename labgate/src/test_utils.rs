//! Test utilities: throwaway databases, a cheap config, seeded users and a wired-up test server.

use crate::api::models::users::{CurrentUser, Role};
use crate::auth::password::{self, Argon2Params};
use crate::auth::session::create_access_token;
use crate::config::{Config, PasswordConfig, SessionConfig};
use crate::db::handlers::{Repository, Users};
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse};
use crate::schedule::ManualClock;
use crate::{AppState, Application};
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Password every seeded test user has.
pub const TEST_PASSWORD: &str = "Correct#Horse1";

/// A migrated SQLite database living in its own temporary directory.
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("test.db"))
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .expect("Failed to open test database");
        crate::migrator().run(&pool).await.expect("Failed to run migrations");

        Self { pool, _dir: dir }
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    };
    config.auth.native.admin_invite_code = Some("test-invite-code".to_string());
    config.auth.native.password = PasswordConfig {
        // Fast hashing for tests
        argon2_memory_kib: 128,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..Default::default()
    };
    config.auth.native.session = SessionConfig {
        cookie_secure: false,
        ..Default::default()
    };
    config
}

/// Insert an active user with [`TEST_PASSWORD`]. Emails are unique per call.
pub async fn create_test_user(pool: &SqlitePool, role: Role, full_name: &str) -> UserDBResponse {
    let params = Argon2Params::from(&create_test_config().auth.native.password);
    let password_hash = password::hash_string_with_params(TEST_PASSWORD, Some(params)).expect("Failed to hash password");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            full_name: full_name.to_string(),
            email: format!("user-{}@example.com", Uuid::new_v4().simple()),
            password_hash,
            role,
            is_active: true,
        })
        .await
        .expect("Failed to create test user")
}

/// `Authorization` header carrying a fresh access token for `user`.
pub fn auth_header(user: &UserDBResponse, config: &Config) -> (String, String) {
    let token = create_access_token(&CurrentUser::from(user.clone()), config).expect("Failed to create access token");
    ("authorization".to_string(), format!("Bearer {token}"))
}

/// A running app over a fresh database, with a clock the test controls.
pub struct TestApp {
    pub server: TestServer,
    pub db: TestDb,
    pub clock: ManualClock,
    pub config: Config,
}

impl TestApp {
    pub async fn new(now: DateTime<Utc>) -> Self {
        Self::with_config(create_test_config(), now).await
    }

    pub async fn with_config(config: Config, now: DateTime<Utc>) -> Self {
        let db = TestDb::new().await;
        let clock = ManualClock::new(now);
        let state = AppState::builder()
            .db(db.pool.clone())
            .rules(config.schedule.rules().expect("Invalid schedule config"))
            .config(config.clone())
            .clock(Arc::new(clock.clone()))
            .build();
        let server = Application::with_state(state).expect("Failed to build app").into_test_server();

        Self { server, db, clock, config }
    }

    pub async fn user(&self, role: Role, full_name: &str) -> UserDBResponse {
        create_test_user(&self.db.pool, role, full_name).await
    }

    pub fn auth(&self, user: &UserDBResponse) -> (String, String) {
        auth_header(user, &self.config)
    }
}

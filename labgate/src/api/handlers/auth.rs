use axum::{Json, extract::State, http::HeaderMap};
use sqlx::SqliteConnection;
use tracing::info;

use crate::{
    AppState,
    api::models::{
        auth::{
            AuthResponse, AuthSuccessResponse, LoginRequest, LoginResponse, LogoutResponse, RegisterRequest, RegisterResponse,
            RegistrationInfo, SessionStatus,
        },
        users::{CurrentUser, Role, UserResponse},
    },
    auth::{current_user::cookie_value, password, session},
    config::Config,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    errors::{Error, FieldErrors},
};

const FULL_NAME_MIN: usize = 3;
const FULL_NAME_MAX: usize = 60;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Get registration information
#[utoipa::path(
    get,
    path = "/authentication/register",
    tag = "authentication",
    responses(
        (status = 200, description = "Registration info", body = RegistrationInfo),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_registration_info(State(state): State<AppState>) -> Result<Json<RegistrationInfo>, Error> {
    let enabled = state.config.auth.native.enabled && state.config.auth.native.allow_registration;
    Ok(Json(RegistrationInfo {
        enabled,
        message: if enabled {
            "Registration is enabled".to_string()
        } else {
            "Registration is disabled".to_string()
        },
    }))
}

/// Register a new user account
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Invalid input, or the email is already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<RegisterResponse, Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }
    if !state.config.auth.native.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    let role = check_registration(&request, &state.config).map_err(Error::validation)?;

    let mut tx = state.db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if user_repo.get_user_by_email(&request.email).await?.is_some() {
        let mut errors = FieldErrors::new();
        errors.insert("email", "This email is already registered");
        return Err(Error::validation(errors));
    }

    let password_hash = password::hash_blocking(request.password, state.argon2_params()).await?;
    let created_user = user_repo
        .create(&UserCreateDBRequest {
            full_name: request.full_name,
            email: request.email,
            password_hash,
            role,
            is_active: true,
        })
        .await?;

    let cookies = start_session(&mut tx, &created_user, &state).await?;
    tx.commit().await?;

    info!(user_id = %created_user.id, role = ?created_user.role, "Registered new user");

    Ok(RegisterResponse {
        auth_response: AuthResponse {
            user: UserResponse::from(created_user),
            message: "Registration successful".to_string(),
        },
        cookies,
    })
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<LoginResponse, Error> {
    if !state.config.auth.native.enabled {
        return Err(Error::BadRequest {
            message: "Native authentication is disabled".to_string(),
        });
    }

    let mut tx = state.db.begin().await?;

    let user = Users::new(&mut tx)
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| Error::Unauthenticated {
            message: Some(INVALID_CREDENTIALS.to_string()),
        })?;

    if !user.is_active {
        return Err(Error::Forbidden {
            message: "Account is deactivated. Please contact support.".to_string(),
        });
    }

    if !password::verify_blocking(request.password, user.password_hash.clone()).await? {
        return Err(Error::Unauthenticated {
            message: Some(INVALID_CREDENTIALS.to_string()),
        });
    }

    let cookies = start_session(&mut tx, &user, &state).await?;
    tx.commit().await?;

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: UserResponse::from(user),
            message: "Login successful".to_string(),
        },
        cookies,
    })
}

/// Exchange the refresh cookie for a new access/refresh pair
///
/// The presented refresh token must be the one most recently issued to the user; it is replaced,
/// so each refresh token can be redeemed once.
#[utoipa::path(
    post,
    path = "/authentication/refresh",
    tag = "authentication",
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 401, description = "Missing, invalid or superseded refresh token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Result<LoginResponse, Error> {
    let refresh_token = cookie_value(&headers, &state.config.auth.native.session.refresh_cookie_name).ok_or_else(|| {
        Error::Unauthenticated {
            message: Some("Refresh token required".to_string()),
        }
    })?;
    let invalid = || Error::Unauthenticated {
        message: Some(INVALID_REFRESH_TOKEN.to_string()),
    };

    let claimed = session::verify_token(refresh_token, session::TokenKind::Refresh, &state.config).map_err(|e| match e {
        Error::Unauthenticated { .. } => invalid(),
        other => other,
    })?;

    let mut tx = state.db.begin().await?;
    let user = Users::new(&mut tx)
        .get_by_id(claimed.id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(invalid)?;
    let stored_hash = user.refresh_token_hash.clone().ok_or_else(invalid)?;

    if !password::verify_blocking(refresh_token.to_string(), stored_hash).await? {
        return Err(invalid());
    }

    let cookies = start_session(&mut tx, &user, &state).await?;
    tx.commit().await?;

    Ok(LoginResponse {
        auth_response: AuthResponse {
            user: UserResponse::from(user),
            message: "Token refreshed successfully".to_string(),
        },
        cookies,
    })
}

/// Logout (clear session)
///
/// Always succeeds. A valid refresh cookie also revokes the stored refresh token.
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<LogoutResponse, Error> {
    let session_config = &state.config.auth.native.session;

    let revoked = cookie_value(&headers, &session_config.refresh_cookie_name)
        .and_then(|token| session::verify_token(token, session::TokenKind::Refresh, &state.config).ok());
    if let Some(user) = revoked {
        let mut conn = state.db.acquire().await?;
        match Users::new(&mut conn).set_refresh_token_hash(user.id, None).await {
            Ok(()) => {}
            // Account deleted since the token was issued; nothing left to revoke
            Err(crate::db::errors::DbError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(LogoutResponse {
        auth_response: AuthSuccessResponse {
            message: "Logout successful".to_string(),
        },
        cookies: vec![
            expired_cookie(&session_config.cookie_name, "/", &state.config),
            expired_cookie(&session_config.refresh_cookie_name, "/authentication", &state.config),
        ],
    })
}

/// Report whether the request carries a valid session
#[utoipa::path(
    get,
    path = "/authentication/me",
    tag = "authentication",
    responses(
        (status = 200, description = "Session status", body = SessionStatus),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn me(current_user: Option<CurrentUser>) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: current_user.is_some(),
        user: current_user,
    })
}

/// Field checks for a registration, yielding the role to create. First message per field wins.
fn check_registration(request: &RegisterRequest, config: &Config) -> Result<Role, FieldErrors> {
    let mut errors = FieldErrors::new();

    let name_length = request.full_name.trim().chars().count();
    if name_length < FULL_NAME_MIN {
        errors.insert("fullName", format!("Full name must be at least {FULL_NAME_MIN} characters"));
    } else if name_length > FULL_NAME_MAX {
        errors.insert("fullName", format!("Full name must not exceed {FULL_NAME_MAX} characters"));
    }

    if !is_email_shaped(&request.email) {
        errors.insert("email", "Invalid email format");
    }

    if let Some(problem) = password::strength_problem(&request.password, &config.auth.native.password) {
        errors.insert("password", problem);
    }

    let role = request.role.unwrap_or_default();
    if role == Role::Admin {
        let expected = config.auth.native.admin_invite_code.as_deref();
        let presented = request.admin_invite_code.as_deref().map(str::trim);
        if expected.is_none() || presented != expected {
            errors.insert("adminInviteCode", "Invalid or missing admin invite code");
        }
    }

    errors.into_result().map(|()| role)
}

/// `local@domain.tld`, no whitespace, one `@`.
fn is_email_shaped(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
        }
        None => false,
    }
}

/// Issue a fresh token pair for `user`, remember the refresh token's hash, and render both cookies.
async fn start_session(conn: &mut SqliteConnection, user: &UserDBResponse, state: &AppState) -> Result<Vec<String>, Error> {
    let current_user = CurrentUser::from(user.clone());
    let access_token = session::create_access_token(&current_user, &state.config)?;
    let refresh_token = session::create_refresh_token(&current_user, &state.config)?;

    let refresh_hash = password::hash_blocking(refresh_token.clone(), state.argon2_params()).await?;
    Users::new(conn).set_refresh_token_hash(user.id, Some(&refresh_hash)).await?;

    let session_config = &state.config.auth.native.session;
    Ok(vec![
        create_cookie(
            &session_config.cookie_name,
            &access_token,
            "/",
            session::lifetime(session::TokenKind::Access, &state.config).as_secs(),
            &state.config,
        ),
        create_cookie(
            &session_config.refresh_cookie_name,
            &refresh_token,
            "/authentication",
            session::lifetime(session::TokenKind::Refresh, &state.config).as_secs(),
            &state.config,
        ),
    ])
}

fn create_cookie(name: &str, value: &str, path: &str, max_age: u64, config: &Config) -> String {
    let session_config = &config.auth.native.session;
    let secure = if session_config.cookie_secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; Path={path}; HttpOnly{secure}; SameSite={}; Max-Age={max_age}",
        session_config.cookie_same_site
    )
}

fn expired_cookie(name: &str, path: &str, config: &Config) -> String {
    create_cookie(name, "", path, 0, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::users::UserUpdateDBRequest;
    use crate::test_utils::{TEST_PASSWORD, TestApp, create_test_config};
    use axum::http::{StatusCode, header};
    use axum_test::TestResponse;
    use chrono::Utc;
    use serde_json::{Value, json};

    fn set_cookie(response: &TestResponse, name: &str) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|cookie| cookie.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(cookie_name, _)| *cookie_name == name)
            .map(|(_, value)| value.to_string())
    }

    fn registration(email: &str) -> Value {
        json!({
            "fullName": "Asha Rao",
            "email": email,
            "password": TEST_PASSWORD,
        })
    }

    #[test]
    fn test_email_shape() {
        assert!(is_email_shaped("asha@example.com"));
        assert!(is_email_shaped("  asha.rao+lab@training.example.co.in "));
        assert!(!is_email_shaped("asha@example"));
        assert!(!is_email_shaped("@example.com"));
        assert!(!is_email_shaped("asha@@example.com"));
        assert!(!is_email_shaped("asha rao@example.com"));
        assert!(!is_email_shaped("asha.example.com"));
    }

    #[test]
    fn test_cookie_attributes() {
        let mut config = create_test_config();
        config.auth.native.session.cookie_secure = true;

        let cookie = create_cookie("labgate_session", "abc", "/", 900, &config);
        assert_eq!(cookie, "labgate_session=abc; Path=/; HttpOnly; Secure; SameSite=strict; Max-Age=900");

        config.auth.native.session.cookie_secure = false;
        let expired = expired_cookie("labgate_refresh", "/authentication", &config);
        assert_eq!(expired, "labgate_refresh=; Path=/authentication; HttpOnly; SameSite=strict; Max-Age=0");
    }

    #[test]
    fn test_registration_checks_report_first_error_per_field() {
        let config = create_test_config();
        let request = RegisterRequest {
            full_name: " A ".to_string(),
            email: "not-an-email".to_string(),
            password: "alllowercase".to_string(),
            role: Some(Role::Admin),
            admin_invite_code: Some("wrong".to_string()),
        };

        let errors = check_registration(&request, &config).unwrap_err();
        assert_eq!(errors.get("fullName"), Some("Full name must be at least 3 characters"));
        assert_eq!(errors.get("email"), Some("Invalid email format"));
        assert_eq!(errors.get("password"), Some("Password must contain at least one uppercase letter"));
        assert_eq!(errors.get("adminInviteCode"), Some("Invalid or missing admin invite code"));
    }

    #[test]
    fn test_admin_registration_impossible_without_configured_code() {
        let mut config = create_test_config();
        config.auth.native.admin_invite_code = None;
        let request = RegisterRequest {
            full_name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            password: TEST_PASSWORD.to_string(),
            role: Some(Role::Admin),
            admin_invite_code: None,
        };

        let errors = check_registration(&request, &config).unwrap_err();
        assert!(errors.contains("adminInviteCode"));
    }

    #[test_log::test(tokio::test)]
    async fn test_register_trainer_sets_both_cookies() {
        let app = TestApp::new(Utc::now()).await;

        let response = app.server.post("/authentication/register").json(&registration("Asha@Example.com")).await;

        response.assert_status(StatusCode::CREATED);
        assert!(set_cookie(&response, "labgate_session").is_some_and(|v| !v.is_empty()));
        assert!(set_cookie(&response, "labgate_refresh").is_some_and(|v| !v.is_empty()));

        let body: AuthResponse = response.json();
        assert_eq!(body.user.email, "asha@example.com");
        assert_eq!(body.user.role, Role::Trainer);
        assert_eq!(body.message, "Registration successful");
    }

    #[test_log::test(tokio::test)]
    async fn test_register_admin_with_invite_code() {
        let app = TestApp::new(Utc::now()).await;

        let mut request = registration("lead@example.com");
        request["role"] = json!("admin");
        request["adminInviteCode"] = json!("wrong-code");
        let response = app.server.post("/authentication/register").json(&request).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["fieldErrors"]["adminInviteCode"], "Invalid or missing admin invite code");

        request["adminInviteCode"] = json!("test-invite-code");
        let response = app.server.post("/authentication/register").json(&request).await;
        response.assert_status(StatusCode::CREATED);
        let body: AuthResponse = response.json();
        assert_eq!(body.user.role, Role::Admin);
    }

    #[test_log::test(tokio::test)]
    async fn test_register_duplicate_email_is_field_error() {
        let app = TestApp::new(Utc::now()).await;

        app.server
            .post("/authentication/register")
            .json(&registration("asha@example.com"))
            .await
            .assert_status(StatusCode::CREATED);

        let response = app.server.post("/authentication/register").json(&registration("ASHA@example.com")).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["fieldErrors"]["email"], "This email is already registered");
    }

    #[test_log::test(tokio::test)]
    async fn test_register_disabled() {
        let mut config = create_test_config();
        config.auth.native.allow_registration = false;
        let app = TestApp::with_config(config, Utc::now()).await;

        let info: RegistrationInfo = app.server.get("/authentication/register").await.json();
        assert!(!info.enabled);

        app.server
            .post("/authentication/register")
            .json(&registration("asha@example.com"))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn test_login_rejections() {
        let app = TestApp::new(Utc::now()).await;
        let user = app.user(Role::Trainer, "Asha Rao").await;

        let wrong_password = app
            .server
            .post("/authentication/login")
            .json(&json!({"email": user.email, "password": "Wrong#Password1"}))
            .await;
        wrong_password.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password.text(), INVALID_CREDENTIALS);

        let unknown = app
            .server
            .post("/authentication/login")
            .json(&json!({"email": "nobody@example.com", "password": TEST_PASSWORD}))
            .await;
        unknown.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.text(), INVALID_CREDENTIALS);

        let mut conn = app.db.pool.acquire().await.unwrap();
        Users::new(&mut conn)
            .update(
                user.id,
                &UserUpdateDBRequest {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let deactivated = app
            .server
            .post("/authentication/login")
            .json(&json!({"email": user.email, "password": TEST_PASSWORD}))
            .await;
        deactivated.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(deactivated.text(), "Account is deactivated. Please contact support.");
    }

    #[test_log::test(tokio::test)]
    async fn test_login_session_cookie_authenticates_me() {
        let app = TestApp::new(Utc::now()).await;
        let user = app.user(Role::Trainer, "Asha Rao").await;

        let anonymous: SessionStatus = app.server.get("/authentication/me").await.json();
        assert!(!anonymous.authenticated);
        assert!(anonymous.user.is_none());

        let login = app
            .server
            .post("/authentication/login")
            .json(&json!({"email": user.email, "password": TEST_PASSWORD}))
            .await;
        login.assert_status_ok();
        let access = set_cookie(&login, "labgate_session").unwrap();

        let status: SessionStatus = app
            .server
            .get("/authentication/me")
            .add_header("cookie", format!("labgate_session={access}"))
            .await
            .json();
        assert!(status.authenticated);
        assert_eq!(status.user.unwrap().id, user.id);
    }

    #[test_log::test(tokio::test)]
    async fn test_refresh_rotates_and_logout_revokes() {
        let app = TestApp::new(Utc::now()).await;
        let user = app.user(Role::Trainer, "Asha Rao").await;

        let missing = app.server.post("/authentication/refresh").await;
        missing.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(missing.text(), "Refresh token required");

        let login = app
            .server
            .post("/authentication/login")
            .json(&json!({"email": user.email, "password": TEST_PASSWORD}))
            .await;
        let first_refresh = set_cookie(&login, "labgate_refresh").unwrap();

        let refreshed = app
            .server
            .post("/authentication/refresh")
            .add_header("cookie", format!("labgate_refresh={first_refresh}"))
            .await;
        refreshed.assert_status_ok();
        let second_refresh = set_cookie(&refreshed, "labgate_refresh").unwrap();
        assert_ne!(first_refresh, second_refresh);
        assert!(set_cookie(&refreshed, "labgate_session").is_some());

        // The superseded token no longer works
        let replayed = app
            .server
            .post("/authentication/refresh")
            .add_header("cookie", format!("labgate_refresh={first_refresh}"))
            .await;
        replayed.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(replayed.text(), INVALID_REFRESH_TOKEN);

        let logout = app
            .server
            .post("/authentication/logout")
            .add_header("cookie", format!("labgate_refresh={second_refresh}"))
            .await;
        logout.assert_status_ok();
        assert_eq!(set_cookie(&logout, "labgate_session").as_deref(), Some(""));
        assert_eq!(set_cookie(&logout, "labgate_refresh").as_deref(), Some(""));

        app.server
            .post("/authentication/refresh")
            .add_header("cookie", format!("labgate_refresh={second_refresh}"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[test_log::test(tokio::test)]
    async fn test_logout_without_session_still_clears_cookies() {
        let app = TestApp::new(Utc::now()).await;

        let response = app.server.post("/authentication/logout").await;
        response.assert_status_ok();
        let body: AuthSuccessResponse = response.json();
        assert_eq!(body.message, "Logout successful");
        assert_eq!(set_cookie(&response, "labgate_session").as_deref(), Some(""));
    }
}

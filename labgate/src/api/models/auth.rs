use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::models::users::{CurrentUser, Role, UserResponse};

/// Registration information
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistrationInfo {
    /// Whether registration is enabled
    pub enabled: bool,
    /// Status message
    pub message: String,
}

/// Request to register a new user
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRequest {
    /// Full name, 3 to 60 characters
    pub full_name: String,
    /// Email address (must be unique)
    pub email: String,
    /// Password (will be hashed)
    pub password: String,
    /// Requested role, trainer unless stated
    pub role: Option<Role>,
    /// Required when `role` is `admin`
    pub admin_invite_code: Option<String>,
}

/// Request to login
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
}

/// Response after successful login, registration or token refresh
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    /// User information
    pub user: UserResponse,
    /// Success message
    pub message: String,
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthSuccessResponse {
    pub message: String,
}

/// Who is calling, if anyone
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub user: Option<CurrentUser>,
}

/// Response models that implement IntoResponse for cleaner handler code
use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

fn cookie_headers(cookies: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for cookie in cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Dropping unencodable Set-Cookie header: {e}"),
        }
    }
    headers
}

/// Structured response for successful registration
pub struct RegisterResponse {
    pub auth_response: AuthResponse,
    pub cookies: Vec<String>,
}

impl IntoResponse for RegisterResponse {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, cookie_headers(&self.cookies), Json(self.auth_response)).into_response()
    }
}

/// Structured response for successful login or refresh
pub struct LoginResponse {
    pub auth_response: AuthResponse,
    pub cookies: Vec<String>,
}

impl IntoResponse for LoginResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, cookie_headers(&self.cookies), Json(self.auth_response)).into_response()
    }
}

/// Structured response for successful logout
pub struct LogoutResponse {
    pub auth_response: AuthSuccessResponse,
    pub cookies: Vec<String>,
}

impl IntoResponse for LogoutResponse {
    fn into_response(self) -> Response {
        (StatusCode::OK, cookie_headers(&self.cookies), Json(self.auth_response)).into_response()
    }
}

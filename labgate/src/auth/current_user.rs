use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session::{self, TokenKind},
    config::Config,
    errors::{Error, Result},
};
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use tracing::{debug, instrument, trace};

/// Value of the named cookie, if the request carries it.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(cookie_name, value)| *cookie_name == name && !value.is_empty())
        .map(|(_, value)| value)
}

/// Extract user from the access token cookie if present and valid
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): Cookie present but the token is invalid or expired
#[instrument(skip(parts, config))]
fn try_session_cookie_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let token = cookie_value(&parts.headers, &config.auth.native.session.cookie_name)?;
    Some(session::verify_token(token, TokenKind::Access, config))
}

/// Extract user from an `Authorization: Bearer <access token>` header
/// Returns:
/// - None: No Authorization header or not a Bearer token
/// - Some(Ok(user)): Valid access token
/// - Some(Err(error)): Bearer token present but invalid
#[instrument(skip(parts, config))]
fn try_bearer_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let auth_header = parts.headers.get(header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?;
    Some(session::verify_token(token.trim(), TokenKind::Access, config))
}

/// Try every method; the first success wins. `None` when the request carried no credentials.
fn authenticate(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    let mut last_error = None;

    for (method, attempt) in [
        ("session cookie", try_session_cookie_auth(parts, config)),
        ("bearer token", try_bearer_auth(parts, config)),
    ] {
        match attempt {
            Some(Ok(user)) => {
                debug!("Authenticated user {} via {method}", user.id);
                return Some(Ok(user));
            }
            Some(Err(e)) => {
                trace!("Authentication via {method} failed: {:?}", e);
                last_error = Some(e);
            }
            None => trace!("No {method} present"),
        }
    }

    last_error.map(Err)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match authenticate(parts, &state.config) {
            Some(Ok(user)) => Ok(user),
            Some(Err(Error::Unauthenticated { .. })) | None => Err(Error::Unauthenticated { message: None }),
            Some(Err(e)) => Err(e),
        }
    }
}

impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        match authenticate(parts, &state.config) {
            Some(Ok(user)) => Ok(Some(user)),
            Some(Err(Error::Unauthenticated { .. })) | None => Ok(None),
            Some(Err(e)) => Err(e),
        }
    }
}

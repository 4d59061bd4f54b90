use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::users::{CurrentUser, TrainerSummary, UserResponse},
    auth::permissions::require,
    db::handlers::{Repository, Users, users::UserFilter},
    errors::{Error, Result},
    types::{Operation, Resource},
};

/// List active trainers
///
/// The directory admins pick from when assigning trainers to a batch.
#[utoipa::path(
    get,
    path = "/api/v1/users/trainers",
    tag = "users",
    responses(
        (status = 200, description = "Active trainers", body = [TrainerSummary]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn list_trainers(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<Vec<TrainerSummary>>> {
    require(&current_user, Resource::Users, Operation::ReadAll)?;

    let mut conn = state.db.acquire().await?;
    let trainers = Users::new(&mut conn).list(&UserFilter::active_trainers()).await?;

    Ok(Json(trainers.into_iter().map(TrainerSummary::from).collect()))
}

/// Get the caller's profile
#[utoipa::path(
    get,
    path = "/api/v1/users/current",
    tag = "users",
    responses(
        (status = 200, description = "The caller's account", body = UserResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Account no longer exists"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn get_current_user(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await?;
    let user = Users::new(&mut conn).get_by_id(current_user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: current_user.id.to_string(),
    })?;

    Ok(Json(UserResponse::from(user)))
}

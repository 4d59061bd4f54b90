use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;

use crate::{
    AppState,
    api::models::{
        batches::{BatchCreate, BatchResponse, BatchUpdate, CredentialResponse, admin_view, credential_response, scoped_view},
        users::CurrentUser,
    },
    auth::permissions::{batch_scope, require},
    db::{
        handlers::{Batches, Repository, batches::BatchFilter},
        models::batches::BatchDBResponse,
    },
    errors::{Error, Result},
    schedule::{gate, validation},
    types::{BatchId, Operation, Resource},
};

fn batch_not_found(id: BatchId) -> Error {
    Error::NotFound {
        resource: "Batch".to_string(),
        id: id.to_string(),
    }
}

/// List batches visible to the caller
///
/// Admins see every batch with its lab credentials; trainers see the batches they are assigned
/// to, without credentials. Ordered by start time. `status` is computed from the server clock.
#[utoipa::path(
    get,
    path = "/api/v1/batches",
    tag = "batches",
    responses(
        (status = 200, description = "Batches ordered by start time", body = [BatchResponse]),
        (status = 401, description = "Not authenticated"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn list_batches(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<Vec<BatchResponse>>> {
    require(&current_user, Resource::Batches, Operation::ReadOwn)?;
    let scope = batch_scope(&current_user);

    let mut conn = state.db.acquire().await?;
    let batches = Batches::new(&mut conn).list(&BatchFilter::new(scope)).await?;

    let now = state.now();
    Ok(Json(
        batches
            .into_iter()
            .map(|batch| scoped_view(scope, batch, &state.rules, now))
            .collect(),
    ))
}

/// Schedule a new batch
#[utoipa::path(
    post,
    path = "/api/v1/batches",
    tag = "batches",
    request_body = BatchCreate,
    responses(
        (status = 201, description = "Batch created", body = BatchResponse),
        (status = 400, description = "Validation failed; `fieldErrors` names the offending fields"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "A trainer is already booked during this window"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn create_batch(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<BatchCreate>,
) -> Result<(StatusCode, Json<BatchResponse>)> {
    require(&current_user, Resource::Batches, Operation::CreateAll)?;

    let mut tx = state.db.begin().await?;
    let now = state.now();
    let draft = validation::validate_create(&mut tx, &input, &state.rules, now).await?;
    let created = Batches::new(&mut tx).create(&draft.into_request(current_user.id)).await?;
    tx.commit().await?;

    info!(batch_id = %created.id, start_at = %created.start_at, trainers = created.trainers.len(), "Batch created");

    Ok((StatusCode::CREATED, Json(admin_view(created, &state.rules, now))))
}

/// Get one batch
///
/// Trainers asking for a batch they are not assigned to get the same 404 as for a missing id.
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}",
    tag = "batches",
    params(("id" = String, Path, format = "uuid", description = "Batch ID")),
    responses(
        (status = 200, description = "The batch", body = BatchResponse),
        (status = 404, description = "No such batch visible to the caller"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id, batch_id = %id))]
pub async fn get_batch(State(state): State<AppState>, Path(id): Path<BatchId>, current_user: CurrentUser) -> Result<Json<BatchResponse>> {
    require(&current_user, Resource::Batches, Operation::ReadOwn)?;
    let scope = batch_scope(&current_user);

    let mut conn = state.db.acquire().await?;
    let batch = Batches::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|batch| scope.permits(batch))
        .ok_or_else(|| batch_not_found(id))?;

    Ok(Json(scoped_view(scope, batch, &state.rules, state.now())))
}

/// Update a batch
///
/// Omitted fields keep their stored values. Finished batches cannot be edited, and a live batch
/// keeps its schedule (other fields may still change). Lab credentials with all three fields empty
/// are removed.
#[utoipa::path(
    put,
    path = "/api/v1/batches/{id}",
    tag = "batches",
    request_body = BatchUpdate,
    params(("id" = String, Path, format = "uuid", description = "Batch ID")),
    responses(
        (status = 200, description = "Batch updated", body = BatchResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Batch not found"),
        (status = 409, description = "Batch expired, schedule frozen while live, or trainer double-booked"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id, batch_id = %id))]
pub async fn update_batch(
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
    current_user: CurrentUser,
    Json(input): Json<BatchUpdate>,
) -> Result<Json<BatchResponse>> {
    require(&current_user, Resource::Batches, Operation::UpdateAll)?;

    let mut tx = state.db.begin().await?;
    let existing: BatchDBResponse = Batches::new(&mut tx).get_by_id(id).await?.ok_or_else(|| batch_not_found(id))?;

    let now = state.now();
    let patch = validation::validate_update(&mut tx, &existing, &input, &state.rules, now).await?;
    let updated = Batches::new(&mut tx).update(id, &patch).await?;
    tx.commit().await?;

    info!(batch_id = %id, rescheduled = patch.start_at.is_some(), "Batch updated");

    Ok(Json(admin_view(updated, &state.rules, now)))
}

/// Delete a batch permanently
#[utoipa::path(
    delete,
    path = "/api/v1/batches/{id}",
    tag = "batches",
    params(("id" = String, Path, format = "uuid", description = "Batch ID")),
    responses(
        (status = 204, description = "Batch deleted"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Batch not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id, batch_id = %id))]
pub async fn delete_batch(State(state): State<AppState>, Path(id): Path<BatchId>, current_user: CurrentUser) -> Result<StatusCode> {
    require(&current_user, Resource::Batches, Operation::DeleteAll)?;

    let mut conn = state.db.acquire().await?;
    if !Batches::new(&mut conn).delete(id).await? {
        return Err(batch_not_found(id));
    }

    info!(batch_id = %id, "Batch deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel a batch
///
/// Cancellation is one-way. Cancelling an already cancelled batch returns it unchanged.
#[utoipa::path(
    patch,
    path = "/api/v1/batches/{id}/cancel",
    tag = "batches",
    params(("id" = String, Path, format = "uuid", description = "Batch ID")),
    responses(
        (status = 200, description = "Batch cancelled", body = BatchResponse),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Batch not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id, batch_id = %id))]
pub async fn cancel_batch(State(state): State<AppState>, Path(id): Path<BatchId>, current_user: CurrentUser) -> Result<Json<BatchResponse>> {
    require(&current_user, Resource::Batches, Operation::UpdateAll)?;

    let mut conn = state.db.acquire().await?;
    let cancelled = Batches::new(&mut conn).cancel(id).await?.ok_or_else(|| batch_not_found(id))?;

    info!(batch_id = %id, "Batch cancelled");
    Ok(Json(admin_view(cancelled, &state.rules, state.now())))
}

/// Get a batch's lab credentials
///
/// Released only while the batch is live by the server's clock, and, for trainers, only for
/// batches they are assigned to. Any `status` the client sends is ignored.
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}/credentials",
    tag = "batches",
    params(("id" = String, Path, format = "uuid", description = "Batch ID")),
    responses(
        (status = 200, description = "Credentials, or a note that none are configured", body = CredentialResponse),
        (status = 403, description = "Withheld; `reason` is one of not_assigned, cancelled, not_yet_available, expired"),
        (status = 404, description = "Batch not found"),
    ),
    security(("BearerAuth" = []), ("CookieAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id, batch_id = %id))]
pub async fn get_batch_credentials(
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
    current_user: CurrentUser,
) -> Result<Json<CredentialResponse>> {
    require(&current_user, Resource::Credentials, Operation::ReadOwn)?;

    let mut conn = state.db.acquire().await?;
    let batch = Batches::new(&mut conn).get_by_id(id).await?.ok_or_else(|| batch_not_found(id))?;

    match gate::evaluate(&batch, batch_scope(&current_user), state.now()) {
        Ok(release) => {
            info!(batch_id = %id, "Lab credentials released");
            Ok(Json(credential_response(release)))
        }
        Err(denial) => Err(Error::Denied(denial)),
    }
}

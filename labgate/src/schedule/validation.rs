//! Batch validation pipeline.
//!
//! Requests pass through a fixed sequence of stages and stop at the first one that fails:
//!
//! 1. (updates) the expired guard: finished batches are immutable
//! 2. structural checks on every supplied field
//! 3. referential checks on trainer ids
//! 4. temporal checks on the resolved window
//! 5. (updates) the live guard: a running batch keeps its schedule
//! 6. trainer overlap
//!
//! Within a stage every field is checked and the first message per field is kept. Stages 2 to 4
//! reject with validation errors; the guards and overlap reject with conflicts.
//!
//! The referential and overlap stages read through the connection they are given. Pass the
//! transaction that will perform the write so the decision and the write see the same data.

use crate::api::models::batches::{BatchCreate, BatchUpdate, LabCredentialsInput};
use crate::api::models::users::Role;
use crate::db::errors::DbError;
use crate::db::handlers::{Repository, Users};
use crate::db::models::batches::{BatchCreateDBRequest, BatchDBResponse, BatchUpdateDBRequest, CredentialsChange, LabCredentials};
use crate::errors::{Error, FieldErrors};
use crate::schedule::overlap;
use crate::schedule::window::{BatchPhase, ScheduleRules, TimeWindow, parse_date, parse_time};
use crate::types::{BatchId, UserId};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use thiserror::Error as ThisError;
use tracing::{debug, instrument};
use url::Url;

const BATCH_NAME_MIN: usize = 3;
const BATCH_NAME_MAX: usize = 80;

pub const EXPIRED_BATCH_MESSAGE: &str = "This batch has ended and cannot be modified.";
pub const LIVE_SCHEDULE_MESSAGE: &str = "You cannot change the schedule of a batch that is currently live. Please wait until it ends.";

/// A create request that passed every stage, with its schedule resolved to UTC.
#[derive(Debug, Clone)]
pub struct BatchDraft {
    pub batch_name: String,
    pub trainer_ids: Vec<UserId>,
    pub window: TimeWindow,
    pub lab_credentials: Option<LabCredentials>,
}

impl BatchDraft {
    pub fn into_request(self, created_by: UserId) -> BatchCreateDBRequest {
        BatchCreateDBRequest {
            batch_name: self.batch_name,
            trainer_ids: self.trainer_ids,
            start_at: self.window.start_at,
            end_at: self.window.end_at,
            lab_credentials: self.lab_credentials,
            created_by,
        }
    }
}

/// Why a create or update was refused.
#[derive(Debug, ThisError)]
pub enum BatchRejection {
    #[error("invalid batch: {}", .0.summary().unwrap_or("validation failed"))]
    Invalid(FieldErrors),

    #[error("batch conflict: {}", .0.summary().unwrap_or("conflict"))]
    Conflict(FieldErrors),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl From<BatchRejection> for Error {
    fn from(rejection: BatchRejection) -> Self {
        match rejection {
            BatchRejection::Invalid(errors) => Error::validation(errors),
            BatchRejection::Conflict(errors) => Error::conflict(errors),
            BatchRejection::Database(e) => Error::Database(e),
        }
    }
}

type Outcome<T> = Result<T, BatchRejection>;

/// Run the create pipeline.
#[instrument(skip_all, fields(batch_name = %input.batch_name), err)]
pub async fn validate_create(
    conn: &mut SqliteConnection,
    input: &BatchCreate,
    rules: &ScheduleRules,
    now: DateTime<Utc>,
) -> Outcome<BatchDraft> {
    let mut errors = FieldErrors::new();

    let batch_name = record(&mut errors, "batchName", check_batch_name(&input.batch_name));
    let trainer_ids = dedupe(&input.trainer_ids);
    if trainer_ids.is_empty() {
        errors.insert("trainerIds", "At least one trainer is required");
    }
    let date = record(&mut errors, "date", parse_date(&input.date).ok_or(DATE_FORMAT));
    let start_time = record(&mut errors, "startTime", parse_time(&input.start_time).ok_or(START_TIME_FORMAT));
    let end_time = record(&mut errors, "endTime", parse_time(&input.end_time).ok_or(END_TIME_FORMAT));
    let lab_credentials = match &input.lab_credentials {
        Some(submitted) if !submitted.is_blank() => check_credentials(submitted, &mut errors),
        _ => None,
    };

    let (Some(batch_name), Some(date), Some(start_time), Some(end_time)) = (batch_name, date, start_time, end_time) else {
        return Err(BatchRejection::Invalid(errors));
    };
    errors.into_result().map_err(BatchRejection::Invalid)?;

    check_trainers(conn, &trainer_ids).await?;

    let window = TimeWindow::new(rules.combine(date, start_time), rules.combine(date, end_time));
    check_window(window, rules, now, true).map_err(BatchRejection::Invalid)?;

    check_overlap(conn, &trainer_ids, window, None).await?;

    Ok(BatchDraft {
        batch_name,
        trainer_ids,
        window,
        lab_credentials,
    })
}

/// Run the update pipeline against the stored batch, producing the patch to apply.
#[instrument(skip_all, fields(batch_id = %existing.id), err)]
pub async fn validate_update(
    conn: &mut SqliteConnection,
    existing: &BatchDBResponse,
    input: &BatchUpdate,
    rules: &ScheduleRules,
    now: DateTime<Utc>,
) -> Outcome<BatchUpdateDBRequest> {
    if existing.end_at < now {
        return Err(BatchRejection::Conflict(FieldErrors::general(EXPIRED_BATCH_MESSAGE)));
    }

    let mut errors = FieldErrors::new();

    let batch_name = input
        .batch_name
        .as_deref()
        .and_then(|name| record(&mut errors, "batchName", check_batch_name(name)));
    let trainer_ids = input.trainer_ids.as_deref().map(dedupe);
    if trainer_ids.as_ref().is_some_and(Vec::is_empty) {
        errors.insert("trainerIds", "At least one trainer is required");
    }
    let date = input
        .date
        .as_deref()
        .and_then(|d| record(&mut errors, "date", parse_date(d).ok_or(DATE_FORMAT)));
    let start_time = input
        .start_time
        .as_deref()
        .and_then(|t| record(&mut errors, "startTime", parse_time(t).ok_or(START_TIME_FORMAT)));
    let end_time = input
        .end_time
        .as_deref()
        .and_then(|t| record(&mut errors, "endTime", parse_time(t).ok_or(END_TIME_FORMAT)));
    let lab_credentials = match &input.lab_credentials {
        None => CredentialsChange::Keep,
        Some(submitted) if submitted.is_blank() => CredentialsChange::Clear,
        Some(submitted) => check_credentials(submitted, &mut errors).map_or(CredentialsChange::Keep, CredentialsChange::Set),
    };

    errors.into_result().map_err(BatchRejection::Invalid)?;

    if let Some(ids) = &trainer_ids {
        check_trainers(conn, ids).await?;
    }

    let stored = existing.window();
    let window = if input.touches_schedule() {
        let (stored_date, stored_start) = rules.local_parts(existing.start_at);
        let (_, stored_end) = rules.local_parts(existing.end_at);
        let date = date.unwrap_or(stored_date);
        let window = TimeWindow::new(
            rules.combine(date, start_time.unwrap_or(stored_start)),
            rules.combine(date, end_time.unwrap_or(stored_end)),
        );
        Some(window)
    } else {
        None
    };
    let schedule_changed = window.is_some_and(|w| w != stored);

    // A live batch keeps its schedule, whatever the new window would have been
    if schedule_changed && stored.phase(existing.is_cancelled, now) == BatchPhase::Live {
        return Err(BatchRejection::Conflict(FieldErrors::general(LIVE_SCHEDULE_MESSAGE)));
    }
    if let Some(window) = window {
        check_window(window, rules, now, false).map_err(BatchRejection::Invalid)?;
    }

    let trainers_changed = trainer_ids.as_ref().is_some_and(|ids| *ids != existing.trainer_ids());
    if (schedule_changed || trainers_changed) && !existing.is_cancelled {
        let resolved_trainers = trainer_ids.clone().unwrap_or_else(|| existing.trainer_ids());
        check_overlap(conn, &resolved_trainers, window.unwrap_or(stored), Some(existing.id)).await?;
    }

    Ok(BatchUpdateDBRequest {
        batch_name,
        trainer_ids,
        start_at: window.map(|w| w.start_at),
        end_at: window.map(|w| w.end_at),
        lab_credentials,
    })
}

const DATE_FORMAT: &str = "Date must be in YYYY-MM-DD format";
const START_TIME_FORMAT: &str = "Start time must be in HH:mm format";
const END_TIME_FORMAT: &str = "End time must be in HH:mm format";

fn record<T>(errors: &mut FieldErrors, field: &str, checked: Result<T, &'static str>) -> Option<T> {
    match checked {
        Ok(value) => Some(value),
        Err(message) => {
            errors.insert(field, message);
            None
        }
    }
}

/// Trimmed batch name, or the reason it is unacceptable.
fn check_batch_name(name: &str) -> Result<String, &'static str> {
    let trimmed = name.trim();
    match trimmed.chars().count() {
        n if n < BATCH_NAME_MIN => Err("Batch name must be at least 3 characters"),
        n if n > BATCH_NAME_MAX => Err("Batch name must not exceed 80 characters"),
        _ => Ok(trimmed.to_string()),
    }
}

/// Drop repeated trainer ids, keeping the first occurrence of each.
fn dedupe(ids: &[UserId]) -> Vec<UserId> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    unique
}

fn check_credentials(submitted: &LabCredentialsInput, errors: &mut FieldErrors) -> Option<LabCredentials> {
    let before = errors.len();
    if Url::parse(submitted.login_url.trim()).is_err() {
        errors.insert("labCredentials.loginUrl", "Login URL must be a valid URL");
    }
    if submitted.username.trim().is_empty() {
        errors.insert("labCredentials.username", "Username is required");
    }
    if submitted.password.is_empty() {
        errors.insert("labCredentials.password", "Password is required");
    }
    if errors.len() > before {
        return None;
    }

    // Stored exactly as submitted
    Some(LabCredentials {
        login_url: submitted.login_url.clone(),
        username: submitted.username.clone(),
        password: submitted.password.clone(),
    })
}

async fn check_trainers(conn: &mut SqliteConnection, trainer_ids: &[UserId]) -> Outcome<()> {
    let found = Users::new(conn).get_bulk(trainer_ids.to_vec()).await?;

    let message = if trainer_ids.iter().any(|id| !found.contains_key(id)) {
        "Some selected trainers do not exist"
    } else if found.values().any(|user| user.role != Role::Trainer) {
        "One or more selected users are not trainers"
    } else {
        return Ok(());
    };

    let mut errors = FieldErrors::new();
    errors.insert("trainerIds", message);
    Err(BatchRejection::Invalid(errors))
}

/// Time rules for a resolved window. `require_future` is set for new batches only.
fn check_window(window: TimeWindow, rules: &ScheduleRules, now: DateTime<Utc>, require_future: bool) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if require_future && window.start_at <= now {
        errors.insert("startTime", "Batch start time must be in the future");
    }
    if window.end_at <= window.start_at {
        errors.insert("endTime", "End time must be after start time");
    } else if window.duration() < rules.min_duration {
        errors.insert(
            "endTime",
            format!("Batch duration must be at least {} minutes", rules.min_duration.num_minutes()),
        );
    }
    errors.into_result()
}

async fn check_overlap(conn: &mut SqliteConnection, trainer_ids: &[UserId], window: TimeWindow, exclude: Option<BatchId>) -> Outcome<()> {
    match overlap::find_conflicts(conn, trainer_ids, window, exclude).await? {
        Some(report) => {
            debug!(conflicting = ?report.conflicting_batches, "Trainer double-booking rejected");
            Err(BatchRejection::Conflict(FieldErrors::general(report.message())))
        }
        None => Ok(()),
    }
}

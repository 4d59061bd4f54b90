use crate::db::errors::DbError;
use crate::schedule::gate::CredentialDenial;
use crate::types::{Operation, Permission};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Serialize, Serializer};
use serde_json::json;
use thiserror::Error as ThisError;

/// Field name used for errors that are not tied to one input.
pub const GENERAL_FIELD: &str = "general";

/// Field-level validation messages, keyed by wire field name (or [`GENERAL_FIELD`]).
///
/// Only the first message recorded for a field is kept. Serializes as a JSON object in the order
/// fields were first reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    entries: Vec<(String, String)>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn general(message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(GENERAL_FIELD, message);
        errors
    }

    /// Record `message` for `field` unless the field already has one.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let field = field.into();
        if !self.contains(&field) {
            self.entries.push((field, message.into()));
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.iter().any(|(f, _)| f == field)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.entries.iter().find(|(f, _)| f == field).map(|(_, m)| m.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Headline message: the general error if any, otherwise the first field error.
    pub fn summary(&self) -> Option<&str> {
        self.get(GENERAL_FIELD).or_else(|| self.entries.first().map(|(_, m)| m.as_str()))
    }

    /// `Ok(())` when nothing was recorded, the collected errors otherwise.
    pub fn into_result(self) -> std::result::Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(f, m)| (f, m)))
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action:?} {resource}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    /// Authenticated, but the account may not do this (e.g. deactivated)
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Structural, referential or temporal problems with submitted fields
    #[error("Validation failed: {message}")]
    Validation { message: String, field_errors: FieldErrors },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Schedule conflicts and guarded edits (overlap, live schedule change, expired batch)
    #[error("Conflict: {message}")]
    Conflict { message: String, field_errors: FieldErrors },

    /// Lab credentials withheld
    #[error("Credential access denied: {0:?}")]
    Denied(CredentialDenial),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Validation error whose headline is the first field message.
    pub fn validation(field_errors: FieldErrors) -> Self {
        let message = field_errors.summary().unwrap_or("Validation failed").to_string();
        Error::Validation { message, field_errors }
    }

    /// Conflict error whose headline is the general message.
    pub fn conflict(field_errors: FieldErrors) -> Self {
        let message = field_errors.summary().unwrap_or("Conflict").to_string();
        Error::Conflict { message, field_errors }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } | Error::Forbidden { .. } | Error::Denied(_) => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } | Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource, .. } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::Forbidden { message } | Error::BadRequest { message } => message.clone(),
            Error::Validation { message, .. } | Error::Conflict { message, .. } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Denied(denial) => denial.message().to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { table, .. } => match table.as_deref() {
                    Some("users") => "An account with this email address already exists".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } | Error::Forbidden { .. } | Error::Denied(_) => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::Validation { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Validation { message, field_errors } | Error::Conflict { message, field_errors } => {
                let body = json!({
                    "message": message,
                    "fieldErrors": field_errors,
                });
                (status, axum::response::Json(body)).into_response()
            }
            Error::Denied(denial) => {
                let body = json!({
                    "message": denial.message(),
                    "reason": denial,
                });
                (status, axum::response::Json(body)).into_response()
            }
            Error::Database(DbError::UniqueViolation { table, .. }) => {
                let resource = table.as_deref().unwrap_or("unknown");
                let body = json!({
                    "message": self.user_message(),
                    "resource": resource,
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => {
                let user_message = self.user_message();
                (status, user_message).into_response()
            }
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(err.into())
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_keep_first_message_per_field() {
        let mut errors = FieldErrors::new();
        errors.insert("endTime", "End time must be after start time");
        errors.insert("endTime", "Batch duration must be at least 10 minutes");
        errors.insert("startTime", "Batch start time must be in the future");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("endTime"), Some("End time must be after start time"));
        assert_eq!(errors.summary(), Some("End time must be after start time"));
    }

    #[test]
    fn test_field_errors_summary_prefers_general() {
        let mut errors = FieldErrors::new();
        errors.insert("trainerIds", "At least one trainer is required");
        errors.insert(GENERAL_FIELD, "Something broader went wrong");

        assert_eq!(errors.summary(), Some("Something broader went wrong"));
    }

    #[test]
    fn test_field_errors_serialize_as_object_in_report_order() {
        let mut errors = FieldErrors::new();
        errors.insert("date", "Date must be in YYYY-MM-DD format");
        errors.insert("batchName", "Batch name must be at least 3 characters");

        let rendered = serde_json::to_string(&errors).unwrap();
        assert_eq!(
            rendered,
            r#"{"date":"Date must be in YYYY-MM-DD format","batchName":"Batch name must be at least 3 characters"}"#
        );
    }

    #[test]
    fn test_into_result() {
        assert_eq!(FieldErrors::new().into_result(), Ok(()));

        let rejected = FieldErrors::general("Conflict").into_result().unwrap_err();
        assert_eq!(rejected.get(GENERAL_FIELD), Some("Conflict"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation(FieldErrors::general("x")).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::conflict(FieldErrors::general("x")).status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::Denied(CredentialDenial::Expired).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::NotFound {
                resource: "Batch".to_string(),
                id: "1".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
    }
}

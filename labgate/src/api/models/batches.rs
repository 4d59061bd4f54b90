//! API request/response models for training batches.
//!
//! Responses are projections of [`BatchDBResponse`]: [`admin_view`] carries lab credentials,
//! [`trainer_view`] only says whether any are configured, and [`credential_response`] renders the
//! gate's decision. Status and `expiringSoon` are derived at projection time from the instant
//! passed in, never stored.

use crate::db::models::batches::{AssignedTrainer, BatchDBResponse, BatchScope, LabCredentials};
use crate::schedule::gate::CredentialRelease;
use crate::schedule::{BatchPhase, ScheduleRules};
use crate::types::{BatchId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lab credentials as submitted by an admin. Validated before use.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LabCredentialsInput {
    pub login_url: String,
    pub username: String,
    pub password: String,
}

impl LabCredentialsInput {
    /// All three fields empty: "no credentials" on create, "clear them" on update.
    pub fn is_blank(&self) -> bool {
        self.login_url.trim().is_empty() && self.username.trim().is_empty() && self.password.is_empty()
    }
}

/// Request body for creating a batch. `date`, `startTime` and `endTime` are wall-clock values in
/// the configured schedule offset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchCreate {
    pub batch_name: String,
    #[schema(value_type = Vec<String>)]
    pub trainer_ids: Vec<UserId>,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:mm`, 24-hour
    pub start_time: String,
    /// `HH:mm`, 24-hour
    pub end_time: String,
    pub lab_credentials: Option<LabCredentialsInput>,
}

/// Request body for updating a batch. Omitted fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchUpdate {
    pub batch_name: Option<String>,
    #[schema(value_type = Option<Vec<String>>)]
    pub trainer_ids: Option<Vec<UserId>>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// All three sub-fields empty clears stored credentials
    pub lab_credentials: Option<LabCredentialsInput>,
}

impl BatchUpdate {
    pub fn touches_schedule(&self) -> bool {
        self.date.is_some() || self.start_time.is_some() || self.end_time.is_some()
    }
}

/// A batch as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BatchId,
    pub batch_name: String,
    pub trainers: Vec<AssignedTrainer>,
    #[schema(value_type = Vec<String>)]
    pub trainer_ids: Vec<UserId>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// Local calendar date of `startAt` in the schedule offset
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: BatchPhase,
    pub expiring_soon: bool,
    pub is_cancelled: bool,
    pub has_credentials: bool,
    /// Only present in admin views
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_credentials: Option<LabCredentials>,
    #[schema(value_type = String, format = "uuid")]
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin projection: includes lab credentials.
pub fn admin_view(batch: BatchDBResponse, rules: &ScheduleRules, now: DateTime<Utc>) -> BatchResponse {
    project(batch, rules, now, true)
}

/// Trainer projection: lab credentials are never included, only whether they exist.
pub fn trainer_view(batch: BatchDBResponse, rules: &ScheduleRules, now: DateTime<Utc>) -> BatchResponse {
    project(batch, rules, now, false)
}

/// Projection matching the caller's scope.
pub fn scoped_view(scope: BatchScope, batch: BatchDBResponse, rules: &ScheduleRules, now: DateTime<Utc>) -> BatchResponse {
    match scope {
        BatchScope::All => admin_view(batch, rules, now),
        BatchScope::AssignedTo(_) => trainer_view(batch, rules, now),
    }
}

fn project(batch: BatchDBResponse, rules: &ScheduleRules, now: DateTime<Utc>, include_credentials: bool) -> BatchResponse {
    let window = batch.window();
    let (date, start_time) = rules.local_parts(batch.start_at);
    let (_, end_time) = rules.local_parts(batch.end_at);

    BatchResponse {
        id: batch.id,
        trainer_ids: batch.trainer_ids(),
        trainers: batch.trainers,
        start_at: batch.start_at,
        end_at: batch.end_at,
        date: date.format("%Y-%m-%d").to_string(),
        start_time: start_time.format("%H:%M").to_string(),
        end_time: end_time.format("%H:%M").to_string(),
        status: window.phase(batch.is_cancelled, now),
        expiring_soon: rules.is_expiring_soon(&window, batch.is_cancelled, now),
        is_cancelled: batch.is_cancelled,
        has_credentials: batch.lab_credentials.is_some(),
        lab_credentials: if include_credentials { batch.lab_credentials } else { None },
        batch_name: batch.batch_name,
        created_by: batch.created_by,
        created_at: batch.created_at,
        updated_at: batch.updated_at,
    }
}

/// Response for the credential endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub has_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<LabCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn credential_response(release: CredentialRelease) -> CredentialResponse {
    match release {
        CredentialRelease::Released {
            credentials,
            batch_name,
            end_at,
        } => CredentialResponse {
            has_credentials: true,
            credentials: Some(credentials),
            batch_name: Some(batch_name),
            end_at: Some(end_at),
            message: None,
        },
        CredentialRelease::NotConfigured => CredentialResponse {
            has_credentials: false,
            credentials: None,
            batch_name: None,
            end_at: None,
            message: Some("No lab credentials configured for this batch.".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn batch(with_credentials: bool) -> BatchDBResponse {
        let trainer = AssignedTrainer {
            id: Uuid::new_v4(),
            full_name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
        };
        BatchDBResponse {
            id: Uuid::new_v4(),
            batch_name: "React 101".to_string(),
            trainers: vec![trainer],
            start_at: Utc.with_ymd_and_hms(2030, 1, 10, 4, 30, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2030, 1, 10, 5, 30, 0).unwrap(),
            is_cancelled: false,
            lab_credentials: with_credentials.then(|| LabCredentials {
                login_url: "https://lab.example.com".to_string(),
                username: "student".to_string(),
                password: "hunter2".to_string(),
            }),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_trainer_view_never_contains_credentials() {
        let rules = ScheduleRules::default();
        let b = batch(true);
        let now = b.start_at + Duration::minutes(5);

        let view = trainer_view(b, &rules, now);
        assert!(view.has_credentials);
        assert!(view.lab_credentials.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("labCredentials").is_none());
        assert_eq!(json["hasCredentials"], true);
        assert_eq!(json["status"], "Live");
    }

    #[test]
    fn test_admin_view_includes_credentials_and_local_times() {
        let rules = ScheduleRules::default();
        let b = batch(true);
        let now = b.start_at - Duration::days(1);

        let view = admin_view(b, &rules, now);
        assert_eq!(view.status, BatchPhase::Upcoming);
        assert_eq!(view.date, "2030-01-10");
        assert_eq!(view.start_time, "10:00");
        assert_eq!(view.end_time, "11:00");
        assert!(!view.expiring_soon);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["labCredentials"]["loginUrl"], "https://lab.example.com");
        assert_eq!(json["labCredentials"]["password"], "hunter2");
    }

    #[test]
    fn test_credential_response_shapes() {
        let released = credential_response(CredentialRelease::Released {
            credentials: LabCredentials {
                login_url: "https://lab.example.com".to_string(),
                username: "student".to_string(),
                password: "hunter2".to_string(),
            },
            batch_name: "React 101".to_string(),
            end_at: Utc.with_ymd_and_hms(2030, 1, 10, 5, 30, 0).unwrap(),
        });
        let json = serde_json::to_value(&released).unwrap();
        assert_eq!(json["hasCredentials"], true);
        assert_eq!(json["credentials"]["username"], "student");
        assert_eq!(json["batchName"], "React 101");
        assert!(json.get("message").is_none());

        let empty = serde_json::to_value(credential_response(CredentialRelease::NotConfigured)).unwrap();
        assert_eq!(
            empty,
            serde_json::json!({
                "hasCredentials": false,
                "message": "No lab credentials configured for this batch."
            })
        );
    }
}

//! The credential release decision.
//!
//! Lab credentials leave the server only when the batch is Live according to the server's own
//! clock and the caller is entitled to the batch. Nothing the client says about the batch's status
//! takes part in the decision.

use crate::db::models::batches::{BatchDBResponse, BatchScope, LabCredentials};
use crate::schedule::window::BatchPhase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Why lab credentials were withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CredentialDenial {
    NotAssigned,
    Cancelled,
    NotYetAvailable,
    Expired,
}

impl CredentialDenial {
    pub fn message(&self) -> &'static str {
        match self {
            CredentialDenial::NotAssigned => "Access denied. You are not assigned to this batch.",
            CredentialDenial::Cancelled => "This batch has been cancelled.",
            CredentialDenial::NotYetAvailable => "Lab access is not available yet. Please wait until the batch starts.",
            CredentialDenial::Expired => "Lab access has expired. The batch has ended.",
        }
    }
}

/// A successful pass through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialRelease {
    Released {
        credentials: LabCredentials,
        batch_name: String,
        end_at: DateTime<Utc>,
    },
    /// The batch is live but has no credentials attached
    NotConfigured,
}

/// Decide whether `scope` may read the credentials of `batch` at `now`.
///
/// Checks run in a fixed order: assignment, cancellation, phase, then whether anything is
/// configured. Admin scopes skip only the assignment check.
pub fn evaluate(batch: &BatchDBResponse, scope: BatchScope, now: DateTime<Utc>) -> Result<CredentialRelease, CredentialDenial> {
    if !scope.permits(batch) {
        return Err(CredentialDenial::NotAssigned);
    }

    match batch.window().phase(batch.is_cancelled, now) {
        BatchPhase::Cancelled => return Err(CredentialDenial::Cancelled),
        BatchPhase::Upcoming => return Err(CredentialDenial::NotYetAvailable),
        BatchPhase::Expired => return Err(CredentialDenial::Expired),
        BatchPhase::Live => {}
    }

    Ok(match &batch.lab_credentials {
        Some(credentials) => CredentialRelease::Released {
            credentials: credentials.clone(),
            batch_name: batch.batch_name.clone(),
            end_at: batch.end_at,
        },
        None => CredentialRelease::NotConfigured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::batches::AssignedTrainer;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn live_batch(trainer: Uuid, credentials: bool) -> BatchDBResponse {
        BatchDBResponse {
            id: Uuid::new_v4(),
            batch_name: "React 101".to_string(),
            trainers: vec![AssignedTrainer {
                id: trainer,
                full_name: "Asha Rao".to_string(),
                email: "asha@example.com".to_string(),
            }],
            start_at: Utc.with_ymd_and_hms(2030, 1, 10, 4, 30, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2030, 1, 10, 5, 30, 0).unwrap(),
            is_cancelled: false,
            lab_credentials: credentials.then(|| LabCredentials {
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
    fn test_assigned_trainer_receives_credentials_while_live() {
        let trainer = Uuid::new_v4();
        let batch = live_batch(trainer, true);
        let now = batch.start_at + Duration::minutes(1);

        match evaluate(&batch, BatchScope::AssignedTo(trainer), now) {
            Ok(CredentialRelease::Released {
                credentials,
                batch_name,
                end_at,
            }) => {
                assert_eq!(credentials.username, "student");
                assert_eq!(batch_name, "React 101");
                assert_eq!(end_at, batch.end_at);
            }
            other => panic!("expected release, got {other:?}"),
        }
    }

    #[test]
    fn test_window_edges() {
        let trainer = Uuid::new_v4();
        let batch = live_batch(trainer, true);
        let scope = BatchScope::AssignedTo(trainer);

        assert_eq!(
            evaluate(&batch, scope, batch.start_at - Duration::milliseconds(1)),
            Err(CredentialDenial::NotYetAvailable)
        );
        assert!(evaluate(&batch, scope, batch.start_at).is_ok());
        assert!(evaluate(&batch, scope, batch.end_at).is_ok());
        assert_eq!(
            evaluate(&batch, scope, batch.end_at + Duration::milliseconds(1)),
            Err(CredentialDenial::Expired)
        );
    }

    #[test]
    fn test_unassigned_trainer_is_denied_before_phase_is_considered() {
        let batch = live_batch(Uuid::new_v4(), true);
        let outsider = BatchScope::AssignedTo(Uuid::new_v4());

        assert_eq!(evaluate(&batch, outsider, batch.start_at - Duration::days(1)), Err(CredentialDenial::NotAssigned));
    }

    #[test]
    fn test_cancelled_wins_over_time_for_everyone() {
        let trainer = Uuid::new_v4();
        let mut batch = live_batch(trainer, true);
        batch.is_cancelled = true;
        let now = batch.start_at + Duration::minutes(1);

        assert_eq!(evaluate(&batch, BatchScope::AssignedTo(trainer), now), Err(CredentialDenial::Cancelled));
        assert_eq!(evaluate(&batch, BatchScope::All, now), Err(CredentialDenial::Cancelled));
    }

    #[test]
    fn test_admin_is_still_time_gated() {
        let batch = live_batch(Uuid::new_v4(), true);

        assert_eq!(
            evaluate(&batch, BatchScope::All, batch.start_at - Duration::minutes(1)),
            Err(CredentialDenial::NotYetAvailable)
        );
        assert!(matches!(
            evaluate(&batch, BatchScope::All, batch.start_at + Duration::minutes(1)),
            Ok(CredentialRelease::Released { .. })
        ));
    }

    #[test]
    fn test_live_batch_without_credentials() {
        let trainer = Uuid::new_v4();
        let batch = live_batch(trainer, false);

        assert_eq!(
            evaluate(&batch, BatchScope::AssignedTo(trainer), batch.start_at),
            Ok(CredentialRelease::NotConfigured)
        );
    }

    #[test]
    fn test_denial_serializes_as_snake_case_reason() {
        assert_eq!(serde_json::to_value(CredentialDenial::NotYetAvailable).unwrap(), "not_yet_available");
        assert_eq!(serde_json::to_value(CredentialDenial::NotAssigned).unwrap(), "not_assigned");
    }
}

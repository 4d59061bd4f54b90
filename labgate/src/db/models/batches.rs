//! Database models for training batches.

use crate::schedule::window::TimeWindow;
use crate::types::{BatchId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Lab environment login attached to a batch. All three fields are present together or not at all.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabCredentials {
    pub login_url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LabCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabCredentials")
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What an update does to the stored lab credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CredentialsChange {
    #[default]
    Keep,
    Set(LabCredentials),
    Clear,
}

/// Which batches a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchScope {
    /// Every batch (admins)
    All,
    /// Only batches the user is assigned to (trainers)
    AssignedTo(UserId),
}

impl BatchScope {
    pub fn permits(&self, batch: &BatchDBResponse) -> bool {
        match self {
            BatchScope::All => true,
            BatchScope::AssignedTo(user_id) => batch.is_assigned(*user_id),
        }
    }
}

/// Database request for creating a batch. The schedule is already resolved to UTC instants.
#[derive(Debug, Clone)]
pub struct BatchCreateDBRequest {
    pub batch_name: String,
    /// Ordered, deduplicated
    pub trainer_ids: Vec<UserId>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub lab_credentials: Option<LabCredentials>,
    pub created_by: UserId,
}

/// Database request for patching a batch. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct BatchUpdateDBRequest {
    pub batch_name: Option<String>,
    pub trainer_ids: Option<Vec<UserId>>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub lab_credentials: CredentialsChange,
}

/// A trainer as stored against a batch, joined with their profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignedTrainer {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub full_name: String,
    pub email: String,
}

/// Database response for a batch, including its secret fields.
#[derive(Debug, Clone)]
pub struct BatchDBResponse {
    pub id: BatchId,
    pub batch_name: String,
    /// In assignment order
    pub trainers: Vec<AssignedTrainer>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub is_cancelled: bool,
    pub lab_credentials: Option<LabCredentials>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchDBResponse {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start_at, self.end_at)
    }

    pub fn is_assigned(&self, user_id: UserId) -> bool {
        self.trainers.iter().any(|t| t.id == user_id)
    }

    pub fn trainer_ids(&self) -> Vec<UserId> {
        self.trainers.iter().map(|t| t.id).collect()
    }
}

/// One trainer's booking in a non-cancelled batch, as scanned by the overlap detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSlot {
    pub batch_id: BatchId,
    pub trainer_id: UserId,
    pub trainer_name: String,
    pub window: TimeWindow,
}

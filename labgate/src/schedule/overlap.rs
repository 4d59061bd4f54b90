//! Trainer double-booking detection.
//!
//! Two windows `[s1, e1)` and `[s2, e2)` conflict iff `s1 < e2 && s2 < e1`, so back-to-back
//! batches sharing a trainer are fine. Cancelled batches never conflict.

use crate::db::errors::Result;
use crate::db::handlers::Batches;
use crate::db::models::batches::ScheduledSlot;
use crate::schedule::window::TimeWindow;
use crate::types::{BatchId, UserId};
use sqlx::SqliteConnection;
use tracing::instrument;

/// Trainers who are already booked during a requested window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapReport {
    /// Full names in the order the trainers were requested
    pub trainer_names: Vec<String>,
    /// Batches that caused the conflict, in schedule order
    pub conflicting_batches: Vec<BatchId>,
}

impl OverlapReport {
    pub fn message(&self) -> String {
        format!("{} already has a batch scheduled during this time", self.trainer_names.join(", "))
    }
}

/// Decide conflicts between a requested window and existing bookings.
///
/// Slots for `exclude` (the batch being edited) are ignored, as are slots that merely touch the
/// requested window.
pub fn detect(requested: &[UserId], window: TimeWindow, slots: &[ScheduledSlot], exclude: Option<BatchId>) -> Option<OverlapReport> {
    let clashing: Vec<&ScheduledSlot> = slots
        .iter()
        .filter(|slot| Some(slot.batch_id) != exclude && slot.window.overlaps(&window))
        .collect();

    let mut trainer_names = Vec::new();
    for trainer_id in requested {
        if let Some(slot) = clashing.iter().find(|slot| slot.trainer_id == *trainer_id) {
            trainer_names.push(slot.trainer_name.clone());
        }
    }
    if trainer_names.is_empty() {
        return None;
    }

    let mut conflicting_batches: Vec<BatchId> = Vec::new();
    for slot in clashing.iter().filter(|slot| requested.contains(&slot.trainer_id)) {
        if !conflicting_batches.contains(&slot.batch_id) {
            conflicting_batches.push(slot.batch_id);
        }
    }

    Some(OverlapReport {
        trainer_names,
        conflicting_batches,
    })
}

/// Look up the bookings of `trainer_ids` around `window` and report any conflict.
///
/// Run this on the same connection (transaction) as the write it guards.
#[instrument(skip(conn, trainer_ids), fields(trainers = trainer_ids.len()), err)]
pub async fn find_conflicts(
    conn: &mut SqliteConnection,
    trainer_ids: &[UserId],
    window: TimeWindow,
    exclude: Option<BatchId>,
) -> Result<Option<OverlapReport>> {
    let slots = Batches::new(conn).scheduled_slots(trainer_ids, window, exclude).await?;
    Ok(detect(trainer_ids, window, &slots, exclude))
}

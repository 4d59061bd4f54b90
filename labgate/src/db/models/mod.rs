//! Database record models.
//!
//! Requests and responses exchanged with the repositories in [`crate::db::handlers`]. They are
//! kept separate from the API models in [`crate::api::models`] so storage and wire
//! representations can change independently; in particular the batch response here always carries
//! lab credentials, and redaction happens when projecting to an API view.
//!
//! - [`users`]: Portal accounts
//! - [`batches`]: Training batches, their trainers and lab credentials

pub mod batches;
pub mod users;

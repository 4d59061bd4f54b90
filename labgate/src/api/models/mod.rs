//! API request and response data models.
//!
//! This module contains the data structures used for HTTP request deserialization
//! and response serialization. These models define the public API contract; fields are
//! camelCase on the wire.
//!
//! # Design Principles
//!
//! - **Separation of Concerns**: API models are distinct from database models,
//!   allowing independent evolution of API and storage representations
//! - **Redaction at the boundary**: secrets leave the service only through explicit projections
//!   ([`batches::admin_view`], [`batches::credential_response`])
//! - **OpenAPI**: All models are annotated with `utoipa` for automatic API docs
//!
//! # Model Categories
//!
//! - [`users`]: Roles, user profiles and the trainer directory
//! - [`batches`]: Batch create/update payloads, batch views and credential responses
//! - [`auth`]: Registration, login and session payloads

pub mod auth;
pub mod batches;
pub mod users;

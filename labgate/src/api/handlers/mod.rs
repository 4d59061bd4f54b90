//! HTTP request handlers for all API endpoints.
//!
//! Each handler is responsible for:
//! - Request deserialization
//! - Authentication and authorization checks
//! - Running the scheduling engine and repositories, in one transaction where they write
//! - Projecting results for the caller's role
//!
//! # Handler Modules
//!
//! - [`auth`]: Registration, login, token refresh and logout
//! - [`batches`]: Batch CRUD, cancellation and the credential endpoint
//! - [`users`]: Trainer directory and current user profile
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching HTTP status and a JSON
//! body (`{message, fieldErrors}` for validation errors and conflicts).

pub mod auth;
pub mod batches;
pub mod users;

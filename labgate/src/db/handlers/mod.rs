//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed SQLx connection (pooled or transactional) and implements
//! the [`Repository`] trait for the common CRUD operations, plus entity-specific queries.
//!
//! # Available Repositories
//!
//! - [`Users`]: Accounts, credential lookups and the trainer directory
//! - [`Batches`]: Training batches, trainer assignment, cancellation and schedule scans

pub mod batches;
pub mod repository;
pub mod users;

pub use batches::Batches;
pub use repository::Repository;
pub use users::Users;

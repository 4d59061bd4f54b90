//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with SQLite.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers, scheduling pipeline)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   SQLite    │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations for CRUD operations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Repositories borrow a `SqliteConnection`, so they work the same on a pooled connection or inside
//! a transaction. Batch writes always run inside a transaction that also covers the validation
//! reads (trainer lookup, overlap scan), so a concurrent writer that invalidated those reads makes
//! the commit fail rather than double-book a trainer:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let draft = validate_create(&mut tx, &input, &rules, clock.now()).await?;
//! let batch = Batches::new(&mut tx).create(&draft.into_request(admin.id)).await?;
//! tx.commit().await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;

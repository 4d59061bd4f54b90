//! Authentication and authorization.
//!
//! Callers authenticate with email and password at `/authentication/login` and receive two
//! HTTP-only cookies:
//!
//! - a short-lived **access token** (JWT, `kind: access`) identifying the user and their role
//! - a long-lived **refresh token** (JWT, `kind: refresh`, path `/authentication`) whose Argon2
//!   hash is stored on the user row, so only the most recently issued one can be redeemed
//!
//! Programmatic clients may send the access token as `Authorization: Bearer <token>` instead.
//!
//! Authorization is role based: admins manage batches, trainers read the batches they are
//! assigned to. See [`permissions`].
//!
//! # Modules
//!
//! - [`current_user`]: Extractors for getting the authenticated user in handlers
//! - [`password`]: Password hashing, verification and strength rules
//! - [`permissions`]: Role checks and batch scoping
//! - [`session`]: JWT creation and verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use labgate::api::models::users::CurrentUser;
//! use labgate::auth::permissions::require;
//! use labgate::types::{Operation, Resource};
//!
//! async fn admin_only(current_user: CurrentUser) -> Result<String, Error> {
//!     require(&current_user, Resource::Batches, Operation::CreateAll)?;
//!     Ok(format!("Hello, {}!", current_user.full_name))
//! }
//! ```

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;

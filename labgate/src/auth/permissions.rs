//! Role checks and batch scoping.
//!
//! Two roles exist. Admins may do everything; trainers may read the batches they are assigned to
//! and, subject to the credential gate, those batches' lab credentials.

use crate::{
    api::models::users::{CurrentUser, Role},
    db::models::batches::BatchScope,
    errors::{Error, Result},
    types::{Operation, Permission, Resource},
};

/// Whether `role` may perform `operation` on `resource`.
pub fn role_has_permission(role: Role, resource: Resource, operation: Operation) -> bool {
    match role {
        Role::Admin => true,
        Role::Trainer => matches!(
            (resource, operation),
            (Resource::Batches, Operation::ReadOwn) | (Resource::Credentials, Operation::ReadOwn)
        ),
    }
}

/// Fail with `InsufficientPermissions` unless the caller's role allows the operation.
pub fn require(user: &CurrentUser, resource: Resource, operation: Operation) -> Result<()> {
    if role_has_permission(user.role, resource, operation) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            required: Permission::Allow(resource, operation),
            action: operation,
            resource: resource.to_string(),
        })
    }
}

/// Which batches the caller may see: all of them for admins, their own assignments otherwise.
pub fn batch_scope(user: &CurrentUser) -> BatchScope {
    if role_has_permission(user.role, Resource::Batches, Operation::ReadAll) {
        BatchScope::All
    } else {
        BatchScope::AssignedTo(user.id)
    }
}

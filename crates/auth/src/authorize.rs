use thiserror::Error;

use quoteflow_core::DomainError;

use crate::{Actor, Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: Role, permission: String },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Static role → permission policy.
///
/// `quotation.reject` is granted to `admin` only; every other staff capability
/// is shared by `admin` and `superadmin`.
pub fn permissions_for(role: Role) -> &'static [Permission] {
    const CUSTOMER: &[Permission] = &[Permission::QUOTATION_CREATE, Permission::QUOTATION_CONVERT];
    const DELIVERY: &[Permission] = &[Permission::QUOTATION_DELIVER];
    const ADMIN: &[Permission] = &[
        Permission::QUOTATION_CREATE,
        Permission::QUOTATION_MANAGE_ANY,
        Permission::QUOTATION_APPROVE,
        Permission::QUOTATION_REJECT,
        Permission::CANCELLATION_REVIEW,
        Permission::INVENTORY_MANAGE,
        Permission::INVENTORY_TRANSFER,
        Permission::PURCHASING_MANAGE,
        Permission::PURCHASING_RECEIVE,
        Permission::SALE_RECORD,
        Permission::SALE_PAYMENT,
    ];
    const SUPERADMIN: &[Permission] = &[
        Permission::QUOTATION_CREATE,
        Permission::QUOTATION_MANAGE_ANY,
        Permission::QUOTATION_APPROVE,
        Permission::CANCELLATION_REVIEW,
        Permission::INVENTORY_MANAGE,
        Permission::INVENTORY_TRANSFER,
        Permission::PURCHASING_MANAGE,
        Permission::PURCHASING_RECEIVE,
        Permission::SALE_RECORD,
        Permission::SALE_PAYMENT,
    ];

    match role {
        Role::Customer => CUSTOMER,
        Role::Delivery => DELIVERY,
        Role::Admin => ADMIN,
        Role::Superadmin => SUPERADMIN,
    }
}

/// Authorize an actor for a single permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(actor: &Actor, required: &Permission) -> Result<(), AuthzError> {
    if permissions_for(actor.role).iter().any(|p| p == required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: actor.role,
            permission: required.as_str().to_string(),
        })
    }
}

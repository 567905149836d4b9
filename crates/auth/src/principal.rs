use serde::{Deserialize, Serialize};

use quoteflow_core::UserId;

use crate::Role;

/// An authenticated actor, as handed over by the authentication collaborator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn customer(id: UserId) -> Self {
        Self::new(id, Role::Customer)
    }

    pub fn admin(id: UserId) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn superadmin(id: UserId) -> Self {
        Self::new(id, Role::Superadmin)
    }

    pub fn delivery(id: UserId) -> Self {
        Self::new(id, Role::Delivery)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

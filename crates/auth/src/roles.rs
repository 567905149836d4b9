use core::str::FromStr;

use serde::{Deserialize, Serialize};

use quoteflow_core::DomainError;

/// Role of an authenticated actor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
    Superadmin,
    Delivery,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
            Role::Delivery => "delivery",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            "delivery" => Ok(Role::Delivery),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

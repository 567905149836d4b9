//! `quoteflow-auth`: authorization boundary.
//!
//! Authentication is done elsewhere; this crate only receives an already
//! authenticated [`Actor`] and decides what its role allows.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize, permissions_for};
pub use permissions::Permission;
pub use principal::Actor;
pub use roles::Role;

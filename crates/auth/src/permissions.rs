use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. "quotation.approve").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const QUOTATION_CREATE: Permission = Permission::fixed("quotation.create");
    /// Revise or cancel quotations created by someone else.
    pub const QUOTATION_MANAGE_ANY: Permission = Permission::fixed("quotation.manage_any");
    pub const QUOTATION_APPROVE: Permission = Permission::fixed("quotation.approve");
    pub const QUOTATION_REJECT: Permission = Permission::fixed("quotation.reject");
    pub const QUOTATION_DELIVER: Permission = Permission::fixed("quotation.deliver");
    pub const QUOTATION_CONVERT: Permission = Permission::fixed("quotation.convert");
    pub const CANCELLATION_REVIEW: Permission = Permission::fixed("quotation.cancellation.review");
    pub const INVENTORY_MANAGE: Permission = Permission::fixed("inventory.manage");
    pub const INVENTORY_TRANSFER: Permission = Permission::fixed("inventory.transfer");
    pub const PURCHASING_MANAGE: Permission = Permission::fixed("purchasing.manage");
    pub const PURCHASING_RECEIVE: Permission = Permission::fixed("purchasing.receive");
    pub const SALE_RECORD: Permission = Permission::fixed("sale.record");
    pub const SALE_PAYMENT: Permission = Permission::fixed("sale.payment");

    const fn fixed(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

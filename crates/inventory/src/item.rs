use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quoteflow_core::{Aggregate, AggregateId, AggregateRoot, BranchId, DomainError};
use quoteflow_events::Event;

/// Inventory item identifier.
///
/// Derived from `(item_code, branch)`, so the same item code stocked at two
/// branches is two items, and the record for a code at a branch can be found
/// without a secondary index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn for_code(item_code: &str, branch_id: Option<BranchId>) -> Self {
        let scope = branch_id.map(|b| b.to_string()).unwrap_or_else(|| "global".to_string());
        Self(AggregateId::derived("inventory.item", &format!("{item_code}@{scope}")))
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Why a quantity changed; kept on every adjustment for audit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    Sale,
    CancellationRestock,
    TransferOut,
    TransferIn,
    Receiving,
    Manual,
    /// Undoing an earlier adjustment of a failed reconciliation.
    Compensation,
}

/// Aggregate root: InventoryItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    item_code: String,
    barcode: Option<String>,
    branch_id: Option<BranchId>,
    name: String,
    unit: String,
    cost: i64,
    price: i64,
    quantity: i64,
    active: bool,
    version: u64,
    created: bool,
}

impl InventoryItem {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryItemId) -> Self {
        Self {
            id,
            item_code: String::new(),
            barcode: None,
            branch_id: None,
            name: String::new(),
            unit: String::new(),
            cost: 0,
            price: 0,
            quantity: 0,
            active: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn item_code(&self) -> &str {
        &self.item_code
    }

    pub fn barcode(&self) -> Option<&str> {
        self.barcode.as_deref()
    }

    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn cost(&self) -> i64 {
        self.cost
    }

    pub fn price(&self) -> i64 {
        self.price
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateItem {
    pub item_id: InventoryItemId,
    pub item_code: String,
    pub barcode: Option<String>,
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub unit: String,
    pub cost: i64,
    pub price: i64,
    pub initial_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustQuantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustQuantity {
    pub item_id: InventoryItemId,
    pub delta: i64,
    pub reason: AdjustmentReason,
    /// Business document that caused the change (e.g. a quotation number).
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivateItem (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivateItem {
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryCommand {
    CreateItem(CreateItem),
    AdjustQuantity(AdjustQuantity),
    DeactivateItem(DeactivateItem),
}

/// Event: ItemCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub item_id: InventoryItemId,
    pub item_code: String,
    pub barcode: Option<String>,
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub unit: String,
    pub cost: i64,
    pub price: i64,
    pub initial_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QuantityAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityAdjusted {
    pub item_id: InventoryItemId,
    pub delta: i64,
    pub quantity_after: i64,
    pub reason: AdjustmentReason,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeactivated {
    pub item_id: InventoryItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ItemCreated(ItemCreated),
    QuantityAdjusted(QuantityAdjusted),
    ItemDeactivated(ItemDeactivated),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ItemCreated(_) => "inventory.item.created",
            InventoryEvent::QuantityAdjusted(_) => "inventory.item.quantity_adjusted",
            InventoryEvent::ItemDeactivated(_) => "inventory.item.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ItemCreated(e) => e.occurred_at,
            InventoryEvent::QuantityAdjusted(e) => e.occurred_at,
            InventoryEvent::ItemDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ItemCreated(e) => {
                self.id = e.item_id;
                self.item_code = e.item_code.clone();
                self.barcode = e.barcode.clone();
                self.branch_id = e.branch_id;
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.cost = e.cost;
                self.price = e.price;
                self.quantity = e.initial_quantity;
                self.active = true;
                self.created = true;
            }
            InventoryEvent::QuantityAdjusted(e) => {
                self.quantity += e.delta;
            }
            InventoryEvent::ItemDeactivated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::CreateItem(cmd) => self.handle_create(cmd),
            InventoryCommand::AdjustQuantity(cmd) => self.handle_adjust(cmd),
            InventoryCommand::DeactivateItem(cmd) => self.handle_deactivate(cmd),
        }
    }
}

impl InventoryItem {
    fn ensure_item_id(&self, item_id: InventoryItemId) -> Result<(), DomainError> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("inventory item {}", self.id)));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("item already exists"));
        }
        self.ensure_item_id(cmd.item_id)?;

        if cmd.item_code.trim().is_empty() {
            return Err(DomainError::validation("item_code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.item_id != InventoryItemId::for_code(&cmd.item_code, cmd.branch_id) {
            return Err(DomainError::validation(
                "item_id does not match item_code and branch",
            ));
        }
        if cmd.cost < 0 || cmd.price < 0 {
            return Err(DomainError::validation("cost and price cannot be negative"));
        }
        if cmd.initial_quantity < 0 {
            return Err(DomainError::validation("initial quantity cannot be negative"));
        }

        Ok(vec![InventoryEvent::ItemCreated(ItemCreated {
            item_id: cmd.item_id,
            item_code: cmd.item_code.trim().to_string(),
            barcode: cmd.barcode.clone(),
            branch_id: cmd.branch_id,
            name: cmd.name.trim().to_string(),
            unit: cmd.unit.clone(),
            cost: cmd.cost,
            price: cmd.price,
            initial_quantity: cmd.initial_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustQuantity) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        // Deactivated items may still be restocked (compensations must land).
        if cmd.delta < 0 && !self.active {
            return Err(DomainError::validation(format!(
                "item {} is deactivated",
                self.item_code
            )));
        }

        let quantity_after = self
            .quantity
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("quantity overflows"))?;
        if quantity_after < 0 {
            let requested = cmd
                .delta
                .checked_neg()
                .ok_or_else(|| DomainError::validation("delta out of range"))?;
            return Err(DomainError::insufficient_stock(
                self.item_code.clone(),
                self.quantity,
                requested,
            ));
        }

        Ok(vec![InventoryEvent::QuantityAdjusted(QuantityAdjusted {
            item_id: cmd.item_id,
            delta: cmd.delta,
            quantity_after,
            reason: cmd.reason,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivateItem) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_item_id(cmd.item_id)?;

        if !self.active {
            return Ok(vec![]);
        }

        Ok(vec![InventoryEvent::ItemDeactivated(ItemDeactivated {
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

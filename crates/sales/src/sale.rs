use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quoteflow_core::{Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, UserId};
use quoteflow_events::Event;
use quoteflow_inventory::InventoryItemId;

/// Sale identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Payment status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Pending,
    Partial,
    Paid,
    /// Rolled back before its quotation completed; does not count as a sale.
    Discarded,
}

impl SaleStatus {
    fn for_payment(total: i64, amount_paid: i64) -> Self {
        if amount_paid >= total {
            SaleStatus::Paid
        } else if amount_paid > 0 {
            SaleStatus::Partial
        } else {
            SaleStatus::Pending
        }
    }
}

/// A line as handed to `RecordSale`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSaleItem {
    pub inventory_item_id: InventoryItemId,
    pub description: String,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: i64,
}

/// Sale line: `total == quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub line_no: u32,
    pub inventory_item_id: InventoryItemId,
    pub description: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub total: i64,
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    number: Option<DocumentNumber>,
    quotation_id: Option<AggregateId>,
    customer_id: UserId,
    recorded_by: UserId,
    items: Vec<SaleItem>,
    subtotal: i64,
    tax_amount: i64,
    discount_amount: i64,
    total: i64,
    amount_paid: i64,
    status: SaleStatus,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            number: None,
            quotation_id: None,
            customer_id: UserId::default(),
            recorded_by: UserId::default(),
            items: Vec::new(),
            subtotal: 0,
            tax_amount: 0,
            discount_amount: 0,
            total: 0,
            amount_paid: 0,
            status: SaleStatus::Pending,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn quotation_id(&self) -> Option<AggregateId> {
        self.quotation_id
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn recorded_by(&self) -> UserId {
        self.recorded_by
    }

    pub fn items(&self) -> &[SaleItem] {
        &self.items
    }

    pub fn subtotal(&self) -> i64 {
        self.subtotal
    }

    pub fn tax_amount(&self) -> i64 {
        self.tax_amount
    }

    pub fn discount_amount(&self) -> i64 {
        self.discount_amount
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn amount_paid(&self) -> i64 {
        self.amount_paid
    }

    pub fn balance(&self) -> i64 {
        self.total - self.amount_paid
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn is_discarded(&self) -> bool {
        self.status == SaleStatus::Discarded
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSale {
    pub sale_id: SaleId,
    pub sale_number: DocumentNumber,
    pub quotation_id: Option<AggregateId>,
    pub customer_id: UserId,
    pub recorded_by: UserId,
    pub items: Vec<NewSaleItem>,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub sale_id: SaleId,
    pub amount: i64,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DiscardSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardSale {
    pub sale_id: SaleId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    RecordPayment(RecordPayment),
    DiscardSale(DiscardSale),
}

/// Event: SaleRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub sale_id: SaleId,
    pub sale_number: DocumentNumber,
    pub quotation_id: Option<AggregateId>,
    pub customer_id: UserId,
    pub recorded_by: UserId,
    pub items: Vec<SaleItem>,
    pub subtotal: i64,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub sale_id: SaleId,
    pub amount: i64,
    pub amount_paid_after: i64,
    pub status_after: SaleStatus,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleDiscarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDiscarded {
    pub sale_id: SaleId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    PaymentRecorded(PaymentRecorded),
    SaleDiscarded(SaleDiscarded),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sale.created",
            SaleEvent::PaymentRecorded(_) => "sale.payment_recorded",
            SaleEvent::SaleDiscarded(_) => "sale.discarded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::PaymentRecorded(e) => e.occurred_at,
            SaleEvent::SaleDiscarded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.number = Some(e.sale_number.clone());
                self.quotation_id = e.quotation_id;
                self.customer_id = e.customer_id;
                self.recorded_by = e.recorded_by;
                self.items = e.items.clone();
                self.subtotal = e.subtotal;
                self.tax_amount = e.tax_amount;
                self.discount_amount = e.discount_amount;
                self.total = e.total;
                self.amount_paid = 0;
                self.status = SaleStatus::Pending;
                self.created = true;
            }
            SaleEvent::PaymentRecorded(e) => {
                self.amount_paid = e.amount_paid_after;
                self.status = e.status_after;
            }
            SaleEvent::SaleDiscarded(_) => {
                self.status = SaleStatus::Discarded;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::RecordPayment(cmd) => self.handle_payment(cmd),
            SaleCommand::DiscardSale(cmd) => self.handle_discard(cmd),
        }
    }
}

impl Sale {
    fn ensure_sale_id(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("sale {}", self.id)));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }
        self.ensure_sale_id(cmd.sale_id)?;

        if cmd.items.is_empty() {
            return Err(DomainError::validation("sale must have at least one line"));
        }
        if cmd.tax_amount < 0 || cmd.discount_amount < 0 {
            return Err(DomainError::validation(
                "tax and discount amounts cannot be negative",
            ));
        }

        let mut items = Vec::with_capacity(cmd.items.len());
        let mut subtotal: i64 = 0;
        for (idx, line) in cmd.items.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {}: quantity must be positive",
                    idx + 1
                )));
            }
            if line.unit_price < 0 {
                return Err(DomainError::validation(format!(
                    "line {}: unit price cannot be negative",
                    idx + 1
                )));
            }
            let total = line
                .quantity
                .checked_mul(line.unit_price)
                .ok_or_else(|| DomainError::validation("line total overflows"))?;
            subtotal = subtotal
                .checked_add(total)
                .ok_or_else(|| DomainError::validation("subtotal overflows"))?;
            items.push(SaleItem {
                line_no: idx as u32 + 1,
                inventory_item_id: line.inventory_item_id,
                description: line.description.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                total,
            });
        }

        let total = subtotal
            .checked_add(cmd.tax_amount)
            .and_then(|t| t.checked_sub(cmd.discount_amount))
            .ok_or_else(|| DomainError::validation("total overflows"))?;
        if total < 0 {
            return Err(DomainError::validation("discount exceeds subtotal plus tax"));
        }

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            sale_id: cmd.sale_id,
            sale_number: cmd.sale_number.clone(),
            quotation_id: cmd.quotation_id,
            customer_id: cmd.customer_id,
            recorded_by: cmd.recorded_by,
            items,
            subtotal,
            tax_amount: cmd.tax_amount,
            discount_amount: cmd.discount_amount,
            total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordPayment) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_sale_id(cmd.sale_id)?;

        if self.is_discarded() {
            return Err(DomainError::invalid_transition("discarded", "record payment"));
        }
        if cmd.amount <= 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if cmd.amount > self.balance() {
            return Err(DomainError::validation(format!(
                "payment of {} exceeds outstanding balance of {}",
                cmd.amount,
                self.balance()
            )));
        }

        let amount_paid_after = self.amount_paid + cmd.amount;

        Ok(vec![SaleEvent::PaymentRecorded(PaymentRecorded {
            sale_id: cmd.sale_id,
            amount: cmd.amount,
            amount_paid_after,
            status_after: SaleStatus::for_payment(self.total, amount_paid_after),
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discard(&self, cmd: &DiscardSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_sale_id(cmd.sale_id)?;

        if self.is_discarded() {
            return Ok(vec![]);
        }
        if self.amount_paid > 0 {
            return Err(DomainError::invariant("cannot discard a sale with payments"));
        }

        Ok(vec![SaleEvent::SaleDiscarded(SaleDiscarded {
            sale_id: cmd.sale_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

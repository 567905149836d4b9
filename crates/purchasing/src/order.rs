use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quoteflow_core::{Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, UserId};
use quoteflow_events::Event;
use quoteflow_inventory::InventoryItemId;

/// Purchase order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Approved,
    PartiallyReceived,
    Received,
    Closed,
}

impl PurchaseOrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Approved => "approved",
            PurchaseOrderStatus::PartiallyReceived => "partially_received",
            PurchaseOrderStatus::Received => "received",
            PurchaseOrderStatus::Closed => "closed",
        }
    }

    pub fn accepts_receipts(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Approved | PurchaseOrderStatus::PartiallyReceived
        )
    }
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_no: u32,
    pub inventory_item_id: InventoryItemId,
    pub ordered_quantity: i64,
    pub received_quantity: i64,
    /// Cost in smallest currency unit (e.g., cents).
    pub unit_cost: i64,
}

impl LineItem {
    /// Quantity still expected; never negative.
    pub fn outstanding(&self) -> i64 {
        (self.ordered_quantity - self.received_quantity).max(0)
    }
}

/// Quantity received against one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub quantity: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    number: Option<DocumentNumber>,
    supplier_name: String,
    created_by: UserId,
    status: PurchaseOrderStatus,
    lines: Vec<LineItem>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            number: None,
            supplier_name: String::new(),
            created_by: UserId::default(),
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&LineItem> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub order_number: DocumentNumber,
    pub supplier_name: String,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: PurchaseOrderId,
    pub inventory_item_id: InventoryItemId,
    pub quantity: i64,
    pub unit_cost: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Approve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub order_id: PurchaseOrderId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordReceipt.
///
/// Receiving more than outstanding is accepted; the affected lines are
/// reported in `ReceiptRecorded::over_received`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReceipt {
    pub order_id: PurchaseOrderId,
    pub receiving_id: AggregateId,
    pub lines: Vec<ReceiptLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ClosePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    Approve(Approve),
    RecordReceipt(RecordReceipt),
    Close(ClosePurchaseOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub order_number: DocumentNumber,
    pub supplier_name: String,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub inventory_item_id: InventoryItemId,
    pub quantity: i64,
    pub unit_cost: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderApproved {
    pub order_id: PurchaseOrderId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceiptRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecorded {
    pub order_id: PurchaseOrderId,
    pub receiving_id: AggregateId,
    pub lines: Vec<ReceiptLine>,
    /// Line numbers whose received quantity now exceeds the ordered quantity.
    pub over_received: Vec<u32>,
    pub status_after: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderClosed {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    LineAdded(LineAdded),
    PurchaseOrderApproved(PurchaseOrderApproved),
    ReceiptRecorded(ReceiptRecorded),
    PurchaseOrderClosed(PurchaseOrderClosed),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::LineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::PurchaseOrderApproved(_) => "purchasing.order.approved",
            PurchaseOrderEvent::ReceiptRecorded(_) => "purchasing.order.receipt_recorded",
            PurchaseOrderEvent::PurchaseOrderClosed(_) => "purchasing.order.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::LineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderApproved(e) => e.occurred_at,
            PurchaseOrderEvent::ReceiptRecorded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.number = Some(e.order_number.clone());
                self.supplier_name = e.supplier_name.clone();
                self.created_by = e.created_by;
                self.status = PurchaseOrderStatus::Draft;
                self.lines.clear();
                self.created = true;
            }
            PurchaseOrderEvent::LineAdded(e) => {
                self.lines.push(LineItem {
                    line_no: e.line_no,
                    inventory_item_id: e.inventory_item_id,
                    ordered_quantity: e.quantity,
                    received_quantity: 0,
                    unit_cost: e.unit_cost,
                });
            }
            PurchaseOrderEvent::PurchaseOrderApproved(_) => {
                self.status = PurchaseOrderStatus::Approved;
            }
            PurchaseOrderEvent::ReceiptRecorded(e) => {
                for received in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == received.line_no)
                    {
                        line.received_quantity += received.quantity;
                    }
                }
                self.status = e.status_after;
            }
            PurchaseOrderEvent::PurchaseOrderClosed(_) => {
                self.status = PurchaseOrderStatus::Closed;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::Approve(cmd) => self.handle_approve(cmd),
            PurchaseOrderCommand::RecordReceipt(cmd) => self.handle_receipt(cmd),
            PurchaseOrderCommand::Close(cmd) => self.handle_close(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("purchase order {}", self.id)));
        }
        Ok(())
    }

    fn status_name(&self) -> &'static str {
        self.status.as_str()
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        self.ensure_order_id(cmd.order_id)?;

        let supplier_name = cmd.supplier_name.trim();
        if supplier_name.is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(PurchaseOrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            supplier_name: supplier_name.to_string(),
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invalid_transition(self.status_name(), "add line"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.unit_cost < 0 {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        Ok(vec![PurchaseOrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line_no: self.lines.len() as u32 + 1,
            inventory_item_id: cmd.inventory_item_id,
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invalid_transition(self.status_name(), "approve"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot approve purchase order without lines"));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderApproved(PurchaseOrderApproved {
            order_id: cmd.order_id,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receipt(
        &self,
        cmd: &RecordReceipt,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.status.accepts_receipts() {
            return Err(DomainError::invalid_transition(self.status_name(), "receive"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("receipt must have at least one line"));
        }

        let mut after: Vec<LineItem> = self.lines.clone();
        let mut over_received = Vec::new();
        for received in &cmd.lines {
            if received.quantity <= 0 {
                return Err(DomainError::validation("received quantity must be positive"));
            }
            let line = after
                .iter_mut()
                .find(|l| l.line_no == received.line_no)
                .ok_or_else(|| {
                    DomainError::validation(format!(
                        "purchase order has no line {}",
                        received.line_no
                    ))
                })?;
            line.received_quantity = line
                .received_quantity
                .checked_add(received.quantity)
                .ok_or_else(|| DomainError::validation("received quantity overflows"))?;
            if line.received_quantity > line.ordered_quantity
                && !over_received.contains(&line.line_no)
            {
                over_received.push(line.line_no);
            }
        }

        let status_after = if after.iter().all(|l| l.outstanding() == 0) {
            PurchaseOrderStatus::Received
        } else {
            PurchaseOrderStatus::PartiallyReceived
        };

        Ok(vec![PurchaseOrderEvent::ReceiptRecorded(ReceiptRecorded {
            order_id: cmd.order_id,
            receiving_id: cmd.receiving_id,
            lines: cmd.lines.clone(),
            over_received,
            status_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(
        &self,
        cmd: &ClosePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        match self.status {
            PurchaseOrderStatus::Closed => Ok(vec![]),
            PurchaseOrderStatus::Draft => {
                Err(DomainError::invalid_transition(self.status_name(), "close"))
            }
            _ => Ok(vec![PurchaseOrderEvent::PurchaseOrderClosed(PurchaseOrderClosed {
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quoteflow_core::{DocumentKind, ErrorKind, Period};
    use quoteflow_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn approved_order(lines: &[(&str, i64)]) -> PurchaseOrder {
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let mut order = PurchaseOrder::empty(order_id);
        let create = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id,
            order_number: DocumentNumber::new(
                DocumentKind::PurchaseOrder,
                Period::new(2025, 3).unwrap(),
                1,
                4,
            ),
            supplier_name: "Acme Supplies".to_string(),
            created_by: UserId::new(),
            occurred_at: test_time(),
        });
        execute(&mut order, &create).unwrap();

        for (code, quantity) in lines {
            let add = PurchaseOrderCommand::AddLine(AddLine {
                order_id,
                inventory_item_id: InventoryItemId::for_code(code, None),
                quantity: *quantity,
                unit_cost: 250,
                occurred_at: test_time(),
            });
            execute(&mut order, &add).unwrap();
        }

        let approve = PurchaseOrderCommand::Approve(Approve {
            order_id,
            approved_by: UserId::new(),
            occurred_at: test_time(),
        });
        execute(&mut order, &approve).unwrap();
        order
    }

    fn receipt(order: &PurchaseOrder, lines: Vec<ReceiptLine>) -> PurchaseOrderCommand {
        PurchaseOrderCommand::RecordReceipt(RecordReceipt {
            order_id: order.id_typed(),
            receiving_id: AggregateId::new(),
            lines,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn partial_then_full_receipt() {
        let mut order = approved_order(&[("A", 10), ("B", 5)]);

        let first = receipt(&order, vec![ReceiptLine { line_no: 1, quantity: 10 }]);
        execute(&mut order, &first).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::PartiallyReceived);
        assert_eq!(order.line(1).map(|l| l.received_quantity), Some(10));

        let second = receipt(&order, vec![ReceiptLine { line_no: 2, quantity: 5 }]);
        execute(&mut order, &second).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
    }

    #[test]
    fn over_receipt_is_flagged_not_blocked() {
        let order = approved_order(&[("A", 10)]);
        let cmd = receipt(&order, vec![ReceiptLine { line_no: 1, quantity: 12 }]);

        let events = order.handle(&cmd).unwrap();
        match &events[0] {
            PurchaseOrderEvent::ReceiptRecorded(e) => {
                assert_eq!(e.over_received, vec![1]);
                assert_eq!(e.status_after, PurchaseOrderStatus::Received);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn unknown_line_is_rejected() {
        let order = approved_order(&[("A", 10)]);
        let cmd = receipt(&order, vec![ReceiptLine { line_no: 3, quantity: 1 }]);

        assert_eq!(order.handle(&cmd).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn received_quantity_overflow_is_rejected() {
        let mut order = approved_order(&[("A", 10)]);
        let first = receipt(&order, vec![ReceiptLine { line_no: 1, quantity: 5 }]);
        execute(&mut order, &first).unwrap();

        let cmd = receipt(&order, vec![ReceiptLine { line_no: 1, quantity: i64::MAX }]);
        assert_eq!(order.handle(&cmd).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn closed_order_refuses_receipts() {
        let mut order = approved_order(&[("A", 10)]);
        let close = PurchaseOrderCommand::Close(ClosePurchaseOrder {
            order_id: order.id_typed(),
            occurred_at: test_time(),
        });
        execute(&mut order, &close).unwrap();

        let cmd = receipt(&order, vec![ReceiptLine { line_no: 1, quantity: 1 }]);
        assert_eq!(
            order.handle(&cmd).unwrap_err().kind(),
            ErrorKind::InvalidTransition
        );
    }

    #[test]
    fn lines_cannot_be_added_after_approval() {
        let order = approved_order(&[("A", 10)]);
        let add = PurchaseOrderCommand::AddLine(AddLine {
            order_id: order.id_typed(),
            inventory_item_id: InventoryItemId::for_code("B", None),
            quantity: 1,
            unit_cost: 1,
            occurred_at: test_time(),
        });

        assert!(order.handle(&add).is_err());
    }

    proptest! {
        #[test]
        fn received_quantity_accumulates_receipts(batches in prop::collection::vec(1i64..20, 1..6)) {
            let mut order = approved_order(&[("A", 40)]);
            for quantity in &batches {
                let cmd = receipt(&order, vec![ReceiptLine { line_no: 1, quantity: *quantity }]);
                execute(&mut order, &cmd).unwrap();
            }
            let total: i64 = batches.iter().sum();
            prop_assert_eq!(order.line(1).map(|l| l.received_quantity), Some(total));
            let expected = if total >= 40 {
                PurchaseOrderStatus::Received
            } else {
                PurchaseOrderStatus::PartiallyReceived
            };
            prop_assert_eq!(order.status(), expected);
        }
    }
}

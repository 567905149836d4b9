use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quoteflow_core::{Aggregate, AggregateId, AggregateRoot, DocumentNumber, DomainError, UserId};
use quoteflow_events::Event;
use quoteflow_inventory::InventoryItemId;

use crate::PurchaseOrderId;

/// Purchase receiving identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceivingId(pub AggregateId);

impl ReceivingId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReceivingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// `pending -> posted`, or `voided` when the receiving was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceivingStatus {
    Pending,
    Posted,
    Voided,
}

/// A received line, tied to a purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingLine {
    pub order_line_no: u32,
    pub inventory_item_id: InventoryItemId,
    pub quantity_received: i64,
    pub unit_cost: i64,
    /// More was received than the order still expected.
    pub over_receipt: bool,
}

/// Aggregate root: PurchaseReceiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReceiving {
    id: ReceivingId,
    number: Option<DocumentNumber>,
    purchase_order_id: Option<PurchaseOrderId>,
    received_by: UserId,
    lines: Vec<ReceivingLine>,
    status: ReceivingStatus,
    void_reason: Option<String>,
    version: u64,
    created: bool,
}

impl PurchaseReceiving {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ReceivingId) -> Self {
        Self {
            id,
            number: None,
            purchase_order_id: None,
            received_by: UserId::default(),
            lines: Vec::new(),
            status: ReceivingStatus::Pending,
            void_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReceivingId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> Option<&DocumentNumber> {
        self.number.as_ref()
    }

    pub fn purchase_order_id(&self) -> Option<PurchaseOrderId> {
        self.purchase_order_id
    }

    pub fn received_by(&self) -> UserId {
        self.received_by
    }

    pub fn lines(&self) -> &[ReceivingLine] {
        &self.lines
    }

    pub fn status(&self) -> ReceivingStatus {
        self.status
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn has_over_receipt(&self) -> bool {
        self.lines.iter().any(|l| l.over_receipt)
    }
}

impl AggregateRoot for PurchaseReceiving {
    type Id = ReceivingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenReceiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReceiving {
    pub receiving_id: ReceivingId,
    pub receiving_number: DocumentNumber,
    pub purchase_order_id: PurchaseOrderId,
    pub received_by: UserId,
    pub lines: Vec<ReceivingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostReceiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReceiving {
    pub receiving_id: ReceivingId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidReceiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidReceiving {
    pub receiving_id: ReceivingId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivingCommand {
    OpenReceiving(OpenReceiving),
    PostReceiving(PostReceiving),
    VoidReceiving(VoidReceiving),
}

/// Event: ReceivingOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingOpened {
    pub receiving_id: ReceivingId,
    pub receiving_number: DocumentNumber,
    pub purchase_order_id: PurchaseOrderId,
    pub received_by: UserId,
    pub lines: Vec<ReceivingLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingPosted {
    pub receiving_id: ReceivingId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingVoided {
    pub receiving_id: ReceivingId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceivingEvent {
    ReceivingOpened(ReceivingOpened),
    ReceivingPosted(ReceivingPosted),
    ReceivingVoided(ReceivingVoided),
}

impl Event for ReceivingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReceivingEvent::ReceivingOpened(_) => "purchasing.receiving.opened",
            ReceivingEvent::ReceivingPosted(_) => "purchasing.receiving.posted",
            ReceivingEvent::ReceivingVoided(_) => "purchasing.receiving.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReceivingEvent::ReceivingOpened(e) => e.occurred_at,
            ReceivingEvent::ReceivingPosted(e) => e.occurred_at,
            ReceivingEvent::ReceivingVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseReceiving {
    type Command = ReceivingCommand;
    type Event = ReceivingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReceivingEvent::ReceivingOpened(e) => {
                self.id = e.receiving_id;
                self.number = Some(e.receiving_number.clone());
                self.purchase_order_id = Some(e.purchase_order_id);
                self.received_by = e.received_by;
                self.lines = e.lines.clone();
                self.status = ReceivingStatus::Pending;
                self.created = true;
            }
            ReceivingEvent::ReceivingPosted(_) => {
                self.status = ReceivingStatus::Posted;
            }
            ReceivingEvent::ReceivingVoided(e) => {
                self.status = ReceivingStatus::Voided;
                self.void_reason = Some(e.reason.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReceivingCommand::OpenReceiving(cmd) => self.handle_open(cmd),
            ReceivingCommand::PostReceiving(cmd) => self.handle_post(cmd),
            ReceivingCommand::VoidReceiving(cmd) => self.handle_void(cmd),
        }
    }
}

impl PurchaseReceiving {
    fn ensure_receiving_id(&self, receiving_id: ReceivingId) -> Result<(), DomainError> {
        if self.id != receiving_id {
            return Err(DomainError::invariant("receiving_id mismatch"));
        }
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("receiving {}", self.id)));
        }
        match self.status {
            ReceivingStatus::Pending => Ok(()),
            ReceivingStatus::Posted => Err(DomainError::invalid_transition("posted", action)),
            ReceivingStatus::Voided => Err(DomainError::invalid_transition("voided", action)),
        }
    }

    fn handle_open(&self, cmd: &OpenReceiving) -> Result<Vec<ReceivingEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("receiving already exists"));
        }
        self.ensure_receiving_id(cmd.receiving_id)?;

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("receiving must have at least one line"));
        }
        if let Some(line) = cmd.lines.iter().find(|l| l.quantity_received <= 0) {
            return Err(DomainError::validation(format!(
                "line {}: received quantity must be positive",
                line.order_line_no
            )));
        }
        if cmd.lines.iter().any(|l| l.unit_cost < 0) {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        Ok(vec![ReceivingEvent::ReceivingOpened(ReceivingOpened {
            receiving_id: cmd.receiving_id,
            receiving_number: cmd.receiving_number.clone(),
            purchase_order_id: cmd.purchase_order_id,
            received_by: cmd.received_by,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostReceiving) -> Result<Vec<ReceivingEvent>, DomainError> {
        self.ensure_receiving_id(cmd.receiving_id)?;
        self.ensure_pending("post")?;

        Ok(vec![ReceivingEvent::ReceivingPosted(ReceivingPosted {
            receiving_id: cmd.receiving_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidReceiving) -> Result<Vec<ReceivingEvent>, DomainError> {
        self.ensure_receiving_id(cmd.receiving_id)?;
        if self.created && self.status == ReceivingStatus::Voided {
            return Ok(vec![]);
        }
        self.ensure_pending("void")?;

        Ok(vec![ReceivingEvent::ReceivingVoided(ReceivingVoided {
            receiving_id: cmd.receiving_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoteflow_core::{DocumentKind, ErrorKind, Period};
    use quoteflow_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn opened(lines: Vec<ReceivingLine>) -> PurchaseReceiving {
        let receiving_id = ReceivingId::new(AggregateId::new());
        let mut receiving = PurchaseReceiving::empty(receiving_id);
        let cmd = ReceivingCommand::OpenReceiving(OpenReceiving {
            receiving_id,
            receiving_number: DocumentNumber::new(
                DocumentKind::Receiving,
                Period::new(2025, 3).unwrap(),
                1,
                4,
            ),
            purchase_order_id: PurchaseOrderId::new(AggregateId::new()),
            received_by: UserId::new(),
            lines,
            occurred_at: test_time(),
        });
        execute(&mut receiving, &cmd).unwrap();
        receiving
    }

    fn line(quantity: i64, over_receipt: bool) -> ReceivingLine {
        ReceivingLine {
            order_line_no: 1,
            inventory_item_id: InventoryItemId::for_code("A", None),
            quantity_received: quantity,
            unit_cost: 100,
            over_receipt,
        }
    }

    #[test]
    fn opens_pending_and_posts() {
        let mut receiving = opened(vec![line(5, false)]);
        assert_eq!(receiving.status(), ReceivingStatus::Pending);

        let post = ReceivingCommand::PostReceiving(PostReceiving {
            receiving_id: receiving.id_typed(),
            occurred_at: test_time(),
        });
        execute(&mut receiving, &post).unwrap();
        assert_eq!(receiving.status(), ReceivingStatus::Posted);

        let void = ReceivingCommand::VoidReceiving(VoidReceiving {
            receiving_id: receiving.id_typed(),
            reason: "late".to_string(),
            occurred_at: test_time(),
        });
        assert_eq!(
            receiving.handle(&void).unwrap_err().kind(),
            ErrorKind::InvalidTransition
        );
    }

    #[test]
    fn void_is_idempotent() {
        let mut receiving = opened(vec![line(5, true)]);
        assert!(receiving.has_over_receipt());

        let void = ReceivingCommand::VoidReceiving(VoidReceiving {
            receiving_id: receiving.id_typed(),
            reason: "inventory update failed".to_string(),
            occurred_at: test_time(),
        });
        execute(&mut receiving, &void).unwrap();
        assert_eq!(receiving.status(), ReceivingStatus::Voided);
        assert!(receiving.handle(&void).unwrap().is_empty());
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let receiving_id = ReceivingId::new(AggregateId::new());
        let receiving = PurchaseReceiving::empty(receiving_id);
        let cmd = ReceivingCommand::OpenReceiving(OpenReceiving {
            receiving_id,
            receiving_number: DocumentNumber::new(
                DocumentKind::Receiving,
                Period::new(2025, 3).unwrap(),
                2,
                4,
            ),
            purchase_order_id: PurchaseOrderId::new(AggregateId::new()),
            received_by: UserId::new(),
            lines: vec![line(0, false)],
            occurred_at: test_time(),
        });

        assert_eq!(receiving.handle(&cmd).unwrap_err().kind(), ErrorKind::Validation);
    }
}

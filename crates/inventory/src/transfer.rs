//! Inter-branch stock transfer record.
//!
//! The transfer is persisted as `Pending` before any stock moves, and each
//! inventory mutation is recorded on it as it lands. A half-applied transfer
//! therefore always says exactly which step comes next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quoteflow_core::{Aggregate, AggregateId, AggregateRoot, BranchId, DocumentNumber, DomainError, UserId};
use quoteflow_events::Event;

use crate::InventoryItemId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockTransferId(pub AggregateId);

impl StockTransferId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StockTransferId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
}

/// Aggregate root: StockTransfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockTransfer {
    id: StockTransferId,
    transfer_number: Option<DocumentNumber>,
    item_code: String,
    source_item_id: Option<InventoryItemId>,
    destination_item_id: Option<InventoryItemId>,
    from_branch: Option<BranchId>,
    to_branch: Option<BranchId>,
    quantity: i64,
    requested_by: Option<UserId>,
    status: TransferStatus,
    source_debited: bool,
    destination_credited: bool,
    destination_created: bool,
    cancel_reason: Option<String>,
    version: u64,
    created: bool,
}

impl StockTransfer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: StockTransferId) -> Self {
        Self {
            id,
            transfer_number: None,
            item_code: String::new(),
            source_item_id: None,
            destination_item_id: None,
            from_branch: None,
            to_branch: None,
            quantity: 0,
            requested_by: None,
            status: TransferStatus::Pending,
            source_debited: false,
            destination_credited: false,
            destination_created: false,
            cancel_reason: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockTransferId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn transfer_number(&self) -> Option<&DocumentNumber> {
        self.transfer_number.as_ref()
    }

    pub fn item_code(&self) -> &str {
        &self.item_code
    }

    pub fn source_item_id(&self) -> Option<InventoryItemId> {
        self.source_item_id
    }

    pub fn destination_item_id(&self) -> Option<InventoryItemId> {
        self.destination_item_id
    }

    pub fn from_branch(&self) -> Option<BranchId> {
        self.from_branch
    }

    pub fn to_branch(&self) -> Option<BranchId> {
        self.to_branch
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn source_debited(&self) -> bool {
        self.source_debited
    }

    pub fn destination_credited(&self) -> bool {
        self.destination_credited
    }

    pub fn destination_created(&self) -> bool {
        self.destination_created
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }
}

impl AggregateRoot for StockTransfer {
    type Id = StockTransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTransfer {
    pub transfer_id: StockTransferId,
    pub transfer_number: DocumentNumber,
    pub item_code: String,
    pub source_item_id: InventoryItemId,
    pub from_branch: BranchId,
    pub to_branch: BranchId,
    pub quantity: i64,
    pub requested_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordSourceDebit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSourceDebit {
    pub transfer_id: StockTransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDestinationCredit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDestinationCredit {
    pub transfer_id: StockTransferId,
    pub destination_created: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTransfer {
    pub transfer_id: StockTransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub transfer_id: StockTransferId,
    pub reason: String,
    /// Set when a recorded source debit has been compensated.
    pub source_restored: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockTransferCommand {
    RequestTransfer(RequestTransfer),
    RecordSourceDebit(RecordSourceDebit),
    RecordDestinationCredit(RecordDestinationCredit),
    CompleteTransfer(CompleteTransfer),
    CancelTransfer(CancelTransfer),
}

/// Event: TransferRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequested {
    pub transfer_id: StockTransferId,
    pub transfer_number: DocumentNumber,
    pub item_code: String,
    pub source_item_id: InventoryItemId,
    pub destination_item_id: InventoryItemId,
    pub from_branch: BranchId,
    pub to_branch: BranchId,
    pub quantity: i64,
    pub requested_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SourceDebited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDebited {
    pub transfer_id: StockTransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DestinationCredited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationCredited {
    pub transfer_id: StockTransferId,
    pub destination_created: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompleted {
    pub transfer_id: StockTransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub transfer_id: StockTransferId,
    pub reason: String,
    pub source_restored: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockTransferEvent {
    TransferRequested(TransferRequested),
    SourceDebited(SourceDebited),
    DestinationCredited(DestinationCredited),
    TransferCompleted(TransferCompleted),
    TransferCancelled(TransferCancelled),
}

impl Event for StockTransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockTransferEvent::TransferRequested(_) => "inventory.transfer.requested",
            StockTransferEvent::SourceDebited(_) => "inventory.transfer.source_debited",
            StockTransferEvent::DestinationCredited(_) => "inventory.transfer.destination_credited",
            StockTransferEvent::TransferCompleted(_) => "inventory.transfer.completed",
            StockTransferEvent::TransferCancelled(_) => "inventory.transfer.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockTransferEvent::TransferRequested(e) => e.occurred_at,
            StockTransferEvent::SourceDebited(e) => e.occurred_at,
            StockTransferEvent::DestinationCredited(e) => e.occurred_at,
            StockTransferEvent::TransferCompleted(e) => e.occurred_at,
            StockTransferEvent::TransferCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockTransfer {
    type Command = StockTransferCommand;
    type Event = StockTransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockTransferEvent::TransferRequested(e) => {
                self.id = e.transfer_id;
                self.transfer_number = Some(e.transfer_number.clone());
                self.item_code = e.item_code.clone();
                self.source_item_id = Some(e.source_item_id);
                self.destination_item_id = Some(e.destination_item_id);
                self.from_branch = Some(e.from_branch);
                self.to_branch = Some(e.to_branch);
                self.quantity = e.quantity;
                self.requested_by = Some(e.requested_by);
                self.status = TransferStatus::Pending;
                self.created = true;
            }
            StockTransferEvent::SourceDebited(_) => {
                self.source_debited = true;
            }
            StockTransferEvent::DestinationCredited(e) => {
                self.destination_credited = true;
                self.destination_created = e.destination_created;
            }
            StockTransferEvent::TransferCompleted(_) => {
                self.status = TransferStatus::Completed;
            }
            StockTransferEvent::TransferCancelled(e) => {
                self.status = TransferStatus::Cancelled;
                self.cancel_reason = Some(e.reason.clone());
                if e.source_restored {
                    self.source_debited = false;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockTransferCommand::RequestTransfer(cmd) => self.handle_request(cmd),
            StockTransferCommand::RecordSourceDebit(cmd) => self.handle_source_debit(cmd),
            StockTransferCommand::RecordDestinationCredit(cmd) => self.handle_destination_credit(cmd),
            StockTransferCommand::CompleteTransfer(cmd) => self.handle_complete(cmd),
            StockTransferCommand::CancelTransfer(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl StockTransfer {
    fn ensure_pending(&self, transfer_id: StockTransferId, action: &str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("stock transfer {transfer_id}")));
        }
        if self.id != transfer_id {
            return Err(DomainError::invariant("transfer_id mismatch"));
        }
        if self.status != TransferStatus::Pending {
            return Err(DomainError::invalid_transition(
                format!("{:?}", self.status).to_lowercase(),
                action,
            ));
        }
        Ok(())
    }

    fn handle_request(&self, cmd: &RequestTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock transfer already exists"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        if cmd.from_branch == cmd.to_branch {
            return Err(DomainError::validation(
                "source and destination branch must differ",
            ));
        }
        if cmd.source_item_id != InventoryItemId::for_code(&cmd.item_code, Some(cmd.from_branch)) {
            return Err(DomainError::validation(
                "source item is not stocked at the source branch",
            ));
        }

        Ok(vec![StockTransferEvent::TransferRequested(TransferRequested {
            transfer_id: cmd.transfer_id,
            transfer_number: cmd.transfer_number.clone(),
            item_code: cmd.item_code.clone(),
            source_item_id: cmd.source_item_id,
            destination_item_id: InventoryItemId::for_code(&cmd.item_code, Some(cmd.to_branch)),
            from_branch: cmd.from_branch,
            to_branch: cmd.to_branch,
            quantity: cmd.quantity,
            requested_by: cmd.requested_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_source_debit(&self, cmd: &RecordSourceDebit) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_pending(cmd.transfer_id, "record source debit")?;
        if self.source_debited {
            return Err(DomainError::conflict("source debit already recorded"));
        }

        Ok(vec![StockTransferEvent::SourceDebited(SourceDebited {
            transfer_id: cmd.transfer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_destination_credit(
        &self,
        cmd: &RecordDestinationCredit,
    ) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_pending(cmd.transfer_id, "record destination credit")?;
        if !self.source_debited {
            return Err(DomainError::invariant(
                "destination cannot be credited before the source is debited",
            ));
        }
        if self.destination_credited {
            return Err(DomainError::conflict("destination credit already recorded"));
        }

        Ok(vec![StockTransferEvent::DestinationCredited(DestinationCredited {
            transfer_id: cmd.transfer_id,
            destination_created: cmd.destination_created,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_pending(cmd.transfer_id, "complete")?;
        if !(self.source_debited && self.destination_credited) {
            return Err(DomainError::invariant(
                "transfer cannot complete before both sides are applied",
            ));
        }

        Ok(vec![StockTransferEvent::TransferCompleted(TransferCompleted {
            transfer_id: cmd.transfer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelTransfer) -> Result<Vec<StockTransferEvent>, DomainError> {
        self.ensure_pending(cmd.transfer_id, "cancel")?;
        if self.destination_credited {
            return Err(DomainError::invariant(
                "transfer with a credited destination can only complete",
            ));
        }
        if self.source_debited && !cmd.source_restored {
            return Err(DomainError::invariant(
                "source debit must be restored before cancelling",
            ));
        }

        Ok(vec![StockTransferEvent::TransferCancelled(TransferCancelled {
            transfer_id: cmd.transfer_id,
            reason: cmd.reason.clone(),
            source_restored: self.source_debited && cmd.source_restored,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quoteflow_core::{DocumentKind, Period};
    use quoteflow_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn number() -> DocumentNumber {
        DocumentNumber::new(DocumentKind::Transfer, Period::new(2025, 3).unwrap(), 1, 4)
    }

    fn requested(quantity: i64) -> (StockTransfer, StockTransferId) {
        let transfer_id = StockTransferId::new(AggregateId::new());
        let from_branch = BranchId::new();
        let cmd = RequestTransfer {
            transfer_id,
            transfer_number: number(),
            item_code: "CBL-3M".to_string(),
            source_item_id: InventoryItemId::for_code("CBL-3M", Some(from_branch)),
            from_branch,
            to_branch: BranchId::new(),
            quantity,
            requested_by: UserId::new(),
            occurred_at: test_time(),
        };
        let mut transfer = StockTransfer::empty(transfer_id);
        execute(&mut transfer, &StockTransferCommand::RequestTransfer(cmd)).unwrap();
        (transfer, transfer_id)
    }

    fn debit(transfer_id: StockTransferId) -> StockTransferCommand {
        StockTransferCommand::RecordSourceDebit(RecordSourceDebit {
            transfer_id,
            occurred_at: test_time(),
        })
    }

    fn credit(transfer_id: StockTransferId) -> StockTransferCommand {
        StockTransferCommand::RecordDestinationCredit(RecordDestinationCredit {
            transfer_id,
            destination_created: true,
            occurred_at: test_time(),
        })
    }

    fn complete(transfer_id: StockTransferId) -> StockTransferCommand {
        StockTransferCommand::CompleteTransfer(CompleteTransfer {
            transfer_id,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn request_derives_destination_item_for_target_branch() {
        let (transfer, _) = requested(4);

        assert_eq!(transfer.status(), TransferStatus::Pending);
        assert_eq!(
            transfer.destination_item_id(),
            Some(InventoryItemId::for_code("CBL-3M", transfer.to_branch()))
        );
    }

    #[test]
    fn request_rejects_non_positive_quantity_and_same_branch() {
        let branch = BranchId::new();
        let transfer_id = StockTransferId::new(AggregateId::new());
        let base = RequestTransfer {
            transfer_id,
            transfer_number: number(),
            item_code: "CBL-3M".to_string(),
            source_item_id: InventoryItemId::for_code("CBL-3M", Some(branch)),
            from_branch: branch,
            to_branch: BranchId::new(),
            quantity: 0,
            requested_by: UserId::new(),
            occurred_at: test_time(),
        };
        let transfer = StockTransfer::empty(transfer_id);

        let err = transfer
            .handle(&StockTransferCommand::RequestTransfer(base.clone()))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let same_branch = RequestTransfer {
            quantity: 1,
            to_branch: branch,
            ..base
        };
        let err = transfer
            .handle(&StockTransferCommand::RequestTransfer(same_branch))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn steps_must_happen_in_order() {
        let (mut transfer, id) = requested(4);

        assert!(transfer.handle(&credit(id)).is_err());
        assert!(transfer.handle(&complete(id)).is_err());

        execute(&mut transfer, &debit(id)).unwrap();
        execute(&mut transfer, &credit(id)).unwrap();
        execute(&mut transfer, &complete(id)).unwrap();

        assert_eq!(transfer.status(), TransferStatus::Completed);
        assert!(transfer.destination_created());
    }

    #[test]
    fn cancel_after_debit_requires_restored_source() {
        let (mut transfer, id) = requested(4);
        execute(&mut transfer, &debit(id)).unwrap();

        let unrestored = StockTransferCommand::CancelTransfer(CancelTransfer {
            transfer_id: id,
            reason: "destination unavailable".to_string(),
            source_restored: false,
            occurred_at: test_time(),
        });
        assert!(matches!(
            transfer.handle(&unrestored).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));

        let restored = StockTransferCommand::CancelTransfer(CancelTransfer {
            transfer_id: id,
            reason: "destination unavailable".to_string(),
            source_restored: true,
            occurred_at: test_time(),
        });
        execute(&mut transfer, &restored).unwrap();

        assert_eq!(transfer.status(), TransferStatus::Cancelled);
        assert!(!transfer.source_debited());
    }

    #[test]
    fn finished_transfer_rejects_further_steps() {
        let (mut transfer, id) = requested(1);
        execute(&mut transfer, &debit(id)).unwrap();
        execute(&mut transfer, &credit(id)).unwrap();
        execute(&mut transfer, &complete(id)).unwrap();

        let err = transfer.handle(&complete(id)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }
}

//! Inter-branch stock transfers.
//!
//! The transfer is persisted `Pending` before any stock moves, then driven
//! through its progress markers:
//!
//! ```text
//! requested ──debit source──▶ source_debited ──credit destination──▶ destination_credited ──▶ completed
//!     │                             │
//!     └──────────── cancelled ◀─────┘  (source restored first)
//! ```
//!
//! Every ledger adjustment carries the transfer number as its reference. A
//! process that stops between an adjustment and the marker that records it
//! leaves a pending transfer; [`TransferEngine::resume`] reads the item
//! streams to see which adjustments already landed and continues from there
//! without applying any of them twice.

use std::sync::Arc;

use quoteflow_auth::{Actor, Permission};
use quoteflow_core::{AggregateId, BranchId, DocumentKind, DomainError, ExpectedVersion};
use quoteflow_events::EventBus;
use quoteflow_inventory::{
    AdjustmentReason, CancelTransfer, CompleteTransfer, InventoryItemId, RecordDestinationCredit,
    RecordSourceDebit, RequestTransfer, StockTransfer, StockTransferCommand, StockTransferId,
    TransferStatus,
};

use crate::command_dispatcher::DispatchError;
use crate::context::{ServiceContext, require};
use crate::event_store::{EventStore, StoredEvent};
use crate::ledger::InventoryLedger;
use crate::numbering::NumberingService;
use crate::saga::Saga;

pub const TRANSFER_AGGREGATE_TYPE: &str = "inventory.transfer";

fn make_transfer(id: AggregateId) -> StockTransfer {
    StockTransfer::empty(StockTransferId(id))
}

/// Result of a reconciliation pass over pending transfers.
#[derive(Debug, Default)]
pub struct ResumeReport {
    pub completed: Vec<StockTransferId>,
    pub cancelled: Vec<StockTransferId>,
    pub failed: Vec<(StockTransferId, DispatchError)>,
}

#[derive(Debug)]
pub struct TransferEngine<S, B> {
    ctx: Arc<ServiceContext<S, B>>,
    ledger: InventoryLedger<S, B>,
    numbering: NumberingService<S, B>,
}

impl<S, B> TransferEngine<S, B>
where
    S: EventStore,
    B: EventBus<StoredEvent>,
{
    pub fn new(ctx: Arc<ServiceContext<S, B>>) -> Self {
        Self {
            ledger: InventoryLedger::new(Arc::clone(&ctx)),
            numbering: NumberingService::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    pub fn get(&self, transfer_id: StockTransferId) -> Result<StockTransfer, DispatchError> {
        let transfer = self.ctx.dispatcher().load(transfer_id.0, make_transfer)?;
        if !transfer.exists() {
            return Err(DomainError::not_found(format!("stock transfer {}", transfer_id.0)).into());
        }
        Ok(transfer)
    }

    /// Move `quantity` of the item stocked at `from_branch` to `to_branch`.
    #[tracing::instrument(skip_all, fields(item_id = %item_id, from = %from_branch, to = %to_branch, quantity = quantity))]
    pub fn transfer(
        &self,
        actor: &Actor,
        item_id: InventoryItemId,
        from_branch: BranchId,
        to_branch: BranchId,
        quantity: i64,
    ) -> Result<StockTransfer, DispatchError> {
        require(actor, &Permission::INVENTORY_TRANSFER)?;

        if quantity <= 0 {
            return Err(DomainError::validation("transfer quantity must be positive").into());
        }
        if from_branch == to_branch {
            return Err(DomainError::validation("source and destination branch must differ").into());
        }

        let source = self.ledger.get(item_id)?;
        if source.branch_id() != Some(from_branch) {
            return Err(DomainError::validation(format!(
                "item {} is not stocked at branch {from_branch}",
                source.item_code()
            ))
            .into());
        }
        if quantity > source.quantity() {
            return Err(
                DomainError::insufficient_stock(source.item_code(), source.quantity(), quantity).into(),
            );
        }

        let transfer_number = self.numbering.next(DocumentKind::Transfer)?;
        let transfer_id = StockTransferId::new(AggregateId::new());
        let cmd = StockTransferCommand::RequestTransfer(RequestTransfer {
            transfer_id,
            transfer_number: transfer_number.clone(),
            item_code: source.item_code().to_string(),
            source_item_id: item_id,
            from_branch,
            to_branch,
            quantity,
            requested_by: actor.id,
            occurred_at: self.ctx.now(),
        });
        let requested = self.ctx.dispatcher().dispatch_expecting(
            transfer_id.0,
            TRANSFER_AGGREGATE_TYPE,
            ExpectedVersion::NoStream,
            &cmd,
            make_transfer,
        )?;
        tracing::info!(transfer = %transfer_number, "transfer requested");

        self.drive(requested.aggregate)
    }

    /// Continue a pending transfer from its recorded progress. Finished
    /// transfers are returned unchanged.
    #[tracing::instrument(skip_all, fields(transfer_id = %transfer_id.0))]
    pub fn resume(&self, transfer_id: StockTransferId) -> Result<StockTransfer, DispatchError> {
        let transfer = self.get(transfer_id)?;
        if transfer.status() != TransferStatus::Pending {
            return Ok(transfer);
        }

        tracing::info!(
            source_debited = transfer.source_debited(),
            destination_credited = transfer.destination_credited(),
            "resuming transfer"
        );
        self.drive(transfer)
    }

    /// Reconciliation pass: resume every pending transfer.
    pub fn resume_pending(&self) -> Result<ResumeReport, DispatchError> {
        let mut report = ResumeReport::default();

        for id in self.ctx.dispatcher().store().list_streams(TRANSFER_AGGREGATE_TYPE)? {
            let transfer_id = StockTransferId(id);
            let pending = self.get(transfer_id)?.status() == TransferStatus::Pending;
            if !pending {
                continue;
            }

            match self.resume(transfer_id) {
                Ok(t) if t.status() == TransferStatus::Completed => report.completed.push(transfer_id),
                Ok(t) if t.status() == TransferStatus::Cancelled => report.cancelled.push(transfer_id),
                Ok(_) => {}
                Err(err) => match self.get(transfer_id) {
                    Ok(t) if t.status() == TransferStatus::Cancelled => {
                        report.cancelled.push(transfer_id)
                    }
                    _ => report.failed.push((transfer_id, err)),
                },
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            cancelled = report.cancelled.len(),
            failed = report.failed.len(),
            "pending transfers reconciled"
        );
        Ok(report)
    }

    fn drive(&self, transfer: StockTransfer) -> Result<StockTransfer, DispatchError> {
        let transfer_id = transfer.id_typed();
        let number = transfer
            .transfer_number()
            .map(ToString::to_string)
            .ok_or_else(|| DomainError::invariant("transfer has no number"))?;

        let moved = Saga::<DispatchError>::new("inventory.transfer", number.clone())
            .run(|saga| self.move_stock(saga, transfer, &number));

        let transfer = match moved {
            Ok(transfer) => transfer,
            Err(err) => {
                self.abandon(transfer_id, &number, &err);
                return Err(err);
            }
        };

        let completed = self.record(
            transfer_id,
            StockTransferCommand::CompleteTransfer(CompleteTransfer {
                transfer_id,
                occurred_at: self.ctx.now(),
            }),
        )?;
        tracing::info!(transfer = %number, quantity = completed.quantity(), "transfer completed");
        Ok(completed)
    }

    /// Steps that touch stock: debit the source, credit the destination.
    fn move_stock<'a>(
        &'a self,
        saga: &mut Saga<'a, DispatchError>,
        mut transfer: StockTransfer,
        number: &str,
    ) -> Result<StockTransfer, DispatchError> {
        let transfer_id = transfer.id_typed();
        let quantity = transfer.quantity();
        let source_id = transfer
            .source_item_id()
            .ok_or_else(|| DomainError::invariant("transfer has no source item"))?;
        let to_branch = transfer
            .to_branch()
            .ok_or_else(|| DomainError::invariant("transfer has no destination branch"))?;

        if !transfer.source_debited() && self.ledger.net_adjustment(source_id, number)? == 0 {
            self.ledger
                .adjust_quantity(source_id, -quantity, AdjustmentReason::TransferOut, Some(number))?;
        }
        let reference = number.to_string();
        saga.compensate_with("restore source", move || {
            self.ledger
                .adjust_quantity(source_id, quantity, AdjustmentReason::Compensation, Some(&reference))
                .map(|_| ())
        });
        if !transfer.source_debited() {
            transfer = self.record(
                transfer_id,
                StockTransferCommand::RecordSourceDebit(RecordSourceDebit {
                    transfer_id,
                    occurred_at: self.ctx.now(),
                }),
            )?;
        }

        if transfer.destination_credited() {
            return Ok(transfer);
        }

        let source = self.ledger.get(source_id)?;
        let (destination, created) =
            self.ledger
                .find_or_create_for_branch(transfer.item_code(), to_branch, &source)?;
        let destination_id = destination.id_typed();
        if self.ledger.net_adjustment(destination_id, number)? == 0 {
            self.ledger
                .adjust_quantity(destination_id, quantity, AdjustmentReason::TransferIn, Some(number))?;
        }
        let reference = number.to_string();
        saga.compensate_with("take destination credit back", move || {
            self.ledger
                .adjust_quantity(
                    destination_id,
                    -quantity,
                    AdjustmentReason::Compensation,
                    Some(&reference),
                )
                .map(|_| ())
        });

        self.record(
            transfer_id,
            StockTransferCommand::RecordDestinationCredit(RecordDestinationCredit {
                transfer_id,
                destination_created: created,
                occurred_at: self.ctx.now(),
            }),
        )
    }

    /// After a failed move: cancel the transfer if neither item holds a net
    /// adjustment under its number, otherwise leave it pending for the next
    /// reconciliation pass.
    fn abandon(&self, transfer_id: StockTransferId, number: &str, cause: &DispatchError) {
        let outcome = self.get(transfer_id).and_then(|transfer| {
            let (Some(source_id), Some(destination_id)) =
                (transfer.source_item_id(), transfer.destination_item_id())
            else {
                return Ok(false);
            };
            if transfer.destination_credited()
                || self.ledger.net_adjustment(source_id, number)? != 0
                || self.ledger.net_adjustment(destination_id, number)? != 0
            {
                return Ok(false);
            }

            self.record(
                transfer_id,
                StockTransferCommand::CancelTransfer(CancelTransfer {
                    transfer_id,
                    reason: cause.to_string(),
                    source_restored: true,
                    occurred_at: self.ctx.now(),
                }),
            )?;
            Ok(true)
        });

        match outcome {
            Ok(true) => tracing::warn!(transfer = number, "transfer cancelled: {cause}"),
            Ok(false) => tracing::error!(
                transfer = number,
                "transfer left pending with stock effects applied: {cause}"
            ),
            Err(err) => tracing::error!(transfer = number, "failed to cancel transfer: {err}"),
        }
    }

    fn record(
        &self,
        transfer_id: StockTransferId,
        cmd: StockTransferCommand,
    ) -> Result<StockTransfer, DispatchError> {
        let committed = self.ctx.dispatcher().dispatch_with_retry(
            transfer_id.0,
            TRANSFER_AGGREGATE_TYPE,
            &cmd,
            make_transfer,
        )?;
        self.ctx.notifier().committed(&committed.events);
        Ok(committed.aggregate)
    }
}

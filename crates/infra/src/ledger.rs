//! Inventory ledger: the single entry point for stock quantity changes.
//!
//! Every decrement is checked against the freshly loaded quantity and
//! appended under that version, so two concurrent decrements can never both
//! pass the non-negative check against the same stale read. A lost race is
//! retried a bounded number of times and then reported as a concurrent
//! modification.

use std::sync::Arc;

use quoteflow_auth::{Actor, Permission};
use quoteflow_core::{AggregateId, BranchId, DomainError, ExpectedVersion};
use quoteflow_events::EventBus;
use quoteflow_inventory::{
    AdjustQuantity, AdjustmentReason, CreateItem, DeactivateItem, InventoryCommand,
    InventoryEvent, InventoryItem, InventoryItemId,
};

use crate::command_dispatcher::{Committed, DispatchError};
use crate::context::{ServiceContext, require};
use crate::event_store::{EventStore, StoredEvent};

pub const ITEM_AGGREGATE_TYPE: &str = "inventory.item";

/// Input for [`InventoryLedger::create_item`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub item_code: String,
    pub barcode: Option<String>,
    pub branch_id: Option<BranchId>,
    pub name: String,
    pub unit: String,
    pub cost: i64,
    pub price: i64,
    pub initial_quantity: i64,
}

#[derive(Debug)]
pub struct InventoryLedger<S, B> {
    ctx: Arc<ServiceContext<S, B>>,
}

impl<S, B> Clone for InventoryLedger<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

fn make_item(id: AggregateId) -> InventoryItem {
    InventoryItem::empty(InventoryItemId(id))
}

impl<S, B> InventoryLedger<S, B>
where
    S: EventStore,
    B: EventBus<StoredEvent>,
{
    pub fn new(ctx: Arc<ServiceContext<S, B>>) -> Self {
        Self { ctx }
    }

    pub fn create_item(&self, actor: &Actor, item: NewItem) -> Result<InventoryItem, DispatchError> {
        require(actor, &Permission::INVENTORY_MANAGE)?;

        let item_id = InventoryItemId::for_code(&item.item_code, item.branch_id);
        let cmd = InventoryCommand::CreateItem(CreateItem {
            item_id,
            item_code: item.item_code,
            barcode: item.barcode,
            branch_id: item.branch_id,
            name: item.name,
            unit: item.unit,
            cost: item.cost,
            price: item.price,
            initial_quantity: item.initial_quantity,
            occurred_at: self.ctx.now(),
        });

        let committed = self.ctx.dispatcher().dispatch_expecting(
            item_id.0,
            ITEM_AGGREGATE_TYPE,
            ExpectedVersion::NoStream,
            &cmd,
            make_item,
        )?;
        tracing::info!(item_id = %item_id, "inventory item created");
        Ok(committed.aggregate)
    }

    pub fn get(&self, item_id: InventoryItemId) -> Result<InventoryItem, DispatchError> {
        let item = self.ctx.dispatcher().load(item_id.0, make_item)?;
        if !item.exists() {
            return Err(DomainError::not_found(format!("inventory item {item_id}")).into());
        }
        Ok(item)
    }

    /// The record for `item_code` at `branch_id`, if one exists.
    pub fn find(
        &self,
        item_code: &str,
        branch_id: Option<BranchId>,
    ) -> Result<Option<InventoryItem>, DispatchError> {
        let item = self
            .ctx
            .dispatcher()
            .load(InventoryItemId::for_code(item_code, branch_id).0, make_item)?;
        Ok(item.exists().then_some(item))
    }

    /// Apply a signed quantity change.
    ///
    /// Fails with insufficient stock when the result would go negative; the
    /// stored quantity is then unchanged.
    pub fn adjust_quantity(
        &self,
        item_id: InventoryItemId,
        delta: i64,
        reason: AdjustmentReason,
        reference: Option<&str>,
    ) -> Result<InventoryItem, DispatchError> {
        let cmd = InventoryCommand::AdjustQuantity(AdjustQuantity {
            item_id,
            delta,
            reason,
            reference: reference.map(str::to_string),
            occurred_at: self.ctx.now(),
        });

        let Committed { aggregate, .. } = self.ctx.dispatcher().dispatch_with_retry(
            item_id.0,
            ITEM_AGGREGATE_TYPE,
            &cmd,
            make_item,
        )?;

        tracing::debug!(
            item_id = %item_id,
            delta,
            ?reason,
            reference,
            quantity = aggregate.quantity(),
            "stock adjusted"
        );
        Ok(aggregate)
    }

    /// Staff correction of a stock level.
    pub fn adjust_manually(
        &self,
        actor: &Actor,
        item_id: InventoryItemId,
        delta: i64,
        note: Option<&str>,
    ) -> Result<InventoryItem, DispatchError> {
        require(actor, &Permission::INVENTORY_MANAGE)?;
        self.adjust_quantity(item_id, delta, AdjustmentReason::Manual, note)
    }

    pub fn deactivate(&self, actor: &Actor, item_id: InventoryItemId) -> Result<InventoryItem, DispatchError> {
        require(actor, &Permission::INVENTORY_MANAGE)?;

        let cmd = InventoryCommand::DeactivateItem(DeactivateItem {
            item_id,
            occurred_at: self.ctx.now(),
        });
        let committed =
            self.ctx
                .dispatcher()
                .dispatch_with_retry(item_id.0, ITEM_AGGREGATE_TYPE, &cmd, make_item)?;
        Ok(committed.aggregate)
    }

    /// The record for `item_code` at `branch_id`, created from `template` with
    /// zero stock when missing. The flag is true when this call created it.
    ///
    /// Safe under concurrent callers: the create is conditional on the stream
    /// not existing, and the loser picks up the winner's record.
    pub fn find_or_create_for_branch(
        &self,
        item_code: &str,
        branch_id: BranchId,
        template: &InventoryItem,
    ) -> Result<(InventoryItem, bool), DispatchError> {
        let item_id = InventoryItemId::for_code(item_code, Some(branch_id));
        let dispatcher = self.ctx.dispatcher();

        for _ in 0..dispatcher.max_attempts() {
            let existing = dispatcher.load(item_id.0, make_item)?;
            if existing.exists() {
                return Ok((existing, false));
            }

            let cmd = InventoryCommand::CreateItem(CreateItem {
                item_id,
                item_code: item_code.to_string(),
                barcode: template.barcode().map(str::to_string),
                branch_id: Some(branch_id),
                name: template.name().to_string(),
                unit: template.unit().to_string(),
                cost: template.cost(),
                price: template.price(),
                initial_quantity: 0,
                occurred_at: self.ctx.now(),
            });

            match dispatcher.dispatch_expecting(
                item_id.0,
                ITEM_AGGREGATE_TYPE,
                ExpectedVersion::NoStream,
                &cmd,
                make_item,
            ) {
                Ok(committed) => {
                    tracing::info!(%item_id, %branch_id, item_code, "branch item created");
                    return Ok((committed.aggregate, true));
                }
                Err(err) if err.is_concurrency() => continue,
                Err(err) => return Err(err),
            }
        }

        Err(DispatchError::ConcurrentModification {
            aggregate_type: ITEM_AGGREGATE_TYPE.to_string(),
            aggregate_id: item_id.0,
            attempts: dispatcher.max_attempts(),
        })
    }

    /// Sum of all adjustments on `item_id` tagged with `reference`.
    ///
    /// A compensated adjustment nets out to zero, which lets a resumed
    /// process tell whether its own earlier step is still in effect.
    pub fn net_adjustment(&self, item_id: InventoryItemId, reference: &str) -> Result<i64, DispatchError> {
        let history: Vec<InventoryEvent> = self.ctx.dispatcher().history(item_id.0)?;

        Ok(history
            .iter()
            .filter_map(|ev| match ev {
                InventoryEvent::QuantityAdjusted(adj) if adj.reference.as_deref() == Some(reference) => {
                    Some(adj.delta)
                }
                _ => None,
            })
            .sum())
    }
}

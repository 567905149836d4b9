//! Purchase orders and goods receiving.
//!
//! Receiving is a saga over three aggregates:
//!
//! 1. open a `PurchaseReceiving` as pending (compensation: void it)
//! 2. increment stock per line (compensation: decrement it back)
//! 3. record the receipt on the purchase order
//!
//! then post the receiving. Lines beyond what is still outstanding on the
//! order are accepted and flagged as over-receipts.

use std::collections::HashMap;
use std::sync::Arc;

use quoteflow_auth::{Actor, Permission};
use quoteflow_core::{AggregateId, DocumentKind, DomainError, ExpectedVersion};
use quoteflow_events::EventBus;
use quoteflow_inventory::{AdjustmentReason, InventoryItemId};
use quoteflow_purchasing::{
    AddLine, Approve, ClosePurchaseOrder, CreatePurchaseOrder, OpenReceiving, PostReceiving,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderId, PurchaseReceiving, ReceiptLine,
    ReceivingCommand, ReceivingId, ReceivingLine, RecordReceipt, VoidReceiving,
};

use crate::command_dispatcher::DispatchError;
use crate::context::{ServiceContext, require};
use crate::event_store::{EventStore, StoredEvent};
use crate::ledger::InventoryLedger;
use crate::numbering::NumberingService;
use crate::saga::Saga;

pub const ORDER_AGGREGATE_TYPE: &str = "purchasing.order";
pub const RECEIVING_AGGREGATE_TYPE: &str = "purchasing.receiving";

fn make_order(id: AggregateId) -> PurchaseOrder {
    PurchaseOrder::empty(PurchaseOrderId(id))
}

fn make_receiving(id: AggregateId) -> PurchaseReceiving {
    PurchaseReceiving::empty(ReceivingId(id))
}

/// A line of a new purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrderLine {
    pub inventory_item_id: InventoryItemId,
    pub quantity: i64,
    pub unit_cost: i64,
}

#[derive(Debug)]
pub struct PurchasingService<S, B> {
    ctx: Arc<ServiceContext<S, B>>,
    ledger: InventoryLedger<S, B>,
    numbering: NumberingService<S, B>,
}

impl<S, B> PurchasingService<S, B>
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

    pub fn get_order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, DispatchError> {
        let order = self.ctx.dispatcher().load(order_id.0, make_order)?;
        if !order.exists() {
            return Err(DomainError::not_found(format!("purchase order {}", order_id.0)).into());
        }
        Ok(order)
    }

    pub fn get_receiving(&self, receiving_id: ReceivingId) -> Result<PurchaseReceiving, DispatchError> {
        let receiving = self.ctx.dispatcher().load(receiving_id.0, make_receiving)?;
        if !receiving.exists() {
            return Err(DomainError::not_found(format!("receiving {}", receiving_id.0)).into());
        }
        Ok(receiving)
    }

    /// Draft purchase order with its lines.
    pub fn create_order(
        &self,
        actor: &Actor,
        supplier_name: &str,
        lines: &[NewOrderLine],
    ) -> Result<PurchaseOrder, DispatchError> {
        require(actor, &Permission::PURCHASING_MANAGE)?;
        for line in lines {
            self.ledger.get(line.inventory_item_id)?;
        }

        let order_number = self.numbering.next(DocumentKind::PurchaseOrder)?;
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let dispatcher = self.ctx.dispatcher();

        let created = dispatcher.dispatch_expecting(
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            ExpectedVersion::NoStream,
            &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id,
                order_number: order_number.clone(),
                supplier_name: supplier_name.to_string(),
                created_by: actor.id,
                occurred_at: self.ctx.now(),
            }),
            make_order,
        )?;

        let mut order = created.aggregate;
        for line in lines {
            let cmd = PurchaseOrderCommand::AddLine(AddLine {
                order_id,
                inventory_item_id: line.inventory_item_id,
                quantity: line.quantity,
                unit_cost: line.unit_cost,
                occurred_at: self.ctx.now(),
            });
            order = dispatcher
                .dispatch_with_retry(order_id.0, ORDER_AGGREGATE_TYPE, &cmd, make_order)?
                .aggregate;
        }

        tracing::info!(order = %order_number, lines = order.lines().len(), "purchase order created");
        Ok(order)
    }

    pub fn approve_order(&self, actor: &Actor, order_id: PurchaseOrderId) -> Result<PurchaseOrder, DispatchError> {
        require(actor, &Permission::PURCHASING_MANAGE)?;

        let cmd = PurchaseOrderCommand::Approve(Approve {
            order_id,
            approved_by: actor.id,
            occurred_at: self.ctx.now(),
        });
        Ok(self
            .ctx
            .dispatcher()
            .dispatch_with_retry(order_id.0, ORDER_AGGREGATE_TYPE, &cmd, make_order)?
            .aggregate)
    }

    pub fn close_order(&self, actor: &Actor, order_id: PurchaseOrderId) -> Result<PurchaseOrder, DispatchError> {
        require(actor, &Permission::PURCHASING_MANAGE)?;

        let cmd = PurchaseOrderCommand::Close(ClosePurchaseOrder {
            order_id,
            occurred_at: self.ctx.now(),
        });
        Ok(self
            .ctx
            .dispatcher()
            .dispatch_with_retry(order_id.0, ORDER_AGGREGATE_TYPE, &cmd, make_order)?
            .aggregate)
    }

    /// Receive goods against an approved purchase order.
    #[tracing::instrument(skip_all, fields(order_id = %order_id.0))]
    pub fn receive(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
        lines: Vec<ReceiptLine>,
    ) -> Result<PurchaseReceiving, DispatchError> {
        require(actor, &Permission::PURCHASING_RECEIVE)?;

        if lines.is_empty() {
            return Err(DomainError::validation("receipt must have at least one line").into());
        }
        let order = self.get_order(order_id)?;
        if !order.status().accepts_receipts() {
            return Err(DomainError::invalid_transition(order.status().as_str(), "receive").into());
        }
        let order_number = order
            .number()
            .map(ToString::to_string)
            .ok_or_else(|| DomainError::invariant("purchase order has no number"))?;

        let receiving_lines = receiving_lines(&order, &lines)?;
        for line in receiving_lines.iter().filter(|l| l.over_receipt) {
            tracing::warn!(
                order = %order_number,
                line_no = line.order_line_no,
                quantity = line.quantity_received,
                "over-receipt: more received than outstanding on the order"
            );
        }

        let receiving_number = self.numbering.next(DocumentKind::Receiving)?;
        let receiving_id = ReceivingId::new(AggregateId::new());
        let reference = receiving_number.to_string();
        let dispatcher = self.ctx.dispatcher();

        let order_committed = Saga::<DispatchError>::new("purchasing.receive", reference.clone()).run(|saga| {
            dispatcher.dispatch_expecting(
                receiving_id.0,
                RECEIVING_AGGREGATE_TYPE,
                ExpectedVersion::NoStream,
                &ReceivingCommand::OpenReceiving(OpenReceiving {
                    receiving_id,
                    receiving_number: receiving_number.clone(),
                    purchase_order_id: order_id,
                    received_by: actor.id,
                    lines: receiving_lines.clone(),
                    occurred_at: self.ctx.now(),
                }),
                make_receiving,
            )?;
            saga.compensate_with("void receiving", move || {
                let cmd = ReceivingCommand::VoidReceiving(VoidReceiving {
                    receiving_id,
                    reason: "receipt rolled back".to_string(),
                    occurred_at: self.ctx.now(),
                });
                dispatcher
                    .dispatch_with_retry(receiving_id.0, RECEIVING_AGGREGATE_TYPE, &cmd, make_receiving)
                    .map(|_| ())
            });

            for line in &receiving_lines {
                let (item_id, quantity) = (line.inventory_item_id, line.quantity_received);
                self.ledger
                    .adjust_quantity(item_id, quantity, AdjustmentReason::Receiving, Some(&reference))?;

                let reference = reference.clone();
                saga.compensate_with("take receipt back", move || {
                    self.ledger
                        .adjust_quantity(item_id, -quantity, AdjustmentReason::Compensation, Some(&reference))
                        .map(|_| ())
                });
            }

            let cmd = PurchaseOrderCommand::RecordReceipt(RecordReceipt {
                order_id,
                receiving_id: receiving_id.0,
                lines: lines.clone(),
                occurred_at: self.ctx.now(),
            });
            dispatcher.dispatch_with_retry(order_id.0, ORDER_AGGREGATE_TYPE, &cmd, make_order)
        })?;

        let posted = dispatcher.dispatch_with_retry(
            receiving_id.0,
            RECEIVING_AGGREGATE_TYPE,
            &ReceivingCommand::PostReceiving(PostReceiving {
                receiving_id,
                occurred_at: self.ctx.now(),
            }),
            make_receiving,
        )?;

        tracing::info!(
            receiving = %reference,
            order = %order_number,
            order_status = order_committed.aggregate.status().as_str(),
            over_receipt = posted.aggregate.has_over_receipt(),
            "receiving posted"
        );
        self.ctx.notifier().committed(&posted.events);
        Ok(posted.aggregate)
    }
}

/// Price and flag receipt lines against the order. Over-receipt is judged
/// cumulatively, so two lines for the same order line share what is left.
fn receiving_lines(order: &PurchaseOrder, lines: &[ReceiptLine]) -> Result<Vec<ReceivingLine>, DispatchError> {
    let mut remaining: HashMap<u32, i64> = HashMap::new();

    lines
        .iter()
        .map(|received| -> Result<ReceivingLine, DispatchError> {
            if received.quantity <= 0 {
                return Err(DomainError::validation("received quantity must be positive").into());
            }
            let line = order.line(received.line_no).ok_or_else(|| {
                DomainError::validation(format!("purchase order has no line {}", received.line_no))
            })?;

            let left = remaining.entry(line.line_no).or_insert_with(|| line.outstanding());
            let over_receipt = received.quantity > *left;
            *left = (*left - received.quantity).max(0);

            Ok(ReceivingLine {
                order_line_no: line.line_no,
                inventory_item_id: line.inventory_item_id,
                quantity_received: received.quantity,
                unit_cost: line.unit_cost,
                over_receipt,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{InMemoryBus, InMemoryContext, InMemoryStore};
    use crate::ledger::NewItem;
    use quoteflow_core::{ErrorKind, UserId};
    use quoteflow_purchasing::{PurchaseOrderStatus, ReceivingStatus};

    struct Fixture {
        service: PurchasingService<InMemoryStore, InMemoryBus>,
        ledger: InventoryLedger<InMemoryStore, InMemoryBus>,
        admin: Actor,
        item: InventoryItemId,
    }

    fn fixture() -> Fixture {
        let ctx = Arc::new(InMemoryContext::in_memory_default());
        let ledger = InventoryLedger::new(Arc::clone(&ctx));
        let admin = Actor::admin(UserId::new());
        let item = ledger
            .create_item(
                &admin,
                NewItem {
                    item_code: "PAPER-A4".to_string(),
                    barcode: None,
                    branch_id: None,
                    name: "Paper".to_string(),
                    unit: "ream".to_string(),
                    cost: 300,
                    price: 450,
                    initial_quantity: 2,
                },
            )
            .unwrap()
            .id_typed();

        Fixture {
            service: PurchasingService::new(ctx),
            ledger,
            admin,
            item,
        }
    }

    impl Fixture {
        fn approved_order(&self, quantity: i64) -> PurchaseOrderId {
            let order = self
                .service
                .create_order(
                    &self.admin,
                    "Acme Paper",
                    &[NewOrderLine {
                        inventory_item_id: self.item,
                        quantity,
                        unit_cost: 300,
                    }],
                )
                .unwrap();
            self.service.approve_order(&self.admin, order.id_typed()).unwrap();
            order.id_typed()
        }
    }

    #[test]
    fn partial_then_full_receipt() {
        let f = fixture();
        let order_id = f.approved_order(10);

        let first = f
            .service
            .receive(&f.admin, order_id, vec![ReceiptLine { line_no: 1, quantity: 4 }])
            .unwrap();
        assert_eq!(first.status(), ReceivingStatus::Posted);
        assert_eq!(f.ledger.get(f.item).unwrap().quantity(), 6);
        assert_eq!(
            f.service.get_order(order_id).unwrap().status(),
            PurchaseOrderStatus::PartiallyReceived
        );

        f.service
            .receive(&f.admin, order_id, vec![ReceiptLine { line_no: 1, quantity: 6 }])
            .unwrap();
        let order = f.service.get_order(order_id).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
        assert_eq!(order.line(1).unwrap().received_quantity, 10);
        assert_eq!(f.ledger.get(f.item).unwrap().quantity(), 12);
    }

    #[test]
    fn draft_orders_do_not_accept_receipts() {
        let f = fixture();
        let order = f
            .service
            .create_order(
                &f.admin,
                "Acme Paper",
                &[NewOrderLine {
                    inventory_item_id: f.item,
                    quantity: 5,
                    unit_cost: 300,
                }],
            )
            .unwrap();

        let err = f
            .service
            .receive(&f.admin, order.id_typed(), vec![ReceiptLine { line_no: 1, quantity: 1 }])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(f.ledger.get(f.item).unwrap().quantity(), 2);
    }

    #[test]
    fn unknown_line_is_rejected_before_stock_moves() {
        let f = fixture();
        let order_id = f.approved_order(5);

        let err = f
            .service
            .receive(&f.admin, order_id, vec![ReceiptLine { line_no: 9, quantity: 1 }])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(f.ledger.get(f.item).unwrap().quantity(), 2);
    }

    #[test]
    fn delivery_staff_cannot_receive() {
        let f = fixture();
        let order_id = f.approved_order(5);

        let err = f
            .service
            .receive(
                &Actor::delivery(UserId::new()),
                order_id,
                vec![ReceiptLine { line_no: 1, quantity: 1 }],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}

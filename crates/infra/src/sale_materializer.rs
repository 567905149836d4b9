//! Sale materialization: quotation (or direct order) → Sale + stock decrements.
//!
//! Runs as a [`Saga`]:
//!
//! 1. record the `Sale` (compensation: discard it)
//! 2. decrement stock per line (compensation: increment it back)
//! 3. complete the quotation, conditional on the version it was read at
//!
//! Step 3 is the pivot. It fails when anything touched the quotation since it
//! was read (a concurrent delivery, a cancellation request), and the saga then
//! unwinds steps 2 and 1, leaving the quotation in its pre-transition state.

use std::sync::Arc;

use quoteflow_auth::{Actor, Permission};
use quoteflow_core::{AggregateId, AggregateRoot, DocumentKind, DomainError, ExpectedVersion, UserId};
use quoteflow_events::EventBus;
use quoteflow_inventory::{AdjustmentReason, InventoryItemId};
use quoteflow_quotations::{Complete, CompletionMethod, Quotation, QuotationCommand, QuotationId};
use quoteflow_sales::{
    DiscardSale, NewSaleItem, RecordPayment, RecordSale, Sale, SaleCommand, SaleId,
};

use crate::command_dispatcher::{Committed, DispatchError};
use crate::context::{ServiceContext, require};
use crate::event_store::{EventStore, StoredEvent};
use crate::ledger::InventoryLedger;
use crate::numbering::NumberingService;
use crate::quotation_service::{QUOTATION_AGGREGATE_TYPE, make_quotation};
use crate::saga::Saga;

pub const SALE_AGGREGATE_TYPE: &str = "sales.sale";

pub(crate) fn make_sale(id: AggregateId) -> Sale {
    Sale::empty(SaleId(id))
}

/// A sale recorded at the counter, without a quotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectSale {
    pub customer_id: UserId,
    pub items: Vec<NewSaleItem>,
    pub tax_amount: i64,
    pub discount_amount: i64,
}

/// Outcome of a deliver/convert.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub quotation: Quotation,
    pub sale: Sale,
}

#[derive(Debug)]
pub struct SaleMaterializer<S, B> {
    ctx: Arc<ServiceContext<S, B>>,
    ledger: InventoryLedger<S, B>,
    numbering: NumberingService<S, B>,
}

impl<S, B> Clone for SaleMaterializer<S, B> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            ledger: self.ledger.clone(),
            numbering: self.numbering.clone(),
        }
    }
}

impl<S, B> SaleMaterializer<S, B>
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

    /// Deliver or convert a quotation into a sale.
    #[tracing::instrument(skip_all, fields(quotation_id = %quotation_id.0, via = ?via))]
    pub fn materialize(
        &self,
        quotation_id: QuotationId,
        actor: &Actor,
        via: CompletionMethod,
    ) -> Result<Materialized, DispatchError> {
        let dispatcher = self.ctx.dispatcher();
        let quotation = dispatcher.load(quotation_id.0, make_quotation)?;

        quotation.authorize(via.action(), actor)?;
        let read_version = quotation.version();
        let quotation_number = quotation
            .number()
            .cloned()
            .ok_or_else(|| DomainError::invariant("quotation has no number"))?;

        let items: Vec<NewSaleItem> = quotation
            .positive_items()
            .map(|item| NewSaleItem {
                inventory_item_id: item.inventory_item_id,
                description: item.description.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();
        if items.is_empty() {
            return Err(DomainError::validation("quotation has no line with a positive quantity").into());
        }

        let totals = quotation.totals();
        let sale_number = self.numbering.next(DocumentKind::Sale)?;
        let sale_id = SaleId::new(AggregateId::new());
        let reference = quotation_number.to_string();

        let record = RecordSale {
            sale_id,
            sale_number: sale_number.clone(),
            quotation_id: Some(quotation_id.0),
            customer_id: quotation.customer_id(),
            recorded_by: actor.id,
            items,
            tax_amount: totals.tax_amount,
            discount_amount: totals.discount_amount,
            occurred_at: self.ctx.now(),
        };

        let (sale, completed) = Saga::<DispatchError>::new("sale.materialize", reference.clone()).run(|saga| {
            let sale = self.commit_sale(saga, record, &reference)?;

            let complete = QuotationCommand::Complete(Complete {
                quotation_id,
                actor: *actor,
                via,
                sale_id: sale_id.0,
                sale_number: sale_number.clone(),
                occurred_at: self.ctx.now(),
            });
            let completed = dispatcher.dispatch_expecting(
                quotation_id.0,
                QUOTATION_AGGREGATE_TYPE,
                ExpectedVersion::Exact(read_version),
                &complete,
                make_quotation,
            )?;

            Ok((sale, completed))
        })?;

        tracing::info!(
            quotation = %reference,
            sale = %sale_number,
            total = sale.aggregate.total(),
            "quotation completed"
        );
        self.ctx.notifier().committed(&sale.events);
        self.ctx.notifier().committed(&completed.events);

        Ok(Materialized {
            quotation: completed.aggregate,
            sale: sale.aggregate,
        })
    }

    /// Record a sale with no originating quotation. Zero-quantity lines are
    /// dropped.
    #[tracing::instrument(skip_all, fields(customer_id = %sale.customer_id))]
    pub fn record_direct_sale(&self, actor: &Actor, sale: DirectSale) -> Result<Sale, DispatchError> {
        require(actor, &Permission::SALE_RECORD)?;

        if sale.items.iter().any(|line| line.quantity < 0) {
            return Err(DomainError::validation("sale quantities cannot be negative").into());
        }
        let items: Vec<NewSaleItem> = sale.items.into_iter().filter(|line| line.quantity > 0).collect();
        if items.is_empty() {
            return Err(DomainError::validation("sale has no line with a positive quantity").into());
        }

        let sale_number = self.numbering.next(DocumentKind::Sale)?;
        let reference = sale_number.to_string();
        let record = RecordSale {
            sale_id: SaleId::new(AggregateId::new()),
            sale_number,
            quotation_id: None,
            customer_id: sale.customer_id,
            recorded_by: actor.id,
            items,
            tax_amount: sale.tax_amount,
            discount_amount: sale.discount_amount,
            occurred_at: self.ctx.now(),
        };

        let committed = Saga::<DispatchError>::new("sale.direct", reference.clone())
            .run(|saga| self.commit_sale(saga, record, &reference))?;

        tracing::info!(sale = %reference, total = committed.aggregate.total(), "direct sale recorded");
        self.ctx.notifier().committed(&committed.events);
        Ok(committed.aggregate)
    }

    pub fn record_payment(&self, actor: &Actor, sale_id: SaleId, amount: i64) -> Result<Sale, DispatchError> {
        require(actor, &Permission::SALE_PAYMENT)?;

        let cmd = SaleCommand::RecordPayment(RecordPayment {
            sale_id,
            amount,
            recorded_by: actor.id,
            occurred_at: self.ctx.now(),
        });
        let committed =
            self.ctx
                .dispatcher()
                .dispatch_with_retry(sale_id.0, SALE_AGGREGATE_TYPE, &cmd, make_sale)?;

        tracing::info!(
            sale_id = %sale_id.0,
            amount,
            balance = committed.aggregate.balance(),
            status = ?committed.aggregate.status(),
            "payment recorded"
        );
        self.ctx.notifier().committed(&committed.events);
        Ok(committed.aggregate)
    }

    pub fn get_sale(&self, sale_id: SaleId) -> Result<Sale, DispatchError> {
        let sale = self.ctx.dispatcher().load(sale_id.0, make_sale)?;
        if !sale.exists() {
            return Err(DomainError::not_found(format!("sale {}", sale_id.0)).into());
        }
        Ok(sale)
    }

    /// Steps 1 and 2: record the sale, then take its lines out of stock, each
    /// with its compensation registered on `saga`.
    fn commit_sale<'a>(
        &'a self,
        saga: &mut Saga<'a, DispatchError>,
        record: RecordSale,
        reference: &str,
    ) -> Result<Committed<Sale>, DispatchError> {
        let sale_id = record.sale_id;
        let lines: Vec<(InventoryItemId, i64)> = record
            .items
            .iter()
            .map(|line| (line.inventory_item_id, line.quantity))
            .collect();

        let cmd = SaleCommand::RecordSale(record);
        let sale = self
            .ctx
            .dispatcher()
            .dispatch(sale_id.0, SALE_AGGREGATE_TYPE, &cmd, make_sale)?;
        saga.compensate_with("discard sale", move || {
            let discard = SaleCommand::DiscardSale(DiscardSale {
                sale_id,
                reason: "materialization rolled back".to_string(),
                occurred_at: self.ctx.now(),
            });
            self.ctx
                .dispatcher()
                .dispatch_with_retry(sale_id.0, SALE_AGGREGATE_TYPE, &discard, make_sale)
                .map(|_| ())
        });

        for (item_id, quantity) in lines {
            self.ledger
                .adjust_quantity(item_id, -quantity, AdjustmentReason::Sale, Some(reference))?;

            let reference = reference.to_string();
            saga.compensate_with("restore stock", move || {
                self.ledger
                    .adjust_quantity(item_id, quantity, AdjustmentReason::Compensation, Some(&reference))
                    .map(|_| ())
            });
        }

        Ok(sale)
    }
}

//! Quotation lifecycle operations.
//!
//! One method per transition, each taking the quotation id and the acting
//! [`Actor`] and returning the updated quotation (or the materialized sale
//! for deliver/convert). Legality and role checks happen in the aggregate;
//! this layer loads, orchestrates stock side effects, commits, and notifies.

use std::sync::Arc;

use quoteflow_auth::Actor;
use quoteflow_core::{
    AggregateId, AggregateRoot, DocumentKind, DomainError, ErrorKind, ExpectedVersion, UserId,
};
use quoteflow_events::EventBus;
use quoteflow_inventory::{AdjustmentReason, InventoryItemId};
use quoteflow_quotations::{
    Accept, Approve, ApproveCancellation, Cancel, CompletionMethod, CreateQuotation,
    DenyCancellation, NewQuotationItem, Quotation, QuotationAction, QuotationCommand, QuotationId,
    Reject, ReviseItems, Submit,
};

use crate::command_dispatcher::DispatchError;
use crate::context::ServiceContext;
use crate::event_store::{EventStore, StoredEvent};
use crate::ledger::InventoryLedger;
use crate::numbering::NumberingService;
use crate::sale_materializer::{Materialized, SaleMaterializer};
use crate::saga::Saga;

pub const QUOTATION_AGGREGATE_TYPE: &str = "quotations.quotation";

pub(crate) fn make_quotation(id: AggregateId) -> Quotation {
    Quotation::empty(QuotationId(id))
}

/// Input for [`QuotationService::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuotation {
    pub customer_id: UserId,
    pub items: Vec<NewQuotationItem>,
    pub tax_amount: i64,
    pub discount_amount: i64,
    pub as_draft: bool,
}

#[derive(Debug)]
pub struct QuotationService<S, B> {
    ctx: Arc<ServiceContext<S, B>>,
    ledger: InventoryLedger<S, B>,
    numbering: NumberingService<S, B>,
    materializer: SaleMaterializer<S, B>,
}

impl<S, B> QuotationService<S, B>
where
    S: EventStore,
    B: EventBus<StoredEvent>,
{
    pub fn new(ctx: Arc<ServiceContext<S, B>>) -> Self {
        Self {
            ledger: InventoryLedger::new(Arc::clone(&ctx)),
            numbering: NumberingService::new(Arc::clone(&ctx)),
            materializer: SaleMaterializer::new(Arc::clone(&ctx)),
            ctx,
        }
    }

    pub fn get(&self, quotation_id: QuotationId) -> Result<Quotation, DispatchError> {
        let quotation = self.ctx.dispatcher().load(quotation_id.0, make_quotation)?;
        if !quotation.exists() {
            return Err(DomainError::not_found(format!("quotation {}", quotation_id.0)).into());
        }
        Ok(quotation)
    }

    #[tracing::instrument(skip_all, fields(customer_id = %quotation.customer_id))]
    pub fn create(&self, actor: &Actor, quotation: NewQuotation) -> Result<Quotation, DispatchError> {
        self.ensure_items_exist(&quotation.items)?;

        let quotation_number = self.numbering.next(DocumentKind::Quotation)?;
        let quotation_id = QuotationId::new(AggregateId::new());
        let cmd = QuotationCommand::CreateQuotation(CreateQuotation {
            quotation_id,
            quotation_number: quotation_number.clone(),
            customer_id: quotation.customer_id,
            actor: *actor,
            items: quotation.items,
            tax_amount: quotation.tax_amount,
            discount_amount: quotation.discount_amount,
            as_draft: quotation.as_draft,
            occurred_at: self.ctx.now(),
        });

        let committed = self.ctx.dispatcher().dispatch_expecting(
            quotation_id.0,
            QUOTATION_AGGREGATE_TYPE,
            ExpectedVersion::NoStream,
            &cmd,
            make_quotation,
        )?;

        tracing::info!(
            quotation = %quotation_number,
            total = committed.aggregate.totals().total,
            status = %committed.aggregate.status(),
            "quotation created"
        );
        self.ctx.notifier().committed(&committed.events);
        Ok(committed.aggregate)
    }

    pub fn revise(
        &self,
        quotation_id: QuotationId,
        actor: &Actor,
        items: Vec<NewQuotationItem>,
        tax_amount: i64,
        discount_amount: i64,
    ) -> Result<Quotation, DispatchError> {
        self.ensure_items_exist(&items)?;

        self.transition(
            quotation_id,
            QuotationAction::Revise,
            QuotationCommand::ReviseItems(ReviseItems {
                quotation_id,
                actor: *actor,
                items,
                tax_amount,
                discount_amount,
                occurred_at: self.ctx.now(),
            }),
        )
    }

    pub fn submit(&self, quotation_id: QuotationId, actor: &Actor) -> Result<Quotation, DispatchError> {
        self.transition(
            quotation_id,
            QuotationAction::Submit,
            QuotationCommand::Submit(Submit {
                quotation_id,
                actor: *actor,
                occurred_at: self.ctx.now(),
            }),
        )
    }

    pub fn approve(
        &self,
        quotation_id: QuotationId,
        actor: &Actor,
        assigned_delivery: Option<Actor>,
    ) -> Result<Quotation, DispatchError> {
        self.transition(
            quotation_id,
            QuotationAction::Approve,
            QuotationCommand::Approve(Approve {
                quotation_id,
                actor: *actor,
                assigned_delivery,
                occurred_at: self.ctx.now(),
            }),
        )
    }

    pub fn reject(
        &self,
        quotation_id: QuotationId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Quotation, DispatchError> {
        self.transition(
            quotation_id,
            QuotationAction::Reject,
            QuotationCommand::Reject(Reject {
                quotation_id,
                actor: *actor,
                reason: reason.to_string(),
                occurred_at: self.ctx.now(),
            }),
        )
    }

    pub fn accept(&self, quotation_id: QuotationId, actor: &Actor) -> Result<Quotation, DispatchError> {
        self.transition(
            quotation_id,
            QuotationAction::Accept,
            QuotationCommand::Accept(Accept {
                quotation_id,
                actor: *actor,
                occurred_at: self.ctx.now(),
            }),
        )
    }

    /// Delivery hands the goods over: materialize the sale and take stock.
    pub fn deliver(&self, quotation_id: QuotationId, actor: &Actor) -> Result<Materialized, DispatchError> {
        self.materializer
            .materialize(quotation_id, actor, CompletionMethod::Deliver)
    }

    /// The customer turns the quotation into a sale.
    pub fn convert(&self, quotation_id: QuotationId, actor: &Actor) -> Result<Materialized, DispatchError> {
        self.materializer
            .materialize(quotation_id, actor, CompletionMethod::Convert)
    }

    /// Cancel outright (draft/pending) or raise a cancellation request
    /// (approved/accepted).
    pub fn cancel(
        &self,
        quotation_id: QuotationId,
        actor: &Actor,
        reason: Option<&str>,
    ) -> Result<Quotation, DispatchError> {
        self.transition(
            quotation_id,
            QuotationAction::Cancel,
            QuotationCommand::Cancel(Cancel {
                quotation_id,
                actor: *actor,
                reason: reason.map(str::to_string),
                occurred_at: self.ctx.now(),
            }),
        )
    }

    /// Approve a pending cancellation request, returning committed stock
    /// first when the quotation says stock was taken.
    #[tracing::instrument(skip_all, fields(quotation_id = %quotation_id.0))]
    pub fn approve_cancellation(
        &self,
        quotation_id: QuotationId,
        actor: &Actor,
    ) -> Result<Quotation, DispatchError> {
        let dispatcher = self.ctx.dispatcher();
        let quotation = dispatcher.load(quotation_id.0, make_quotation)?;
        quotation.authorize(QuotationAction::ApproveCancellation, actor)?;

        let read_version = quotation.version();
        let stock_restored = quotation.stock_committed();
        let reference = quotation
            .number()
            .map(ToString::to_string)
            .ok_or_else(|| DomainError::invariant("quotation has no number"))?;
        let lines: Vec<(InventoryItemId, i64)> = quotation
            .positive_items()
            .map(|item| (item.inventory_item_id, item.quantity))
            .collect();

        let committed = Saga::<DispatchError>::new("quotation.cancel", reference.clone()).run(|saga| {
            if stock_restored {
                for &(item_id, quantity) in &lines {
                    self.ledger.adjust_quantity(
                        item_id,
                        quantity,
                        AdjustmentReason::CancellationRestock,
                        Some(&reference),
                    )?;

                    let reference = reference.clone();
                    saga.compensate_with("take restock back", move || {
                        self.ledger
                            .adjust_quantity(
                                item_id,
                                -quantity,
                                AdjustmentReason::Compensation,
                                Some(&reference),
                            )
                            .map(|_| ())
                    });
                }
            }

            let cmd = QuotationCommand::ApproveCancellation(ApproveCancellation {
                quotation_id,
                actor: *actor,
                stock_restored,
                occurred_at: self.ctx.now(),
            });
            dispatcher.dispatch_expecting(
                quotation_id.0,
                QUOTATION_AGGREGATE_TYPE,
                ExpectedVersion::Exact(read_version),
                &cmd,
                make_quotation,
            )
        })?;

        tracing::info!(quotation = %reference, stock_restored, "quotation cancelled");
        self.ctx.notifier().committed(&committed.events);
        Ok(committed.aggregate)
    }

    pub fn deny_cancellation(
        &self,
        quotation_id: QuotationId,
        actor: &Actor,
    ) -> Result<Quotation, DispatchError> {
        self.transition(
            quotation_id,
            QuotationAction::DenyCancellation,
            QuotationCommand::DenyCancellation(DenyCancellation {
                quotation_id,
                actor: *actor,
                occurred_at: self.ctx.now(),
            }),
        )
    }

    /// Transitions without stock side effects. A lost race is decided again
    /// against the new state, so legality is re-checked on every attempt.
    fn transition(
        &self,
        quotation_id: QuotationId,
        action: QuotationAction,
        cmd: QuotationCommand,
    ) -> Result<Quotation, DispatchError> {
        let committed = self.ctx.dispatcher().dispatch_with_retry(
            quotation_id.0,
            QUOTATION_AGGREGATE_TYPE,
            &cmd,
            make_quotation,
        )?;

        tracing::info!(
            quotation_id = %quotation_id.0,
            action = action.as_str(),
            status = %committed.aggregate.status(),
            "quotation transition committed"
        );
        self.ctx.notifier().committed(&committed.events);
        Ok(committed.aggregate)
    }

    fn ensure_items_exist(&self, items: &[NewQuotationItem]) -> Result<(), DispatchError> {
        for item in items {
            match self.ledger.get(item.inventory_item_id) {
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return Err(DomainError::validation(format!(
                        "quotation references unknown inventory item {}",
                        item.inventory_item_id
                    ))
                    .into());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{InMemoryBus, InMemoryContext, InMemoryStore};
    use crate::ledger::NewItem;
    use quoteflow_quotations::QuotationStatus;

    struct Fixture {
        service: QuotationService<InMemoryStore, InMemoryBus>,
        ledger: InventoryLedger<InMemoryStore, InMemoryBus>,
        admin: Actor,
        customer: Actor,
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
                    item_code: "SKU-1".to_string(),
                    barcode: None,
                    branch_id: None,
                    name: "Widget".to_string(),
                    unit: "pcs".to_string(),
                    cost: 5,
                    price: 10,
                    initial_quantity: 10,
                },
            )
            .unwrap()
            .id_typed();

        Fixture {
            service: QuotationService::new(ctx),
            ledger,
            admin,
            customer: Actor::customer(UserId::new()),
            item,
        }
    }

    impl Fixture {
        fn quote(&self, quantity: i64, as_draft: bool) -> Quotation {
            self.service
                .create(
                    &self.customer,
                    NewQuotation {
                        customer_id: self.customer.id,
                        items: vec![NewQuotationItem {
                            inventory_item_id: self.item,
                            description: "Widget".to_string(),
                            quantity,
                            unit_price: 10,
                        }],
                        tax_amount: 0,
                        discount_amount: 0,
                        as_draft,
                    },
                )
                .unwrap()
        }
    }

    #[test]
    fn draft_is_submitted_then_approved() {
        let f = fixture();
        let draft = f.quote(2, true);
        assert_eq!(draft.status(), QuotationStatus::Draft);

        let id = draft.id_typed();
        assert_eq!(f.service.submit(id, &f.customer).unwrap().status(), QuotationStatus::Pending);
        assert_eq!(
            f.service.approve(id, &f.admin, None).unwrap().status(),
            QuotationStatus::Approved
        );
    }

    #[test]
    fn unknown_inventory_item_is_rejected() {
        let f = fixture();
        let err = f
            .service
            .create(
                &f.customer,
                NewQuotation {
                    customer_id: f.customer.id,
                    items: vec![NewQuotationItem {
                        inventory_item_id: InventoryItemId::for_code("MISSING", None),
                        description: "ghost".to_string(),
                        quantity: 1,
                        unit_price: 1,
                    }],
                    tax_amount: 0,
                    discount_amount: 0,
                    as_draft: false,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn cancellation_request_can_be_denied() {
        let f = fixture();
        let id = f.quote(2, false).id_typed();
        f.service.approve(id, &f.admin, None).unwrap();

        let requested = f.service.cancel(id, &f.customer, Some("changed my mind")).unwrap();
        assert_eq!(requested.status(), QuotationStatus::CancellationRequested);

        let denied = f.service.deny_cancellation(id, &f.admin).unwrap();
        assert_eq!(denied.status(), QuotationStatus::Approved);
        assert!(denied.cancellation_request().is_none());
    }

    #[test]
    fn approved_cancellation_without_committed_stock_leaves_inventory() {
        let f = fixture();
        let id = f.quote(2, false).id_typed();
        f.service.approve(id, &f.admin, None).unwrap();
        f.service.cancel(id, &f.customer, None).unwrap();

        let cancelled = f.service.approve_cancellation(id, &f.admin).unwrap();
        assert_eq!(cancelled.status(), QuotationStatus::Cancelled);
        assert_eq!(f.ledger.get(f.item).unwrap().quantity(), 10);
    }

    #[test]
    fn reject_requires_admin_and_a_reason() {
        let f = fixture();
        let id = f.quote(1, false).id_typed();

        let err = f
            .service
            .reject(id, &Actor::superadmin(UserId::new()), "too expensive")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = f.service.reject(id, &f.admin, "  ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let rejected = f.service.reject(id, &f.admin, "too expensive").unwrap();
        assert_eq!(rejected.status(), QuotationStatus::Rejected);
        assert_eq!(rejected.rejection_reason(), Some("too expensive"));
    }
}

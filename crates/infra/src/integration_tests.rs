//! End-to-end tests across the reconciliation services.
//!
//! Every service shares one in-memory store, so these exercise the same
//! conditional appends the services rely on in production.
//!
//! Verifies:
//! - Quotation → sale materialization moves stock exactly once
//! - Concurrent deliveries and cancellations never oversell or double-apply
//! - Interrupted transfers resume without repeating a ledger adjustment
//! - Receiving, numbering and notifications behave under load

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use chrono::Utc;
    use proptest::prelude::*;
    use uuid::Uuid;

    use quoteflow_auth::Actor;
    use quoteflow_core::{
        AggregateId, BranchId, DocumentKind, DocumentNumber, ErrorKind, ExpectedVersion, Period,
        UserId,
    };
    use quoteflow_events::{EventBus, InMemoryEventBus, Notification};
    use quoteflow_inventory::{
        AdjustmentReason, InventoryItemId, RecordSourceDebit, RequestTransfer, StockTransfer,
        StockTransferCommand, StockTransferId, TransferStatus,
    };
    use quoteflow_purchasing::{PurchaseOrderStatus, ReceiptLine};
    use quoteflow_quotations::{
        CancellationRequested, CompletionMethod, NewQuotationItem, QuotationApproved,
        QuotationCompleted, QuotationCreated, QuotationEvent, QuotationId, QuotationItem,
        QuotationStatus, Totals,
    };
    use quoteflow_sales::{Sale, SaleId};

    use crate::clock::SystemClock;
    use crate::config::ReconcileConfig;
    use crate::context::{InMemoryBus, InMemoryContext, InMemoryStore};
    use crate::event_store::{EventStore, UncommittedEvent};
    use crate::ledger::{InventoryLedger, NewItem};
    use crate::notify::{BusNotificationSink, Notifier};
    use crate::numbering::NumberingService;
    use crate::purchasing::{NewOrderLine, PurchasingService};
    use crate::quotation_service::{NewQuotation, QUOTATION_AGGREGATE_TYPE, QuotationService};
    use crate::sale_materializer::{SALE_AGGREGATE_TYPE, SaleMaterializer};
    use crate::transfer_engine::{TRANSFER_AGGREGATE_TYPE, TransferEngine};

    struct Harness {
        ctx: Arc<InMemoryContext>,
        ledger: InventoryLedger<InMemoryStore, InMemoryBus>,
        quotations: QuotationService<InMemoryStore, InMemoryBus>,
        sales: SaleMaterializer<InMemoryStore, InMemoryBus>,
        transfers: TransferEngine<InMemoryStore, InMemoryBus>,
        purchasing: PurchasingService<InMemoryStore, InMemoryBus>,
        admin: Actor,
    }

    fn harness() -> Harness {
        harness_with(Notifier::disabled())
    }

    fn harness_with(notifier: Notifier) -> Harness {
        quoteflow_observability::init_for_tests();

        // Racing threads may lose many rounds in a row on one stream.
        let config = ReconcileConfig {
            max_attempts: 1_000,
            ..ReconcileConfig::default()
        };
        let ctx = Arc::new(InMemoryContext::in_memory(Arc::new(SystemClock), notifier, config));

        Harness {
            ledger: InventoryLedger::new(Arc::clone(&ctx)),
            quotations: QuotationService::new(Arc::clone(&ctx)),
            sales: SaleMaterializer::new(Arc::clone(&ctx)),
            transfers: TransferEngine::new(Arc::clone(&ctx)),
            purchasing: PurchasingService::new(Arc::clone(&ctx)),
            admin: Actor::admin(UserId::new()),
            ctx,
        }
    }

    impl Harness {
        fn stock(&self, code: &str, branch_id: Option<BranchId>, quantity: i64, price: i64) -> InventoryItemId {
            self.ledger
                .create_item(
                    &self.admin,
                    NewItem {
                        item_code: code.to_string(),
                        barcode: None,
                        branch_id,
                        name: code.to_lowercase(),
                        unit: "pcs".to_string(),
                        cost: price / 2,
                        price,
                        initial_quantity: quantity,
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn quantity(&self, item_id: InventoryItemId) -> i64 {
            self.ledger.get(item_id).unwrap().quantity()
        }

        fn quote(&self, customer: &Actor, lines: &[(InventoryItemId, i64, i64)]) -> QuotationId {
            let items = lines
                .iter()
                .map(|&(inventory_item_id, quantity, unit_price)| NewQuotationItem {
                    inventory_item_id,
                    description: "line".to_string(),
                    quantity,
                    unit_price,
                })
                .collect();

            self.quotations
                .create(
                    customer,
                    NewQuotation {
                        customer_id: customer.id,
                        items,
                        tax_amount: 0,
                        discount_amount: 0,
                        as_draft: false,
                    },
                )
                .unwrap()
                .id_typed()
        }

        fn approved_quote(
            &self,
            customer: &Actor,
            lines: &[(InventoryItemId, i64, i64)],
            assigned_delivery: Option<Actor>,
        ) -> QuotationId {
            let id = self.quote(customer, lines);
            self.quotations.approve(id, &self.admin, assigned_delivery).unwrap();
            id
        }

        fn all_sales(&self) -> Vec<Sale> {
            self.ctx
                .dispatcher()
                .store()
                .list_streams(SALE_AGGREGATE_TYPE)
                .unwrap()
                .into_iter()
                .map(|id| self.sales.get_sale(SaleId(id)).unwrap())
                .collect()
        }

        fn live_sales(&self) -> Vec<Sale> {
            self.all_sales().into_iter().filter(|s| !s.is_discarded()).collect()
        }

        /// Persist a pending transfer without moving any stock.
        fn pending_transfer(
            &self,
            source: InventoryItemId,
            item_code: &str,
            from_branch: BranchId,
            to_branch: BranchId,
            quantity: i64,
            sequence: u32,
        ) -> (StockTransferId, String) {
            let transfer_id = StockTransferId::new(AggregateId::new());
            let number = DocumentNumber::new(DocumentKind::Transfer, Period::of(Utc::now()), sequence, 4);
            let cmd = StockTransferCommand::RequestTransfer(RequestTransfer {
                transfer_id,
                transfer_number: number.clone(),
                item_code: item_code.to_string(),
                source_item_id: source,
                from_branch,
                to_branch,
                quantity,
                requested_by: self.admin.id,
                occurred_at: Utc::now(),
            });
            self.ctx
                .dispatcher()
                .dispatch_expecting(
                    transfer_id.0,
                    TRANSFER_AGGREGATE_TYPE,
                    ExpectedVersion::NoStream,
                    &cmd,
                    |id| StockTransfer::empty(StockTransferId(id)),
                )
                .unwrap();
            (transfer_id, number.to_string())
        }
    }

    #[test]
    fn delivery_materializes_sale_takes_stock_and_notifies() {
        let notifications = Arc::new(InMemoryEventBus::<Notification>::new());
        let inbox = notifications.subscribe();
        let h = harness_with(Notifier::new(Arc::new(BusNotificationSink::new(Arc::clone(
            &notifications,
        )))));

        let bolts = h.stock("BOLT", None, 10, 10);
        let nuts = h.stock("NUT", None, 5, 5);
        let customer = Actor::customer(UserId::new());
        let driver = Actor::delivery(UserId::new());
        let id = h.approved_quote(&customer, &[(bolts, 3, 10), (nuts, 2, 5)], Some(driver));

        let delivered = h.quotations.deliver(id, &driver).unwrap();

        assert_eq!(delivered.quotation.status(), QuotationStatus::Completed);
        assert_eq!(delivered.sale.total(), 40);
        assert_eq!(delivered.sale.items().len(), 2);
        assert_eq!(delivered.sale.quotation_id(), Some(id.0));
        assert_eq!(delivered.quotation.sale_id(), Some(delivered.sale.id_typed().0));
        assert!(delivered.quotation.stock_committed());
        assert_eq!(h.quantity(bolts), 7);
        assert_eq!(h.quantity(nuts), 3);

        let seen: Vec<String> = inbox.drain().into_iter().map(|n| n.event_type).collect();
        assert_eq!(
            seen,
            vec![
                "quotation.created",
                "quotation.approved",
                "sale.created",
                "quotation.completed"
            ]
        );
    }

    #[test]
    fn completed_quotation_cannot_be_cancelled() {
        let h = harness();
        let item = h.stock("LAMP", None, 4, 25);
        let customer = Actor::customer(UserId::new());
        let id = h.approved_quote(&customer, &[(item, 2, 25)], None);
        h.quotations.convert(id, &customer).unwrap();

        let err = h.quotations.cancel(id, &customer, Some("too late")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        let err = h.quotations.cancel(id, &h.admin, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let quotation = h.quotations.get(id).unwrap();
        assert_eq!(quotation.status(), QuotationStatus::Completed);
        assert!(quotation.cancellation_request().is_none());
        assert_eq!(h.quantity(item), 2);
    }

    #[test]
    fn failed_delivery_restores_every_line_and_discards_the_sale() {
        let h = harness();
        let plenty = h.stock("CABLE", None, 10, 3);
        let scarce = h.stock("PLUG", None, 1, 4);
        let customer = Actor::customer(UserId::new());
        let driver = Actor::delivery(UserId::new());
        let id = h.approved_quote(&customer, &[(plenty, 3, 3), (scarce, 2, 4)], None);

        let err = h.quotations.deliver(id, &driver).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        assert_eq!(h.quantity(plenty), 10);
        assert_eq!(h.quantity(scarce), 1);
        assert_eq!(h.quotations.get(id).unwrap().status(), QuotationStatus::Approved);

        let sales = h.all_sales();
        assert_eq!(sales.len(), 1);
        assert!(sales[0].is_discarded());
    }

    #[test]
    fn concurrent_deliveries_never_oversell() {
        let h = harness();
        let item = h.stock("LAST", None, 5, 8);
        let first = h.approved_quote(&Actor::customer(UserId::new()), &[(item, 5, 8)], None);
        let second = h.approved_quote(&Actor::customer(UserId::new()), &[(item, 5, 8)], None);

        let barrier = Barrier::new(2);
        let (barrier, h) = (&barrier, &h);
        let (a, b) = thread::scope(|s| {
            let deliver = move |id: QuotationId| {
                s.spawn(move || {
                    barrier.wait();
                    h.quotations.deliver(id, &Actor::delivery(UserId::new()))
                })
            };
            let a = deliver(first);
            let b = deliver(second);
            (a.join().unwrap(), b.join().unwrap())
        });

        let (winner, loser, err) = match (a, b) {
            (Ok(_), Err(err)) => (first, second, err),
            (Err(err), Ok(_)) => (second, first, err),
            other => panic!("expected exactly one delivery to succeed: {other:?}"),
        };
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        assert_eq!(h.quantity(item), 0);
        assert_eq!(h.quotations.get(winner).unwrap().status(), QuotationStatus::Completed);
        assert_eq!(h.quotations.get(loser).unwrap().status(), QuotationStatus::Approved);
        assert_eq!(h.live_sales().len(), 1);
        assert_eq!(h.all_sales().len(), 2);
    }

    #[test]
    fn same_quotation_delivered_twice_takes_stock_once() {
        let h = harness();
        let item = h.stock("DESK", None, 10, 120);
        let id = h.approved_quote(&Actor::customer(UserId::new()), &[(item, 3, 120)], None);

        let barrier = Barrier::new(2);
        let (barrier, h) = (&barrier, &h);
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        h.quotations.deliver(id, &Actor::delivery(UserId::new()))
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(
                    err.kind(),
                    ErrorKind::ConcurrentModification | ErrorKind::InvalidTransition
                ),
                "unexpected error: {err}"
            );
        }

        assert_eq!(h.quantity(item), 7);
        assert_eq!(h.live_sales().len(), 1);
        assert_eq!(h.quotations.get(id).unwrap().status(), QuotationStatus::Completed);
    }

    #[test]
    fn delivery_racing_a_cancellation_request_has_one_winner() {
        let h = harness();
        let item = h.stock("CHAIR", None, 10, 40);
        let customer = Actor::customer(UserId::new());
        let id = h.approved_quote(&customer, &[(item, 4, 40)], None);

        let barrier = Barrier::new(2);
        let (delivered, cancelled) = thread::scope(|s| {
            let deliver = s.spawn(|| {
                barrier.wait();
                h.quotations.deliver(id, &Actor::delivery(UserId::new()))
            });
            let cancel = s.spawn(|| {
                barrier.wait();
                h.quotations.cancel(id, &customer, Some("found it cheaper"))
            });
            (deliver.join().unwrap(), cancel.join().unwrap())
        });

        let quotation = h.quotations.get(id).unwrap();
        match (delivered, cancelled) {
            (Ok(_), Err(err)) => {
                assert_eq!(err.kind(), ErrorKind::InvalidTransition);
                assert_eq!(quotation.status(), QuotationStatus::Completed);
                assert_eq!(h.quantity(item), 6);
                assert_eq!(h.live_sales().len(), 1);
            }
            (Err(_), Ok(_)) => {
                assert_eq!(quotation.status(), QuotationStatus::CancellationRequested);
                assert_eq!(h.quantity(item), 10);
                assert!(h.live_sales().is_empty());
            }
            other => panic!("expected exactly one winner: {other:?}"),
        }
    }

    #[test]
    fn cancelling_a_completed_legacy_quotation_restores_its_stock() {
        let h = harness();
        let item = h.stock("PRINTER", None, 7, 200);
        let customer = Actor::customer(UserId::new());

        // A stream written before completed quotations were locked against
        // cancellation: completed, then a cancellation requested on top.
        let quotation_id = QuotationId::new(AggregateId::new());
        let number = DocumentNumber::new(DocumentKind::Quotation, Period::of(Utc::now()), 900, 4);
        let items = QuotationItem::price_lines(&[NewQuotationItem {
            inventory_item_id: item,
            description: "printer".to_string(),
            quantity: 3,
            unit_price: 200,
        }])
        .unwrap();
        let totals = Totals::compute(&items, 0, 0).unwrap();
        h.ledger
            .adjust_quantity(item, -3, AdjustmentReason::Sale, Some(&number.to_string()))
            .unwrap();

        let now = Utc::now();
        let history = [
            QuotationEvent::QuotationCreated(QuotationCreated {
                quotation_id,
                quotation_number: number.clone(),
                customer_id: customer.id,
                created_by: customer.id,
                items,
                totals,
                status: QuotationStatus::Pending,
                occurred_at: now,
            }),
            QuotationEvent::QuotationApproved(QuotationApproved {
                quotation_id,
                approved_by: h.admin.id,
                assigned_delivery: None,
                occurred_at: now,
            }),
            QuotationEvent::QuotationCompleted(QuotationCompleted {
                quotation_id,
                completed_by: customer.id,
                via: CompletionMethod::Convert,
                sale_id: AggregateId::new(),
                sale_number: DocumentNumber::new(DocumentKind::Sale, Period::of(now), 900, 4),
                occurred_at: now,
            }),
            QuotationEvent::CancellationRequested(CancellationRequested {
                quotation_id,
                requested_by: customer.id,
                reason: Some("returned".to_string()),
                previous_status: QuotationStatus::Approved,
                occurred_at: now,
            }),
        ];
        let events = history
            .iter()
            .map(|e| {
                UncommittedEvent::from_typed(quotation_id.0, QUOTATION_AGGREGATE_TYPE, Uuid::now_v7(), e)
                    .unwrap()
            })
            .collect();
        h.ctx
            .dispatcher()
            .store()
            .append(events, ExpectedVersion::NoStream)
            .unwrap();
        assert_eq!(h.quantity(item), 4);

        let cancelled = h.quotations.approve_cancellation(quotation_id, &h.admin).unwrap();
        assert_eq!(cancelled.status(), QuotationStatus::Cancelled);
        assert!(!cancelled.stock_committed());
        assert_eq!(h.quantity(item), 7);

        let err = h.quotations.approve_cancellation(quotation_id, &h.admin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(h.quantity(item), 7);
    }

    #[test]
    fn terminal_quotations_reject_every_transition() {
        let h = harness();
        let item = h.stock("MUG", None, 10, 6);
        let customer = Actor::customer(UserId::new());
        let id = h.quote(&customer, &[(item, 2, 6)]);

        let cancelled = h.quotations.cancel(id, &customer, None).unwrap();
        assert_eq!(cancelled.status(), QuotationStatus::Cancelled);
        let version = h.ctx.dispatcher().store().load_stream(id.0).unwrap().len();

        let errors = [
            h.quotations.cancel(id, &customer, None).map(|_| ()),
            h.quotations.approve(id, &h.admin, None).map(|_| ()),
            h.quotations.convert(id, &customer).map(|_| ()),
            h.quotations.deliver(id, &Actor::delivery(UserId::new())).map(|_| ()),
            h.quotations.deny_cancellation(id, &h.admin).map(|_| ()),
        ];
        for result in errors {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidTransition);
        }

        assert_eq!(h.ctx.dispatcher().store().load_stream(id.0).unwrap().len(), version);
        assert_eq!(h.quantity(item), 10);
        assert!(h.all_sales().is_empty());
    }

    #[test]
    fn completion_is_reserved_to_the_assigned_driver_and_own_customer() {
        let h = harness();
        let item = h.stock("TABLE", None, 10, 90);
        let customer = Actor::customer(UserId::new());
        let assigned = Actor::delivery(UserId::new());
        let id = h.approved_quote(&customer, &[(item, 1, 90)], Some(assigned));

        let err = h.quotations.deliver(id, &Actor::delivery(UserId::new())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = h.quotations.convert(id, &Actor::customer(UserId::new())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = h.quotations.deliver(id, &h.admin).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(h.quantity(item), 10);

        let converted = h.quotations.convert(id, &customer).unwrap();
        assert_eq!(converted.sale.customer_id(), customer.id);
        assert_eq!(h.quantity(item), 9);
    }

    #[test]
    fn transfer_resumes_after_debit_landed_but_was_not_recorded() {
        let h = harness();
        let (from, to) = (BranchId::new(), BranchId::new());
        let source = h.stock("DRILL", Some(from), 10, 80);
        let (transfer_id, number) = h.pending_transfer(source, "DRILL", from, to, 4, 500);

        h.ledger
            .adjust_quantity(source, -4, AdjustmentReason::TransferOut, Some(&number))
            .unwrap();

        let report = h.transfers.resume_pending().unwrap();
        assert_eq!(report.completed, vec![transfer_id]);
        assert!(report.failed.is_empty());

        assert_eq!(h.quantity(source), 6);
        let destination = h.ledger.find("DRILL", Some(to)).unwrap().unwrap();
        assert_eq!(destination.quantity(), 4);

        let report = h.transfers.resume_pending().unwrap();
        assert!(report.completed.is_empty() && report.cancelled.is_empty());
        assert_eq!(h.quantity(source), 6);
    }

    #[test]
    fn transfer_resumes_after_destination_credit_landed_but_was_not_recorded() {
        let h = harness();
        let (from, to) = (BranchId::new(), BranchId::new());
        let source = h.stock("SAW", Some(from), 10, 30);
        let (transfer_id, number) = h.pending_transfer(source, "SAW", from, to, 4, 501);

        h.ledger
            .adjust_quantity(source, -4, AdjustmentReason::TransferOut, Some(&number))
            .unwrap();
        h.ctx
            .dispatcher()
            .dispatch_with_retry(
                transfer_id.0,
                TRANSFER_AGGREGATE_TYPE,
                &StockTransferCommand::RecordSourceDebit(RecordSourceDebit {
                    transfer_id,
                    occurred_at: Utc::now(),
                }),
                |id| StockTransfer::empty(StockTransferId(id)),
            )
            .unwrap();
        let template = h.ledger.get(source).unwrap();
        let (destination, _) = h.ledger.find_or_create_for_branch("SAW", to, &template).unwrap();
        h.ledger
            .adjust_quantity(destination.id_typed(), 4, AdjustmentReason::TransferIn, Some(&number))
            .unwrap();

        let resumed = h.transfers.resume(transfer_id).unwrap();
        assert_eq!(resumed.status(), TransferStatus::Completed);
        assert!(resumed.destination_credited());

        assert_eq!(h.quantity(source), 6);
        assert_eq!(h.quantity(destination.id_typed()), 4);
    }

    #[test]
    fn pending_transfer_beyond_available_stock_is_cancelled_on_resume() {
        let h = harness();
        let (from, to) = (BranchId::new(), BranchId::new());
        let source = h.stock("GLUE", Some(from), 10, 2);
        let (transfer_id, _) = h.pending_transfer(source, "GLUE", from, to, 50, 502);

        let report = h.transfers.resume_pending().unwrap();
        assert_eq!(report.cancelled, vec![transfer_id]);

        let transfer = h.transfers.get(transfer_id).unwrap();
        assert_eq!(transfer.status(), TransferStatus::Cancelled);
        assert!(!transfer.source_debited());
        assert!(transfer.cancel_reason().is_some());
        assert_eq!(h.quantity(source), 10);
        assert!(h.ledger.find("GLUE", Some(to)).unwrap().is_none());
    }

    #[test]
    fn transfers_conserve_quantity_across_branches() {
        let h = harness();
        let (a, b, c) = (BranchId::new(), BranchId::new(), BranchId::new());
        let at_a = h.stock("TAPE", Some(a), 20, 1);

        h.transfers.transfer(&h.admin, at_a, a, b, 5).unwrap();
        h.transfers.transfer(&h.admin, at_a, a, c, 7).unwrap();
        let at_b = h.ledger.find("TAPE", Some(b)).unwrap().unwrap().id_typed();
        h.transfers.transfer(&h.admin, at_b, b, c, 2).unwrap();

        let at_c = h.ledger.find("TAPE", Some(c)).unwrap().unwrap().id_typed();
        assert_eq!(h.quantity(at_a), 8);
        assert_eq!(h.quantity(at_b), 3);
        assert_eq!(h.quantity(at_c), 9);
        assert_eq!(h.quantity(at_a) + h.quantity(at_b) + h.quantity(at_c), 20);
    }

    #[test]
    fn over_receipt_is_flagged_and_still_accepted() {
        let h = harness();
        let item = h.stock("INK", None, 0, 15);
        let order = h
            .purchasing
            .create_order(
                &h.admin,
                "Ink Supplies Ltd",
                &[NewOrderLine {
                    inventory_item_id: item,
                    quantity: 5,
                    unit_cost: 7,
                }],
            )
            .unwrap();
        h.purchasing.approve_order(&h.admin, order.id_typed()).unwrap();

        let receiving = h
            .purchasing
            .receive(&h.admin, order.id_typed(), vec![ReceiptLine { line_no: 1, quantity: 8 }])
            .unwrap();

        assert!(receiving.has_over_receipt());
        assert_eq!(h.quantity(item), 8);
        let order = h.purchasing.get_order(order.id_typed()).unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Received);
        assert_eq!(order.line(1).unwrap().received_quantity, 8);
    }

    #[test]
    fn concurrent_numbering_hands_out_distinct_numbers() {
        let h = harness();
        let numbering = NumberingService::new(Arc::clone(&h.ctx));
        let numbering = &numbering;

        let numbers: Vec<DocumentNumber> = thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(move || {
                        (0..25)
                            .map(|_| numbering.next(DocumentKind::Sale).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        let distinct: HashSet<String> = numbers.iter().map(ToString::to_string).collect();
        assert_eq!(distinct.len(), 100);

        let mut sequences: Vec<u32> = numbers.iter().map(DocumentNumber::sequence).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=100).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn ledger_quantity_never_goes_negative(
            initial in 0i64..20,
            deltas in prop::collection::vec(-15i64..15, 1..30),
        ) {
            let h = harness();
            let item = h.stock("PROP", None, initial, 1);
            let mut expected = initial;

            for delta in deltas {
                match h.ledger.adjust_quantity(item, delta, AdjustmentReason::Manual, None) {
                    Ok(updated) => {
                        expected += delta;
                        prop_assert_eq!(updated.quantity(), expected);
                    }
                    Err(err) if delta == 0 => {
                        prop_assert_eq!(err.kind(), ErrorKind::Validation);
                    }
                    Err(err) => {
                        prop_assert_eq!(err.kind(), ErrorKind::InsufficientStock);
                        prop_assert!(expected + delta < 0);
                    }
                }
                prop_assert!(h.quantity(item) >= 0);
            }
            prop_assert_eq!(h.quantity(item), expected);
        }
    }
}

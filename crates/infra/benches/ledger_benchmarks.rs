use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use quoteflow_auth::Actor;
use quoteflow_core::{DocumentKind, UserId};
use quoteflow_infra::context::{InMemoryBus, InMemoryStore};
use quoteflow_infra::{
    InMemoryContext, InventoryLedger, NewItem, NewQuotation, NumberingService, QuotationService,
};
use quoteflow_inventory::{AdjustmentReason, InventoryItemId};
use quoteflow_quotations::NewQuotationItem;

fn new_item(code: &str, quantity: i64) -> NewItem {
    NewItem {
        item_code: code.to_string(),
        barcode: None,
        branch_id: None,
        name: code.to_lowercase(),
        unit: "pcs".to_string(),
        cost: 50,
        price: 100,
        initial_quantity: quantity,
    }
}

fn seeded_item(
    ledger: &InventoryLedger<InMemoryStore, InMemoryBus>,
    admin: &Actor,
    code: &str,
    history: usize,
) -> InventoryItemId {
    let item_id = ledger.create_item(admin, new_item(code, 1_000_000)).unwrap().id_typed();
    for _ in 0..history {
        ledger
            .adjust_quantity(item_id, -1, AdjustmentReason::Manual, None)
            .unwrap();
    }
    item_id
}

fn bench_ledger_adjustment_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_adjustment_latency");

    for history in [0usize, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("adjust_with_history", history),
            &history,
            |b, &history| {
                let ctx = Arc::new(InMemoryContext::in_memory_default());
                let ledger = InventoryLedger::new(Arc::clone(&ctx));
                let admin = Actor::admin(UserId::new());
                let item_id = seeded_item(&ledger, &admin, "BENCH", history);

                // Alternate signs so the stream grows but the level stays put.
                let mut delta = 1;
                b.iter(|| {
                    delta = -delta;
                    ledger
                        .adjust_quantity(black_box(item_id), delta, AdjustmentReason::Manual, None)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_numbering_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("numbering_throughput");
    group.throughput(Throughput::Elements(1));

    group.bench_function("next_sale_number", |b| {
        let ctx = Arc::new(InMemoryContext::in_memory_default());
        let numbering = NumberingService::new(ctx);
        b.iter(|| numbering.next(black_box(DocumentKind::Sale)).unwrap());
    });

    group.finish();
}

fn bench_quotation_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("quotation_delivery");

    for lines in [1usize, 10] {
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::new("create_approve_deliver", lines), &lines, |b, &lines| {
            let ctx = Arc::new(InMemoryContext::in_memory_default());
            let ledger = InventoryLedger::new(Arc::clone(&ctx));
            let quotations = QuotationService::new(Arc::clone(&ctx));
            let admin = Actor::admin(UserId::new());
            let customer = Actor::customer(UserId::new());
            let driver = Actor::delivery(UserId::new());

            let items: Vec<NewQuotationItem> = (0..lines)
                .map(|n| NewQuotationItem {
                    inventory_item_id: seeded_item(&ledger, &admin, &format!("SKU-{n}"), 0),
                    description: format!("line {n}"),
                    quantity: 1,
                    unit_price: 100,
                })
                .collect();

            b.iter(|| {
                let quotation = quotations
                    .create(
                        &customer,
                        NewQuotation {
                            customer_id: customer.id,
                            items: items.clone(),
                            tax_amount: 0,
                            discount_amount: 0,
                            as_draft: false,
                        },
                    )
                    .unwrap();
                let id = quotation.id_typed();
                quotations.approve(id, &admin, None).unwrap();
                black_box(quotations.deliver(id, &driver).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ledger_adjustment_latency,
    bench_numbering_throughput,
    bench_quotation_delivery
);
criterion_main!(benches);

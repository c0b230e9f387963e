use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use std::sync::Arc;
use washline_catalog::ServiceItemId;
use washline_clients::{
    Client, ClientCommand, ClientEvent, ClientId, ClientRegistered, ContactInfo, RecordTransaction,
    RegisterClient, TransactionRecorded,
};
use washline_core::{AggregateId, ExpectedVersion, ShopId};
use washline_events::{EventEnvelope, InMemoryEventBus};
use washline_infra::command_dispatcher::CommandDispatcher;
use washline_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use washline_infra::projections::{CLIENT_AGGREGATE_TYPE, ClientDirectoryProjection, ORDER_AGGREGATE_TYPE};
use washline_infra::read_model::InMemoryShopStore;
use washline_orders::{
    AdvanceStage, CheckItem, CreateOrder, LineItem, MarkDelivered, Order, OrderCommand, OrderId, Stage,
};

type Dispatcher = CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn setup() -> (Dispatcher, ShopId) {
    let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new()));
    (dispatcher, ShopId::new())
}

fn register(dispatcher: &Dispatcher, shop_id: ShopId, id: AggregateId) {
    let cmd = ClientCommand::RegisterClient(RegisterClient {
        shop_id,
        client_id: ClientId::new(id),
        name: black_box("Amina Yusuf".to_string()),
        contact: ContactInfo::default(),
        occurred_at: Utc::now(),
    });
    dispatcher
        .dispatch(shop_id, id, CLIENT_AGGREGATE_TYPE, cmd, |_, id| Client::empty(ClientId::new(id)))
        .unwrap();
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    group.bench_function("register_client_fresh", |b| {
        let (dispatcher, shop_id) = setup();
        b.iter(|| register(&dispatcher, shop_id, AggregateId::new()));
    });

    // Every iteration rehydrates the whole ledger, so latency grows with history.
    group.bench_function("record_transaction_with_history", |b| {
        let (dispatcher, shop_id) = setup();
        let id = AggregateId::new();
        register(&dispatcher, shop_id, id);

        b.iter(|| {
            let cmd = ClientCommand::RecordTransaction(RecordTransaction {
                shop_id,
                client_id: ClientId::new(id),
                amount: black_box(1_200),
                deposit: 200,
                memo: None,
                occurred_at: Utc::now(),
            });
            dispatcher
                .dispatch(shop_id, id, CLIENT_AGGREGATE_TYPE, cmd, |_, id| Client::empty(ClientId::new(id)))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1u32, 10, 100, 1000] {
        group.throughput(Throughput::Elements(u64::from(batch_size)));
        group.bench_with_input(BenchmarkId::new("batch_append", batch_size), &batch_size, |b, &size| {
            let store = InMemoryEventStore::new();
            let shop_id = ShopId::new();
            let id = AggregateId::new();

            b.iter(|| {
                let events: Vec<UncommittedEvent> = (1..=size)
                    .map(|i| {
                        let event = transaction(shop_id, id, i);
                        UncommittedEvent::from_typed(shop_id, id, CLIENT_AGGREGATE_TYPE, uuid::Uuid::now_v7(), &event)
                            .unwrap()
                    })
                    .collect();
                black_box(store.append(events, ExpectedVersion::Any).unwrap());
            });
        });
    }

    group.finish();
}

fn transaction(shop_id: ShopId, id: AggregateId, txn_no: u32) -> ClientEvent {
    ClientEvent::TransactionRecorded(TransactionRecorded {
        shop_id,
        client_id: ClientId::new(id),
        txn_no,
        amount: 500,
        deposit: 100,
        balance: 400,
        running_balance: 400 * i64::from(txn_no),
        memo: None,
        occurred_at: Utc::now(),
    })
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for event_count in [10u32, 100, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("client_directory_from_events", event_count),
            &event_count,
            |b, &count| {
                let store = InMemoryEventStore::new();
                let shop_id = ShopId::new();
                let id = AggregateId::new();

                let registered = ClientEvent::ClientRegistered(ClientRegistered {
                    shop_id,
                    client_id: ClientId::new(id),
                    name: "Amina Yusuf".to_string(),
                    contact: ContactInfo::default(),
                    occurred_at: Utc::now(),
                });
                let mut events = vec![
                    UncommittedEvent::from_typed(shop_id, id, CLIENT_AGGREGATE_TYPE, uuid::Uuid::now_v7(), &registered)
                        .unwrap(),
                ];
                for txn_no in 1..count {
                    let event = transaction(shop_id, id, txn_no);
                    events.push(
                        UncommittedEvent::from_typed(shop_id, id, CLIENT_AGGREGATE_TYPE, uuid::Uuid::now_v7(), &event)
                            .unwrap(),
                    );
                }
                let envelopes: Vec<_> = store
                    .append(events, ExpectedVersion::Exact(0))
                    .unwrap()
                    .iter()
                    .map(|e| e.to_envelope())
                    .collect();

                let projection = ClientDirectoryProjection::new(Arc::new(InMemoryShopStore::new()));
                b.iter(|| projection.rebuild_from_scratch(black_box(envelopes.clone())).unwrap());
            },
        );
    }

    group.finish();
}

/// Intake to hand-over: create, count and advance through every stage, deliver.
fn bench_order_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_pipeline");
    group.sample_size(200);

    group.bench_function("create_check_advance_deliver", |b| {
        let (dispatcher, shop_id) = setup();
        let client_id = ClientId::new(AggregateId::new());
        let item_id = ServiceItemId::new(AggregateId::new());
        let make = |_: ShopId, id: AggregateId| Order::empty(OrderId::new(id));

        b.iter(|| {
            let id = AggregateId::new();
            let order_id = OrderId::new(id);
            let create = OrderCommand::CreateOrder(CreateOrder {
                shop_id,
                order_id,
                client_id,
                lines: vec![LineItem {
                    item_id,
                    description: "Shirt".to_string(),
                    quantity: 3,
                    unit_price: 150,
                }],
                deposit: 450,
                promised_for: None,
                notes: None,
                occurred_at: Utc::now(),
            });
            dispatcher.dispatch(shop_id, id, ORDER_AGGREGATE_TYPE, create, make).unwrap();

            for stage in Stage::ALL {
                let check = OrderCommand::CheckItem(CheckItem {
                    shop_id,
                    order_id,
                    stage,
                    line_no: 1,
                    counted: 3,
                    occurred_at: Utc::now(),
                });
                dispatcher.dispatch(shop_id, id, ORDER_AGGREGATE_TYPE, check, make).unwrap();
                if stage == Stage::Delivery {
                    break;
                }
                let advance = OrderCommand::AdvanceStage(AdvanceStage {
                    shop_id,
                    order_id,
                    from: stage,
                    occurred_at: Utc::now(),
                });
                dispatcher.dispatch(shop_id, id, ORDER_AGGREGATE_TYPE, advance, make).unwrap();
            }

            let deliver = OrderCommand::MarkDelivered(MarkDelivered {
                shop_id,
                order_id,
                occurred_at: Utc::now(),
            });
            black_box(dispatcher.dispatch(shop_id, id, ORDER_AGGREGATE_TYPE, deliver, make).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_projection_rebuild_speed,
    bench_order_pipeline
);
criterion_main!(benches);

//! End-to-end pipeline tests.
//!
//! command -> event store -> event bus -> projections -> read models

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::Value as JsonValue;

    use washline_billing::{Bill, BillCommand, BillId, BillLine, IssueBill};
    use washline_catalog::ServiceItemId;
    use washline_clients::{Client, ClientCommand, ClientId, ContactInfo, RecordTransaction, RegisterClient};
    use washline_core::{AggregateId, ShopId};
    use washline_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
    use washline_orders::{
        AdvanceStage, CheckItem, CreateOrder, LineItem, Order, OrderCommand, OrderId, Stage,
    };

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::projections::{
        BILL_AGGREGATE_TYPE, CLIENT_AGGREGATE_TYPE, ClientDirectoryProjection, DueCustomersProjection,
        ORDER_AGGREGATE_TYPE, OrderBoardProjection,
    };
    use crate::read_model::InMemoryShopStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    struct Pipeline {
        dispatcher: CommandDispatcher<Arc<InMemoryEventStore>, Bus>,
        subscription: Subscription<EventEnvelope<JsonValue>>,
        clients: ClientDirectoryProjection<InMemoryShopStore<ClientId, crate::projections::ClientReadModel>>,
        orders: OrderBoardProjection<InMemoryShopStore<OrderId, crate::projections::OrderReadModel>>,
        due: DueCustomersProjection<InMemoryShopStore<ClientId, crate::projections::DueCustomer>>,
    }

    impl Pipeline {
        fn new() -> Self {
            let bus: Bus = Arc::new(InMemoryEventBus::new());
            let subscription = bus.subscribe();
            Self {
                dispatcher: CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), bus),
                subscription,
                clients: ClientDirectoryProjection::new(InMemoryShopStore::new()),
                orders: OrderBoardProjection::new(InMemoryShopStore::new()),
                due: DueCustomersProjection::new(InMemoryShopStore::new()),
            }
        }

        /// Feed everything published so far into the projections.
        fn pump(&self) {
            while let Ok(env) = self.subscription.try_recv() {
                self.clients.apply_envelope(&env).unwrap();
                self.orders.apply_envelope(&env).unwrap();
                self.due.apply_envelope(&env).unwrap();
            }
        }

        fn client(&self, shop_id: ShopId, name: &str) -> ClientId {
            let id = AggregateId::new();
            let cmd = ClientCommand::RegisterClient(RegisterClient {
                shop_id,
                client_id: ClientId::new(id),
                name: name.to_string(),
                contact: ContactInfo::default(),
                occurred_at: test_time(),
            });
            self.dispatcher
                .dispatch(shop_id, id, CLIENT_AGGREGATE_TYPE, cmd, |_, id| Client::empty(ClientId::new(id)))
                .unwrap();
            ClientId::new(id)
        }

        fn order(&self, shop_id: ShopId, client_id: ClientId, quantity: u32, unit_price: u64, deposit: u64) -> OrderId {
            let id = AggregateId::new();
            let cmd = OrderCommand::CreateOrder(CreateOrder {
                shop_id,
                order_id: OrderId::new(id),
                client_id,
                lines: vec![LineItem {
                    item_id: ServiceItemId::new(AggregateId::new()),
                    description: "Bedsheet".to_string(),
                    quantity,
                    unit_price,
                }],
                deposit,
                promised_for: None,
                notes: None,
                occurred_at: test_time(),
            });
            self.dispatcher
                .dispatch(shop_id, id, ORDER_AGGREGATE_TYPE, cmd, make_order)
                .unwrap();
            OrderId::new(id)
        }

        fn order_cmd(&self, shop_id: ShopId, order_id: OrderId, cmd: OrderCommand) -> Result<(), DispatchError> {
            self.dispatcher
                .dispatch(shop_id, order_id.0, ORDER_AGGREGATE_TYPE, cmd, make_order)
                .map(|_| ())
        }
    }

    fn make_order(_: ShopId, id: AggregateId) -> Order {
        Order::empty(OrderId::new(id))
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn check(shop_id: ShopId, order_id: OrderId, stage: Stage, counted: u32) -> OrderCommand {
        OrderCommand::CheckItem(CheckItem {
            shop_id,
            order_id,
            stage,
            line_no: 1,
            counted,
            occurred_at: test_time(),
        })
    }

    fn advance(shop_id: ShopId, order_id: OrderId, from: Stage) -> OrderCommand {
        OrderCommand::AdvanceStage(AdvanceStage {
            shop_id,
            order_id,
            from,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn order_moves_across_the_board_as_counts_match() {
        let p = Pipeline::new();
        let shop = ShopId::new();
        let client = p.client(shop, "Amina Yusuf");
        let order = p.order(shop, client, 4, 250, 0);
        p.pump();

        assert_eq!(p.orders.list_by_stage(shop, Stage::Entry).len(), 1);

        p.order_cmd(shop, order, check(shop, order, Stage::Entry, 3)).unwrap();
        let err = p.order_cmd(shop, order, advance(shop, order, Stage::Entry)).unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));

        p.order_cmd(shop, order, check(shop, order, Stage::Entry, 4)).unwrap();
        p.order_cmd(shop, order, advance(shop, order, Stage::Entry)).unwrap();
        p.pump();

        assert!(p.orders.list_by_stage(shop, Stage::Entry).is_empty());
        let rm = p.orders.get(shop, &order).unwrap();
        assert_eq!(rm.stage, Stage::Tagging);
        assert_eq!(rm.progress.checked, 0);
    }

    #[test]
    fn stale_advance_is_a_conflict() {
        let p = Pipeline::new();
        let shop = ShopId::new();
        let client = p.client(shop, "Brian");
        let order = p.order(shop, client, 1, 100, 0);

        p.order_cmd(shop, order, check(shop, order, Stage::Entry, 1)).unwrap();
        p.order_cmd(shop, order, advance(shop, order, Stage::Entry)).unwrap();
        let err = p.order_cmd(shop, order, advance(shop, order, Stage::Entry)).unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
    }

    #[test]
    fn due_customers_combine_ledger_orders_and_bills() {
        let p = Pipeline::new();
        let shop = ShopId::new();
        let client = p.client(shop, "Amina Yusuf");

        let txn = ClientCommand::RecordTransaction(RecordTransaction {
            shop_id: shop,
            client_id: client,
            amount: 500,
            deposit: 100,
            memo: Some("old balance".to_string()),
            occurred_at: test_time(),
        });
        p.dispatcher
            .dispatch(shop, client.0, CLIENT_AGGREGATE_TYPE, txn, |_, id| Client::empty(ClientId::new(id)))
            .unwrap();
        p.order(shop, client, 2, 300, 200);

        let bill_id = AggregateId::new();
        let issue = BillCommand::IssueBill(IssueBill {
            shop_id: shop,
            bill_id: BillId::new(bill_id),
            client_id: client,
            order_id: None,
            lines: vec![BillLine {
                description: "Monthly service".to_string(),
                quantity: 1,
                unit_price: 1000,
            }],
            due_date: test_time(),
            occurred_at: test_time(),
        });
        p.dispatcher
            .dispatch(shop, bill_id, BILL_AGGREGATE_TYPE, issue, |_, id| Bill::empty(BillId::new(id)))
            .unwrap();
        p.pump();

        let due = p.due.list_due(shop);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].client_balance, 400);
        assert_eq!(due[0].unpaid_orders, 400);
        assert_eq!(due[0].unpaid_bills, 1000);
        assert_eq!(due[0].total_due, 1800);
        assert_eq!(p.clients.get(shop, &client).unwrap().balance, 400);
    }

    #[test]
    fn shops_do_not_see_each_other() {
        let p = Pipeline::new();
        let (a, b) = (ShopId::new(), ShopId::new());
        let client = p.client(a, "Amina");
        let order = p.order(a, client, 1, 100, 0);
        p.pump();

        assert!(p.clients.get(b, &client).is_none());
        assert!(p.orders.list(b).is_empty());

        // The stream belongs to shop `a`; addressing it from `b` finds nothing.
        let err = p.order_cmd(b, order, check(b, order, Stage::Entry, 1)).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
    }

    #[test]
    fn rejected_command_leaves_store_and_board_untouched() {
        let p = Pipeline::new();
        let shop = ShopId::new();
        let client = p.client(shop, "Amina");
        let order = p.order(shop, client, 2, 100, 0);
        p.pump();

        let err = p.order_cmd(shop, order, check(shop, order, Stage::Washing, 2)).unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
        p.pump();

        assert_eq!(p.dispatcher.store().load_stream(shop, order.0).unwrap().len(), 1);
        assert_eq!(p.orders.get(shop, &order).unwrap().progress.checked, 0);
    }

    #[test]
    fn rebuild_reproduces_live_read_models() {
        let p = Pipeline::new();
        let shop = ShopId::new();
        let client = p.client(shop, "Amina");
        let order = p.order(shop, client, 3, 120, 60);
        p.order_cmd(shop, order, check(shop, order, Stage::Entry, 3)).unwrap();
        p.order_cmd(shop, order, advance(shop, order, Stage::Entry)).unwrap();
        p.pump();

        let live = p.orders.get(shop, &order).unwrap();
        let log: Vec<_> = p
            .dispatcher
            .store()
            .load_all(shop)
            .unwrap()
            .iter()
            .map(|e| e.to_envelope())
            .collect();

        let rebuilt = OrderBoardProjection::new(InMemoryShopStore::new());
        rebuilt.rebuild_from_scratch(log).unwrap();
        assert_eq!(rebuilt.get(shop, &order).unwrap(), live);
    }
}

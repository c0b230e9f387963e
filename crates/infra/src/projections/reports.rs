//! Admin reporting: shop-wide totals and per-day activity buckets.
//!
//! Days are UTC calendar days of each event's `occurred_at`. "Billed" counts
//! issued bills and client ledger charges; "collected" counts order deposits,
//! order payments, bill payments and ledger deposits. A voided bill is taken
//! back out of the day it was issued, so the summary always equals the sum of
//! the daily buckets.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;

use washline_billing::BillEvent;
use washline_clients::ClientEvent;
use washline_core::{AggregateId, ShopId};
use washline_deliveries::DeliveryEvent;
use washline_events::EventEnvelope;
use washline_orders::{OrderEvent, OrderStatus, Stage};

use crate::projections::bills::BILL_AGGREGATE_TYPE;
use crate::projections::clients::CLIENT_AGGREGATE_TYPE;
use crate::projections::cursor::{
    CursorCheck, ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order, shops_of,
};
use crate::projections::deliveries::DELIVERY_AGGREGATE_TYPE;
use crate::projections::orders::ORDER_AGGREGATE_TYPE;
use crate::read_model::ShopStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShopSummary {
    pub orders_received: u64,
    pub orders_in_progress: u64,
    pub orders_delivered: u64,
    pub orders_cancelled: u64,
    /// In-progress orders per stage.
    pub orders_by_stage: BTreeMap<Stage, u64>,
    pub amount_ordered: u64,
    pub amount_billed: u64,
    pub amount_collected: u64,
    pub bills_issued: u64,
    pub bills_paid: u64,
    pub bills_voided: u64,
    pub deliveries_completed: u64,
    pub deliveries_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub orders_received: u64,
    pub orders_delivered: u64,
    pub orders_cancelled: u64,
    pub amount_ordered: u64,
    pub amount_billed: u64,
    pub amount_collected: u64,
    pub deliveries_completed: u64,
}

impl DailyReport {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            orders_received: 0,
            orders_delivered: 0,
            orders_cancelled: 0,
            amount_ordered: 0,
            amount_billed: 0,
            amount_collected: 0,
            deliveries_completed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct OrderPosition {
    stage: Stage,
    status: OrderStatus,
}

#[derive(Debug, Default)]
struct ShopState {
    summary: ShopSummary,
    orders: HashMap<AggregateId, OrderPosition>,
    /// Total and issue day of every bill.
    bill_totals: HashMap<AggregateId, (u64, NaiveDate)>,
}

impl ShopState {
    fn move_order(&mut self, id: AggregateId, next: OrderPosition) {
        let summary = &mut self.summary;
        if let Some(prev) = self.orders.insert(id, next) {
            if prev.status == OrderStatus::InProgress {
                summary.orders_in_progress = summary.orders_in_progress.saturating_sub(1);
                if let Some(n) = summary.orders_by_stage.get_mut(&prev.stage) {
                    *n = n.saturating_sub(1);
                }
            }
        }
        if next.status == OrderStatus::InProgress {
            summary.orders_in_progress += 1;
            *summary.orders_by_stage.entry(next.stage).or_default() += 1;
        }
    }
}

/// Shop summary and daily buckets.
#[derive(Debug)]
pub struct ReportsProjection<S>
where
    S: ShopStore<NaiveDate, DailyReport>,
{
    daily: S,
    cursors: StreamCursors,
    state: RwLock<HashMap<ShopId, ShopState>>,
}

impl<S> ReportsProjection<S>
where
    S: ShopStore<NaiveDate, DailyReport>,
{
    pub fn new(daily: S) -> Self {
        Self {
            daily,
            cursors: StreamCursors::new(),
            state: RwLock::new(HashMap::new()),
        }
    }

    pub fn summary(&self, shop_id: ShopId) -> ShopSummary {
        let mut summary = self
            .state
            .read()
            .ok()
            .and_then(|s| s.get(&shop_id).map(|st| st.summary.clone()))
            .unwrap_or_default();
        for stage in Stage::ALL {
            summary.orders_by_stage.entry(stage).or_default();
        }
        summary
    }

    /// One bucket per day in `from..=to`, zero-filled.
    pub fn daily(&self, shop_id: ShopId, from: NaiveDate, to: NaiveDate) -> Vec<DailyReport> {
        from.iter_days()
            .take_while(|d| *d <= to)
            .map(|d| self.daily.get(shop_id, &d).unwrap_or_else(|| DailyReport::empty(d)))
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != ORDER_AGGREGATE_TYPE
            && aggregate_type != BILL_AGGREGATE_TYPE
            && aggregate_type != DELIVERY_AGGREGATE_TYPE
            && aggregate_type != CLIENT_AGGREGATE_TYPE
        {
            return Ok(());
        }

        let shop_id = envelope.shop_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(shop_id, aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        match aggregate_type {
            ORDER_AGGREGATE_TYPE => self.apply_order(envelope, decode(envelope)?)?,
            BILL_AGGREGATE_TYPE => self.apply_bill(envelope, decode(envelope)?)?,
            CLIENT_AGGREGATE_TYPE => self.apply_client(envelope, decode(envelope)?)?,
            _ => self.apply_delivery(envelope, decode(envelope)?)?,
        }

        self.cursors.advance(shop_id, aggregate_id, seq);
        Ok(())
    }

    fn with_state(&self, shop_id: ShopId, f: impl FnOnce(&mut ShopState)) {
        if let Ok(mut state) = self.state.write() {
            f(state.entry(shop_id).or_default());
        }
    }

    fn bump_day(&self, shop_id: ShopId, date: NaiveDate, f: impl FnOnce(&mut DailyReport)) {
        let mut day = self
            .daily
            .get(shop_id, &date)
            .unwrap_or_else(|| DailyReport::empty(date));
        f(&mut day);
        self.daily.upsert(shop_id, date, day);
    }

    fn apply_order(&self, envelope: &EventEnvelope<JsonValue>, event: OrderEvent) -> Result<(), ProjectionError> {
        let shop_id = envelope.shop_id();
        let id = envelope.aggregate_id();
        match event {
            OrderEvent::OrderCreated(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                self.with_state(shop_id, |st| {
                    st.summary.orders_received += 1;
                    st.summary.amount_ordered = st.summary.amount_ordered.saturating_add(e.amount);
                    st.summary.amount_collected = st.summary.amount_collected.saturating_add(e.deposit);
                    st.move_order(id, OrderPosition { stage: Stage::Entry, status: OrderStatus::InProgress });
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| {
                    d.orders_received += 1;
                    d.amount_ordered = d.amount_ordered.saturating_add(e.amount);
                    d.amount_collected = d.amount_collected.saturating_add(e.deposit);
                });
            }
            OrderEvent::OrderLineAdded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                let added = e.line.amount().unwrap_or(0);
                self.with_state(shop_id, |st| {
                    st.summary.amount_ordered = st.summary.amount_ordered.saturating_add(added);
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| {
                    d.amount_ordered = d.amount_ordered.saturating_add(added);
                });
            }
            OrderEvent::StageAdvanced(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                self.with_state(shop_id, |st| {
                    st.move_order(id, OrderPosition { stage: e.to, status: OrderStatus::InProgress });
                });
            }
            OrderEvent::OrderPaymentRecorded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                self.with_state(shop_id, |st| {
                    st.summary.amount_collected = st.summary.amount_collected.saturating_add(e.amount);
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| {
                    d.amount_collected = d.amount_collected.saturating_add(e.amount);
                });
            }
            OrderEvent::OrderDelivered(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                self.with_state(shop_id, |st| {
                    st.summary.orders_delivered += 1;
                    st.move_order(id, OrderPosition { stage: Stage::Delivery, status: OrderStatus::Delivered });
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| d.orders_delivered += 1);
            }
            OrderEvent::OrderCancelled(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                self.with_state(shop_id, |st| {
                    st.summary.orders_cancelled += 1;
                    st.move_order(id, OrderPosition { stage: e.stage, status: OrderStatus::Cancelled });
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| d.orders_cancelled += 1);
            }
            OrderEvent::ItemChecked(e) => ensure_same_stream(envelope, e.shop_id, e.order_id.0)?,
            OrderEvent::ItemUnchecked(e) => ensure_same_stream(envelope, e.shop_id, e.order_id.0)?,
        }
        Ok(())
    }

    fn apply_bill(&self, envelope: &EventEnvelope<JsonValue>, event: BillEvent) -> Result<(), ProjectionError> {
        let shop_id = envelope.shop_id();
        let id = envelope.aggregate_id();
        match event {
            BillEvent::BillIssued(e) => {
                ensure_same_stream(envelope, e.shop_id, e.bill_id.0)?;
                self.with_state(shop_id, |st| {
                    st.summary.bills_issued += 1;
                    st.summary.amount_billed = st.summary.amount_billed.saturating_add(e.total_amount);
                    st.bill_totals.insert(id, (e.total_amount, e.occurred_at.date_naive()));
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| {
                    d.amount_billed = d.amount_billed.saturating_add(e.total_amount);
                });
            }
            BillEvent::BillPaymentRecorded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.bill_id.0)?;
                self.with_state(shop_id, |st| {
                    st.summary.amount_collected = st.summary.amount_collected.saturating_add(e.amount);
                    if st.bill_totals.get(&id).is_some_and(|(total, _)| e.new_total_paid >= *total) {
                        st.summary.bills_paid += 1;
                    }
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| {
                    d.amount_collected = d.amount_collected.saturating_add(e.amount);
                });
            }
            BillEvent::BillVoided(e) => {
                ensure_same_stream(envelope, e.shop_id, e.bill_id.0)?;
                let mut issued = None;
                self.with_state(shop_id, |st| {
                    st.summary.bills_voided += 1;
                    issued = st.bill_totals.get(&id).copied();
                    if let Some((total, _)) = issued {
                        st.summary.amount_billed = st.summary.amount_billed.saturating_sub(total);
                    }
                });
                if let Some((total, day)) = issued {
                    self.bump_day(shop_id, day, |d| {
                        d.amount_billed = d.amount_billed.saturating_sub(total);
                    });
                }
            }
        }
        Ok(())
    }

    fn apply_client(&self, envelope: &EventEnvelope<JsonValue>, event: ClientEvent) -> Result<(), ProjectionError> {
        let shop_id = envelope.shop_id();
        match event {
            ClientEvent::TransactionRecorded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.client_id.0)?;
                self.with_state(shop_id, |st| {
                    st.summary.amount_billed = st.summary.amount_billed.saturating_add(e.amount);
                    st.summary.amount_collected = st.summary.amount_collected.saturating_add(e.deposit);
                });
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| {
                    d.amount_billed = d.amount_billed.saturating_add(e.amount);
                    d.amount_collected = d.amount_collected.saturating_add(e.deposit);
                });
            }
            ClientEvent::ClientRegistered(e) => ensure_same_stream(envelope, e.shop_id, e.client_id.0)?,
            ClientEvent::ClientDetailsUpdated(e) => ensure_same_stream(envelope, e.shop_id, e.client_id.0)?,
            ClientEvent::ClientDeactivated(e) => ensure_same_stream(envelope, e.shop_id, e.client_id.0)?,
            ClientEvent::ClientReactivated(e) => ensure_same_stream(envelope, e.shop_id, e.client_id.0)?,
        }
        Ok(())
    }

    fn apply_delivery(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: DeliveryEvent,
    ) -> Result<(), ProjectionError> {
        let shop_id = envelope.shop_id();
        match event {
            DeliveryEvent::DeliveryCompleted(e) => {
                ensure_same_stream(envelope, e.shop_id, e.delivery_id.0)?;
                self.with_state(shop_id, |st| st.summary.deliveries_completed += 1);
                self.bump_day(shop_id, e.occurred_at.date_naive(), |d| d.deliveries_completed += 1);
            }
            DeliveryEvent::DeliveryFailed(e) => {
                ensure_same_stream(envelope, e.shop_id, e.delivery_id.0)?;
                self.with_state(shop_id, |st| st.summary.deliveries_failed += 1);
            }
            DeliveryEvent::DeliveryScheduled(e) => ensure_same_stream(envelope, e.shop_id, e.delivery_id.0)?,
            DeliveryEvent::CourierAssigned(e) => ensure_same_stream(envelope, e.shop_id, e.delivery_id.0)?,
            DeliveryEvent::DeliveryDispatched(e) => ensure_same_stream(envelope, e.shop_id, e.delivery_id.0)?,
            DeliveryEvent::DeliveryRescheduled(e) => ensure_same_stream(envelope, e.shop_id, e.delivery_id.0)?,
        }
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        for shop in shops_of(&envs) {
            self.daily.clear_shop(shop);
            self.cursors.clear_shop(shop);
            if let Ok(mut state) = self.state.write() {
                state.remove(&shop);
            }
        }
        replay_order(&mut envs);
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::{bill_issued, bill_paid, envelope, order_created, test_time};
    use crate::read_model::InMemoryShopStore;
    use chrono::Duration;
    use washline_billing::BillId;
    use washline_clients::ClientId;
    use washline_orders::{OrderCancelled, OrderDelivered, OrderId, OrderPaymentRecorded, StageAdvanced};

    fn ids() -> (OrderId, ClientId) {
        (OrderId::new(AggregateId::new()), ClientId::new(AggregateId::new()))
    }

    #[test]
    fn summary_counts_orders_by_stage_and_outcome() {
        let p = ReportsProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let (a, client) = ids();
        let (b, _) = ids();
        let (c, _) = ids();

        for id in [a, b, c] {
            let created = order_created(shop, id, client, &[(2, 500)], 100, test_time());
            p.apply_envelope(&envelope(shop, id.0, ORDER_AGGREGATE_TYPE, 1, &created)).unwrap();
        }
        let advanced = OrderEvent::StageAdvanced(StageAdvanced {
            shop_id: shop,
            order_id: b,
            from: Stage::Entry,
            to: Stage::Tagging,
            occurred_at: test_time(),
        });
        p.apply_envelope(&envelope(shop, b.0, ORDER_AGGREGATE_TYPE, 2, &advanced)).unwrap();
        let cancelled = OrderEvent::OrderCancelled(OrderCancelled {
            shop_id: shop,
            order_id: c,
            stage: Stage::Entry,
            reason: None,
            occurred_at: test_time(),
        });
        p.apply_envelope(&envelope(shop, c.0, ORDER_AGGREGATE_TYPE, 2, &cancelled)).unwrap();

        let s = p.summary(shop);
        assert_eq!(s.orders_received, 3);
        assert_eq!(s.orders_in_progress, 2);
        assert_eq!(s.orders_cancelled, 1);
        assert_eq!(s.orders_by_stage[&Stage::Entry], 1);
        assert_eq!(s.orders_by_stage[&Stage::Tagging], 1);
        assert_eq!(s.orders_by_stage[&Stage::Packing], 0);
        assert_eq!(s.amount_ordered, 3000);
        assert_eq!(s.amount_collected, 300);
    }

    #[test]
    fn delivered_orders_leave_the_pipeline() {
        let p = ReportsProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let (order, client) = ids();

        let created = order_created(shop, order, client, &[(1, 800)], 0, test_time());
        p.apply_envelope(&envelope(shop, order.0, ORDER_AGGREGATE_TYPE, 1, &created)).unwrap();
        let paid = OrderEvent::OrderPaymentRecorded(OrderPaymentRecorded {
            shop_id: shop,
            order_id: order,
            payment_no: 1,
            amount: 800,
            new_total_paid: 800,
            balance: 0,
            occurred_at: test_time(),
        });
        let delivered = OrderEvent::OrderDelivered(OrderDelivered {
            shop_id: shop,
            order_id: order,
            outstanding_balance: 0,
            occurred_at: test_time() + Duration::days(1),
        });
        p.apply_envelope(&envelope(shop, order.0, ORDER_AGGREGATE_TYPE, 2, &paid)).unwrap();
        p.apply_envelope(&envelope(shop, order.0, ORDER_AGGREGATE_TYPE, 3, &delivered)).unwrap();

        let s = p.summary(shop);
        assert_eq!(s.orders_in_progress, 0);
        assert_eq!(s.orders_delivered, 1);
        assert_eq!(s.orders_by_stage.values().sum::<u64>(), 0);

        let day = test_time().date_naive();
        let days = p.daily(shop, day, day + Duration::days(2));
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].orders_received, 1);
        assert_eq!(days[0].amount_collected, 800);
        assert_eq!(days[1].orders_delivered, 1);
        assert_eq!(days[2], DailyReport::empty(day + Duration::days(2)));
    }

    #[test]
    fn voided_bills_are_not_billed() {
        let p = ReportsProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let client = ClientId::new(AggregateId::new());
        let (paid, voided) = (BillId::new(AggregateId::new()), BillId::new(AggregateId::new()));

        p.apply_envelope(&envelope(shop, paid.0, BILL_AGGREGATE_TYPE, 1, &bill_issued(shop, paid, client, 1200)))
            .unwrap();
        p.apply_envelope(&envelope(shop, paid.0, BILL_AGGREGATE_TYPE, 2, &bill_paid(shop, paid, 1, 1200, 1200)))
            .unwrap();
        p.apply_envelope(&envelope(shop, voided.0, BILL_AGGREGATE_TYPE, 1, &bill_issued(shop, voided, client, 700)))
            .unwrap();
        let void = BillEvent::BillVoided(washline_billing::BillVoided {
            shop_id: shop,
            bill_id: voided,
            reason: None,
            occurred_at: test_time(),
        });
        p.apply_envelope(&envelope(shop, voided.0, BILL_AGGREGATE_TYPE, 2, &void)).unwrap();

        let s = p.summary(shop);
        assert_eq!(s.bills_issued, 2);
        assert_eq!(s.bills_paid, 1);
        assert_eq!(s.bills_voided, 1);
        assert_eq!(s.amount_billed, 1200);
        assert_eq!(s.amount_collected, 1200);
    }

    #[test]
    fn summary_matches_the_sum_of_daily_buckets() {
        let p = ReportsProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let (order, client) = ids();
        let day0 = test_time();
        let (kept, voided) = (BillId::new(AggregateId::new()), BillId::new(AggregateId::new()));

        let created = order_created(shop, order, client, &[(3, 500)], 500, day0);
        p.apply_envelope(&envelope(shop, order.0, ORDER_AGGREGATE_TYPE, 1, &created)).unwrap();
        let paid = OrderEvent::OrderPaymentRecorded(OrderPaymentRecorded {
            shop_id: shop,
            order_id: order,
            payment_no: 1,
            amount: 400,
            new_total_paid: 900,
            balance: 600,
            occurred_at: day0 + Duration::days(1),
        });
        p.apply_envelope(&envelope(shop, order.0, ORDER_AGGREGATE_TYPE, 2, &paid)).unwrap();

        // Ledger charge of 800 with 300 paid up front.
        let txn = ClientEvent::TransactionRecorded(washline_clients::TransactionRecorded {
            shop_id: shop,
            client_id: client,
            txn_no: 1,
            amount: 800,
            deposit: 300,
            balance: 500,
            running_balance: 500,
            memo: Some("curtains".to_string()),
            occurred_at: day0 + Duration::days(1),
        });
        let registered = ClientEvent::ClientRegistered(washline_clients::ClientRegistered {
            shop_id: shop,
            client_id: client,
            name: "Amina Yusuf".to_string(),
            contact: washline_clients::ContactInfo::default(),
            occurred_at: day0,
        });
        p.apply_envelope(&envelope(shop, client.0, CLIENT_AGGREGATE_TYPE, 1, &registered)).unwrap();
        p.apply_envelope(&envelope(shop, client.0, CLIENT_AGGREGATE_TYPE, 2, &txn)).unwrap();

        p.apply_envelope(&envelope(shop, kept.0, BILL_AGGREGATE_TYPE, 1, &bill_issued(shop, kept, client, 1200)))
            .unwrap();
        p.apply_envelope(&envelope(shop, kept.0, BILL_AGGREGATE_TYPE, 2, &bill_paid(shop, kept, 1, 200, 200)))
            .unwrap();
        p.apply_envelope(&envelope(shop, voided.0, BILL_AGGREGATE_TYPE, 1, &bill_issued(shop, voided, client, 700)))
            .unwrap();
        let void = BillEvent::BillVoided(washline_billing::BillVoided {
            shop_id: shop,
            bill_id: voided,
            reason: None,
            occurred_at: day0 + Duration::days(2),
        });
        p.apply_envelope(&envelope(shop, voided.0, BILL_AGGREGATE_TYPE, 2, &void)).unwrap();

        let s = p.summary(shop);
        assert_eq!(s.amount_ordered, 1500);
        assert_eq!(s.amount_billed, 1200 + 800);
        assert_eq!(s.amount_collected, 500 + 400 + 300 + 200);

        let start = day0.date_naive();
        let days = p.daily(shop, start, start + Duration::days(2));
        assert_eq!(days[0].amount_billed, 1200);
        assert_eq!(days[1].amount_billed, 800);
        assert_eq!(days[2].amount_billed, 0);
        assert_eq!(days.iter().map(|d| d.amount_ordered).sum::<u64>(), s.amount_ordered);
        assert_eq!(days.iter().map(|d| d.amount_billed).sum::<u64>(), s.amount_billed);
        assert_eq!(days.iter().map(|d| d.amount_collected).sum::<u64>(), s.amount_collected);
        assert_eq!(days.iter().map(|d| d.orders_received).sum::<u64>(), s.orders_received);
    }

    #[test]
    fn inverted_range_is_empty() {
        let p = ReportsProjection::new(InMemoryShopStore::new());
        let day = test_time().date_naive();
        assert!(p.daily(ShopId::new(), day + Duration::days(1), day).is_empty());
    }
}

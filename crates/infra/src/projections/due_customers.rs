//! Due customers: who owes the shop money, and how much.
//!
//! A client's total due is their ledger balance plus the outstanding amount of
//! every unpaid bill plus the unpaid balance of every non-cancelled order. A
//! negative ledger balance is credit and offsets the rest. Clients are "due"
//! while the total is above zero.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value as JsonValue;

use washline_billing::BillEvent;
use washline_clients::{ClientEvent, ClientId};
use washline_core::{AggregateId, ShopId};
use washline_events::EventEnvelope;
use washline_orders::OrderEvent;

use crate::projections::bills::BILL_AGGREGATE_TYPE;
use crate::projections::clients::CLIENT_AGGREGATE_TYPE;
use crate::projections::cursor::{
    CursorCheck, ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order, shops_of,
};
use crate::projections::orders::ORDER_AGGREGATE_TYPE;
use crate::read_model::ShopStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueCustomer {
    pub client_id: ClientId,
    pub client_name: Option<String>,
    /// Ledger balance; negative means the client holds credit.
    pub client_balance: i64,
    pub unpaid_bills: u64,
    pub open_bill_count: u32,
    pub unpaid_orders: u64,
    pub open_order_count: u32,
    pub total_due: i64,
}

impl DueCustomer {
    fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            client_name: None,
            client_balance: 0,
            unpaid_bills: 0,
            open_bill_count: 0,
            unpaid_orders: 0,
            open_order_count: 0,
            total_due: 0,
        }
    }

    fn recompute(&mut self) {
        let owed = i64::try_from(self.unpaid_bills.saturating_add(self.unpaid_orders))
            .unwrap_or(i64::MAX);
        self.total_due = self.client_balance.saturating_add(owed);
    }
}

/// Outstanding amount of one bill or order, attributed to its client.
#[derive(Debug, Clone, Copy)]
struct Outstanding {
    client_id: ClientId,
    amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Bill,
    Order,
}

#[derive(Debug)]
pub struct DueCustomersProjection<S>
where
    S: ShopStore<ClientId, DueCustomer>,
{
    store: S,
    cursors: StreamCursors,
    outstanding: RwLock<HashMap<(ShopId, AggregateId), Outstanding>>,
}

impl<S> DueCustomersProjection<S>
where
    S: ShopStore<ClientId, DueCustomer>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
            outstanding: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, shop_id: ShopId, client_id: &ClientId) -> Option<DueCustomer> {
        self.store.get(shop_id, client_id)
    }

    /// Clients owing more than zero, largest debt first.
    pub fn list_due(&self, shop_id: ShopId) -> Vec<DueCustomer> {
        let mut due: Vec<_> = self
            .store
            .list(shop_id)
            .into_iter()
            .filter(|c| c.total_due > 0)
            .collect();
        due.sort_by(|a, b| {
            b.total_due
                .cmp(&a.total_due)
                .then_with(|| a.client_name.cmp(&b.client_name))
        });
        due
    }

    /// Sum of every positive `total_due` in the shop.
    pub fn total_receivable(&self, shop_id: ShopId) -> i64 {
        self.list_due(shop_id)
            .iter()
            .fold(0i64, |acc, c| acc.saturating_add(c.total_due))
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_type = envelope.aggregate_type();
        if aggregate_type != CLIENT_AGGREGATE_TYPE
            && aggregate_type != BILL_AGGREGATE_TYPE
            && aggregate_type != ORDER_AGGREGATE_TYPE
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
            CLIENT_AGGREGATE_TYPE => self.apply_client(envelope, decode(envelope)?)?,
            BILL_AGGREGATE_TYPE => self.apply_bill(envelope, decode(envelope)?)?,
            _ => self.apply_order(envelope, decode(envelope)?)?,
        }

        self.cursors.advance(shop_id, aggregate_id, seq);
        Ok(())
    }

    fn apply_client(
        &self,
        envelope: &EventEnvelope<JsonValue>,
        event: ClientEvent,
    ) -> Result<(), ProjectionError> {
        let shop_id = envelope.shop_id();
        match event {
            ClientEvent::ClientRegistered(e) => {
                ensure_same_stream(envelope, e.shop_id, e.client_id.0)?;
                self.update(shop_id, e.client_id, |c| c.client_name = Some(e.name));
            }
            ClientEvent::ClientDetailsUpdated(e) => {
                ensure_same_stream(envelope, e.shop_id, e.client_id.0)?;
                if let Some(name) = e.name {
                    self.update(shop_id, e.client_id, |c| c.client_name = Some(name));
                }
            }
            ClientEvent::TransactionRecorded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.client_id.0)?;
                self.update(shop_id, e.client_id, |c| c.client_balance = e.running_balance);
            }
            ClientEvent::ClientDeactivated(e) => {
                ensure_same_stream(envelope, e.shop_id, e.client_id.0)?;
            }
            ClientEvent::ClientReactivated(e) => {
                ensure_same_stream(envelope, e.shop_id, e.client_id.0)?;
            }
        }
        Ok(())
    }

    fn apply_bill(&self, envelope: &EventEnvelope<JsonValue>, event: BillEvent) -> Result<(), ProjectionError> {
        let shop_id = envelope.shop_id();
        match event {
            BillEvent::BillIssued(e) => {
                ensure_same_stream(envelope, e.shop_id, e.bill_id.0)?;
                self.track(shop_id, e.bill_id.0, e.client_id, e.total_amount, Source::Bill);
            }
            BillEvent::BillPaymentRecorded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.bill_id.0)?;
                self.set_outstanding(shop_id, e.bill_id.0, Source::Bill, |before| {
                    before.saturating_sub(e.amount)
                });
            }
            BillEvent::BillVoided(e) => {
                ensure_same_stream(envelope, e.shop_id, e.bill_id.0)?;
                self.set_outstanding(shop_id, e.bill_id.0, Source::Bill, |_| 0);
            }
        }
        Ok(())
    }

    fn apply_order(&self, envelope: &EventEnvelope<JsonValue>, event: OrderEvent) -> Result<(), ProjectionError> {
        let shop_id = envelope.shop_id();
        match event {
            OrderEvent::OrderCreated(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                let balance = e.amount.saturating_sub(e.deposit);
                self.track(shop_id, e.order_id.0, e.client_id, balance, Source::Order);
            }
            OrderEvent::OrderLineAdded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                let added = e.line.amount().unwrap_or(0);
                self.set_outstanding(shop_id, e.order_id.0, Source::Order, |before| {
                    before.saturating_add(added)
                });
            }
            OrderEvent::OrderPaymentRecorded(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                self.set_outstanding(shop_id, e.order_id.0, Source::Order, |_| e.balance);
            }
            OrderEvent::OrderCancelled(e) => {
                ensure_same_stream(envelope, e.shop_id, e.order_id.0)?;
                self.set_outstanding(shop_id, e.order_id.0, Source::Order, |_| 0);
            }
            OrderEvent::ItemChecked(e) => ensure_same_stream(envelope, e.shop_id, e.order_id.0)?,
            OrderEvent::ItemUnchecked(e) => ensure_same_stream(envelope, e.shop_id, e.order_id.0)?,
            OrderEvent::StageAdvanced(e) => ensure_same_stream(envelope, e.shop_id, e.order_id.0)?,
            OrderEvent::OrderDelivered(e) => ensure_same_stream(envelope, e.shop_id, e.order_id.0)?,
        }
        Ok(())
    }

    fn update(&self, shop_id: ShopId, client_id: ClientId, f: impl FnOnce(&mut DueCustomer)) {
        let mut record = self
            .store
            .get(shop_id, &client_id)
            .unwrap_or_else(|| DueCustomer::new(client_id));
        f(&mut record);
        record.recompute();
        self.store.upsert(shop_id, client_id, record);
    }

    fn track(&self, shop_id: ShopId, id: AggregateId, client_id: ClientId, amount: u64, source: Source) {
        if let Ok(mut map) = self.outstanding.write() {
            map.insert((shop_id, id), Outstanding { client_id, amount });
        }
        self.shift(shop_id, client_id, source, 0, amount);
    }

    /// Replace the outstanding amount of a tracked bill or order.
    fn set_outstanding(
        &self,
        shop_id: ShopId,
        id: AggregateId,
        source: Source,
        next: impl FnOnce(u64) -> u64,
    ) {
        let change = match self.outstanding.write() {
            Ok(mut map) => map.get_mut(&(shop_id, id)).map(|o| {
                let before = o.amount;
                o.amount = next(before);
                (o.client_id, before, o.amount)
            }),
            Err(_) => None,
        };
        if let Some((client_id, before, after)) = change {
            self.shift(shop_id, client_id, source, before, after);
        }
    }

    fn shift(&self, shop_id: ShopId, client_id: ClientId, source: Source, before: u64, after: u64) {
        self.update(shop_id, client_id, |c| {
            let (sum, count) = match source {
                Source::Bill => (&mut c.unpaid_bills, &mut c.open_bill_count),
                Source::Order => (&mut c.unpaid_orders, &mut c.open_order_count),
            };
            *sum = sum.saturating_sub(before).saturating_add(after);
            match (before > 0, after > 0) {
                (false, true) => *count += 1,
                (true, false) => *count = count.saturating_sub(1),
                _ => {}
            }
        });
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        for shop in shops_of(&envs) {
            self.store.clear_shop(shop);
            self.cursors.clear_shop(shop);
            if let Ok(mut map) = self.outstanding.write() {
                map.retain(|(s, _), _| *s != shop);
            }
        }
        replay_order(&mut envs);
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use washline_clients::ClientId;
use washline_core::ShopId;
use washline_events::EventEnvelope;
use washline_orders::{ChecklistProgress, OrderEvent, OrderId, OrderLine, OrderStatus, Stage, StageChecklist};

use crate::projections::cursor::{
    CursorCheck, ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order, shops_of,
};
use crate::read_model::ShopStore;

pub const ORDER_AGGREGATE_TYPE: &str = "orders.order";

/// Order as shown on the shop floor board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub lines: Vec<OrderLine>,
    pub stage: Stage,
    pub status: OrderStatus,
    pub amount: u64,
    pub deposit: u64,
    pub paid: u64,
    pub balance: u64,
    pub checklists: BTreeMap<Stage, StageChecklist>,
    /// Checklist progress of the current stage.
    pub progress: ChecklistProgress,
    pub promised_for: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub received_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl OrderReadModel {
    pub fn total_pieces(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// What the client still owes on this order; nothing once cancelled.
    pub fn unpaid_balance(&self) -> u64 {
        match self.status {
            OrderStatus::Cancelled => 0,
            _ => self.balance,
        }
    }

    fn refresh_progress(&mut self) {
        self.progress = self
            .checklists
            .get(&self.stage)
            .map(|c| c.progress(&self.lines))
            .unwrap_or(ChecklistProgress {
                total: self.lines.len(),
                checked: 0,
                matched: 0,
            });
    }
}

/// Order board: every order of a shop with its stage and checklist progress.
#[derive(Debug)]
pub struct OrderBoardProjection<S>
where
    S: ShopStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> OrderBoardProjection<S>
where
    S: ShopStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, shop_id: ShopId, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(shop_id, order_id)
    }

    /// Newest first.
    pub fn list(&self, shop_id: ShopId) -> Vec<OrderReadModel> {
        let mut orders = self.store.list(shop_id);
        orders.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        orders
    }

    /// In-progress orders waiting at `stage`, oldest first (work queue order).
    pub fn list_by_stage(&self, shop_id: ShopId, stage: Stage) -> Vec<OrderReadModel> {
        let mut orders: Vec<_> = self
            .store
            .list(shop_id)
            .into_iter()
            .filter(|o| o.status == OrderStatus::InProgress && o.stage == stage)
            .collect();
        orders.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        orders
    }

    pub fn list_for_client(&self, shop_id: ShopId, client_id: ClientId) -> Vec<OrderReadModel> {
        let mut orders: Vec<_> = self
            .store
            .list(shop_id)
            .into_iter()
            .filter(|o| o.client_id == client_id)
            .collect();
        orders.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        orders
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != ORDER_AGGREGATE_TYPE {
            return Ok(());
        }

        let shop_id = envelope.shop_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(shop_id, aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: OrderEvent = decode(envelope)?;
        let (event_shop, order_id) = match &event {
            OrderEvent::OrderCreated(e) => (e.shop_id, e.order_id),
            OrderEvent::OrderLineAdded(e) => (e.shop_id, e.order_id),
            OrderEvent::ItemChecked(e) => (e.shop_id, e.order_id),
            OrderEvent::ItemUnchecked(e) => (e.shop_id, e.order_id),
            OrderEvent::StageAdvanced(e) => (e.shop_id, e.order_id),
            OrderEvent::OrderPaymentRecorded(e) => (e.shop_id, e.order_id),
            OrderEvent::OrderDelivered(e) => (e.shop_id, e.order_id),
            OrderEvent::OrderCancelled(e) => (e.shop_id, e.order_id),
        };
        ensure_same_stream(envelope, event_shop, order_id.0)?;

        let mut rm = match event {
            OrderEvent::OrderCreated(e) => OrderReadModel {
                order_id,
                client_id: e.client_id,
                lines: e.lines,
                stage: Stage::Entry,
                status: OrderStatus::InProgress,
                amount: e.amount,
                deposit: e.deposit,
                paid: e.deposit,
                balance: e.amount.saturating_sub(e.deposit),
                checklists: BTreeMap::new(),
                progress: ChecklistProgress {
                    total: 0,
                    checked: 0,
                    matched: 0,
                },
                promised_for: e.promised_for,
                notes: e.notes,
                received_at: e.occurred_at,
                delivered_at: None,
                cancel_reason: None,
            },
            other => {
                // The cursor guarantees `OrderCreated` was applied first.
                let Some(mut rm) = self.store.get(shop_id, &order_id) else {
                    return Ok(());
                };
                match other {
                    OrderEvent::OrderLineAdded(e) => {
                        rm.lines.push(e.line);
                        rm.amount = e.new_amount;
                        rm.balance = rm.amount.saturating_sub(rm.paid);
                    }
                    OrderEvent::ItemChecked(e) => {
                        rm.checklists
                            .entry(e.stage)
                            .or_insert_with(|| StageChecklist::new(e.stage))
                            .check(e.line_no, e.counted);
                    }
                    OrderEvent::ItemUnchecked(e) => {
                        if let Some(c) = rm.checklists.get_mut(&e.stage) {
                            c.uncheck(e.line_no);
                        }
                    }
                    OrderEvent::StageAdvanced(e) => rm.stage = e.to,
                    OrderEvent::OrderPaymentRecorded(e) => {
                        rm.paid = e.new_total_paid;
                        rm.balance = e.balance;
                    }
                    OrderEvent::OrderDelivered(e) => {
                        rm.status = OrderStatus::Delivered;
                        rm.delivered_at = Some(e.occurred_at);
                    }
                    OrderEvent::OrderCancelled(e) => {
                        rm.status = OrderStatus::Cancelled;
                        rm.cancel_reason = e.reason;
                    }
                    OrderEvent::OrderCreated(_) => {}
                }
                rm
            }
        };

        rm.refresh_progress();
        self.store.upsert(shop_id, order_id, rm);
        self.cursors.advance(shop_id, aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        for shop in shops_of(&envs) {
            self.store.clear_shop(shop);
            self.cursors.clear_shop(shop);
        }
        replay_order(&mut envs);
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

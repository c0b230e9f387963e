use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use washline_billing::{BillEvent, BillId, BillLine, BillStatus, PaymentMethod};
use washline_clients::ClientId;
use washline_core::ShopId;
use washline_events::EventEnvelope;
use washline_orders::OrderId;

use crate::projections::cursor::{
    CursorCheck, ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order, shops_of,
};
use crate::read_model::ShopStore;

pub const BILL_AGGREGATE_TYPE: &str = "billing.bill";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillPaymentReadModel {
    pub payment_no: u32,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillReadModel {
    pub bill_id: BillId,
    pub client_id: ClientId,
    pub order_id: Option<OrderId>,
    pub lines: Vec<BillLine>,
    pub status: BillStatus,
    pub total_amount: u64,
    pub total_paid: u64,
    pub outstanding: u64,
    pub due_date: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub payments: Vec<BillPaymentReadModel>,
}

#[derive(Debug)]
pub struct BillsProjection<S>
where
    S: ShopStore<BillId, BillReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> BillsProjection<S>
where
    S: ShopStore<BillId, BillReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, shop_id: ShopId, bill_id: &BillId) -> Option<BillReadModel> {
        self.store.get(shop_id, bill_id)
    }

    /// Bills ordered by due date.
    pub fn list(&self, shop_id: ShopId) -> Vec<BillReadModel> {
        let mut bills = self.store.list(shop_id);
        bills.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        bills
    }

    /// Bills still awaiting money (open or partially paid).
    pub fn list_open(&self, shop_id: ShopId) -> Vec<BillReadModel> {
        self.list(shop_id)
            .into_iter()
            .filter(|b| b.outstanding > 0)
            .collect()
    }

    pub fn list_for_client(&self, shop_id: ShopId, client_id: ClientId) -> Vec<BillReadModel> {
        self.list(shop_id)
            .into_iter()
            .filter(|b| b.client_id == client_id)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != BILL_AGGREGATE_TYPE {
            return Ok(());
        }

        let shop_id = envelope.shop_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(shop_id, aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: BillEvent = decode(envelope)?;
        let (event_shop, bill_id) = match &event {
            BillEvent::BillIssued(e) => (e.shop_id, e.bill_id),
            BillEvent::BillPaymentRecorded(e) => (e.shop_id, e.bill_id),
            BillEvent::BillVoided(e) => (e.shop_id, e.bill_id),
        };
        ensure_same_stream(envelope, event_shop, bill_id.0)?;

        let rm = match event {
            BillEvent::BillIssued(e) => BillReadModel {
                bill_id,
                client_id: e.client_id,
                order_id: e.order_id,
                lines: e.lines,
                status: BillStatus::Open,
                total_amount: e.total_amount,
                total_paid: 0,
                outstanding: e.total_amount,
                due_date: e.due_date,
                issued_at: e.occurred_at,
                payments: Vec::new(),
            },
            BillEvent::BillPaymentRecorded(e) => {
                let Some(mut rm) = self.store.get(shop_id, &bill_id) else {
                    return Ok(());
                };
                rm.total_paid = e.new_total_paid;
                rm.outstanding = rm.total_amount.saturating_sub(rm.total_paid);
                rm.status = if rm.outstanding == 0 {
                    BillStatus::Paid
                } else {
                    BillStatus::PartiallyPaid
                };
                rm.payments.push(BillPaymentReadModel {
                    payment_no: e.payment_no,
                    amount: e.amount,
                    method: e.method,
                    reference: e.reference,
                    paid_at: e.occurred_at,
                });
                rm
            }
            BillEvent::BillVoided(_) => {
                let Some(mut rm) = self.store.get(shop_id, &bill_id) else {
                    return Ok(());
                };
                rm.status = BillStatus::Void;
                rm.outstanding = 0;
                rm
            }
        };

        self.store.upsert(shop_id, bill_id, rm);
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

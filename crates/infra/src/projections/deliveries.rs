use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use washline_clients::ClientId;
use washline_core::{ShopId, UserId};
use washline_deliveries::{DeliveryEvent, DeliveryId, DeliveryStatus};
use washline_events::EventEnvelope;
use washline_orders::OrderId;

use crate::projections::cursor::{
    CursorCheck, ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order, shops_of,
};
use crate::read_model::ShopStore;

pub const DELIVERY_AGGREGATE_TYPE: &str = "deliveries.delivery";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReadModel {
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub address: String,
    pub scheduled_for: DateTime<Utc>,
    pub courier: Option<UserId>,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub received_by: Option<String>,
    pub last_failure: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct DeliveriesProjection<S>
where
    S: ShopStore<DeliveryId, DeliveryReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> DeliveriesProjection<S>
where
    S: ShopStore<DeliveryId, DeliveryReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, shop_id: ShopId, delivery_id: &DeliveryId) -> Option<DeliveryReadModel> {
        self.store.get(shop_id, delivery_id)
    }

    /// By scheduled time.
    pub fn list(&self, shop_id: ShopId) -> Vec<DeliveryReadModel> {
        let mut deliveries = self.store.list(shop_id);
        deliveries.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        deliveries
    }

    /// A courier's run sheet: their deliveries that are not finished yet.
    pub fn list_for_courier(&self, shop_id: ShopId, courier: UserId) -> Vec<DeliveryReadModel> {
        self.list(shop_id)
            .into_iter()
            .filter(|d| d.courier == Some(courier) && d.status != DeliveryStatus::Delivered)
            .collect()
    }

    pub fn list_for_order(&self, shop_id: ShopId, order_id: OrderId) -> Vec<DeliveryReadModel> {
        self.list(shop_id)
            .into_iter()
            .filter(|d| d.order_id == order_id)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != DELIVERY_AGGREGATE_TYPE {
            return Ok(());
        }

        let shop_id = envelope.shop_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(shop_id, aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: DeliveryEvent = decode(envelope)?;
        let (event_shop, delivery_id) = match &event {
            DeliveryEvent::DeliveryScheduled(e) => (e.shop_id, e.delivery_id),
            DeliveryEvent::CourierAssigned(e) => (e.shop_id, e.delivery_id),
            DeliveryEvent::DeliveryDispatched(e) => (e.shop_id, e.delivery_id),
            DeliveryEvent::DeliveryCompleted(e) => (e.shop_id, e.delivery_id),
            DeliveryEvent::DeliveryFailed(e) => (e.shop_id, e.delivery_id),
            DeliveryEvent::DeliveryRescheduled(e) => (e.shop_id, e.delivery_id),
        };
        ensure_same_stream(envelope, event_shop, delivery_id.0)?;

        let rm = match event {
            DeliveryEvent::DeliveryScheduled(e) => DeliveryReadModel {
                delivery_id,
                order_id: e.order_id,
                client_id: e.client_id,
                address: e.address,
                scheduled_for: e.scheduled_for,
                courier: e.courier,
                status: DeliveryStatus::Scheduled,
                attempts: 0,
                received_by: None,
                last_failure: None,
                completed_at: None,
            },
            other => {
                let Some(mut rm) = self.store.get(shop_id, &delivery_id) else {
                    return Ok(());
                };
                match other {
                    DeliveryEvent::CourierAssigned(e) => rm.courier = Some(e.courier),
                    DeliveryEvent::DeliveryDispatched(e) => {
                        rm.status = DeliveryStatus::OutForDelivery;
                        rm.courier = Some(e.courier);
                        rm.attempts = e.attempt;
                    }
                    DeliveryEvent::DeliveryCompleted(e) => {
                        rm.status = DeliveryStatus::Delivered;
                        rm.received_by = e.received_by;
                        rm.completed_at = Some(e.occurred_at);
                    }
                    DeliveryEvent::DeliveryFailed(e) => {
                        rm.status = DeliveryStatus::Failed;
                        rm.last_failure = Some(e.reason);
                    }
                    DeliveryEvent::DeliveryRescheduled(e) => {
                        rm.status = DeliveryStatus::Scheduled;
                        rm.scheduled_for = e.scheduled_for;
                    }
                    DeliveryEvent::DeliveryScheduled(_) => {}
                }
                rm
            }
        };

        self.store.upsert(shop_id, delivery_id, rm);
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

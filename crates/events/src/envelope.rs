use serde::{Deserialize, Serialize};
use uuid::Uuid;

use washline_core::{AggregateId, ShopId};

/// A committed event together with its stream metadata.
///
/// `shop_id` is the isolation boundary; `sequence_number` starts at 1 and grows
/// by one per event within a `(shop_id, aggregate_id)` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    shop_id: ShopId,

    aggregate_id: AggregateId,
    aggregate_type: String,

    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        shop_id: ShopId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            shop_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Re-wrap the same metadata around a converted payload.
    pub fn map_payload<F, T>(self, f: F) -> EventEnvelope<T>
    where
        F: FnOnce(E) -> T,
    {
        EventEnvelope {
            event_id: self.event_id,
            shop_id: self.shop_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number: self.sequence_number,
            payload: f(self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_payload_keeps_stream_metadata() {
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            ShopId::new(),
            AggregateId::new(),
            "orders.order",
            7,
            "raw",
        );
        let mapped = env.clone().map_payload(|s| s.len());

        assert_eq!(mapped.event_id(), env.event_id());
        assert_eq!(mapped.shop_id(), env.shop_id());
        assert_eq!(mapped.aggregate_type(), "orders.order");
        assert_eq!(mapped.sequence_number(), 7);
        assert_eq!(*mapped.payload(), 3);
    }

    #[test]
    fn serializes_with_snake_case_fields() {
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            ShopId::new(),
            AggregateId::new(),
            "clients.client",
            1,
            serde_json::json!({"type": "registered"}),
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["aggregate_type"], "clients.client");
        assert_eq!(json["sequence_number"], 1);
        assert_eq!(json["payload"]["type"], "registered");
    }
}

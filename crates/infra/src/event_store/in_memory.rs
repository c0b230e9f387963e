use std::collections::HashMap;
use std::sync::RwLock;

use washline_core::{AggregateId, ExpectedVersion, ShopId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    shop_id: ShopId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<StreamKey, Vec<StoredEvent>>,
    /// Commit order per shop.
    log: HashMap<ShopId, Vec<StoredEvent>>,
}

/// In-memory append-only event store for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        validate_batch(&events)?;

        let shop_id = events[0].shop_id;
        let aggregate_type = events[0].aggregate_type.clone();
        let key = StreamKey {
            shop_id,
            aggregate_id: events[0].aggregate_id,
        };

        let mut inner = self
            .inner
            .write()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams.entry(key).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let shop_log = log.entry(shop_id).or_default();
        let mut committed = Vec::with_capacity(events.len());
        for (offset, e) in events.into_iter().enumerate() {
            let stored = StoredEvent {
                event_id: e.event_id,
                shop_id: e.shop_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: current + 1 + offset as u64,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            stream.push(stored.clone());
            shop_log.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(
        &self,
        shop_id: ShopId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey {
            shop_id,
            aggregate_id,
        };

        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.streams.get(&key).cloned().unwrap_or_default())
    }

    fn load_all(&self, shop_id: ShopId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| EventStoreError::Backend("lock poisoned".to_string()))?;

        Ok(inner.log.get(&shop_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn event(shop_id: ShopId, aggregate_id: AggregateId, aggregate_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            shop_id,
            aggregate_id,
            aggregate_type: aggregate_type.to_string(),
            event_type: "clients.client.registered".to_string(),
            event_version: 1,
            occurred_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            payload: json!({"n": 1}),
        }
    }

    #[test]
    fn assigns_contiguous_sequence_numbers() {
        let store = InMemoryEventStore::new();
        let shop = ShopId::new();
        let id = AggregateId::new();

        let first = store
            .append(
                vec![event(shop, id, "clients.client"), event(shop, id, "clients.client")],
                ExpectedVersion::Exact(0),
            )
            .unwrap();
        assert_eq!(
            first.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );

        let second = store
            .append(vec![event(shop, id, "clients.client")], ExpectedVersion::Exact(2))
            .unwrap();
        assert_eq!(second[0].sequence_number, 3);
        assert_eq!(store.load_stream(shop, id).unwrap().len(), 3);
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let shop = ShopId::new();
        let id = AggregateId::new();
        store
            .append(vec![event(shop, id, "clients.client")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(shop, id, "clients.client")], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn streams_are_isolated_per_shop() {
        let store = InMemoryEventStore::new();
        let (a, b) = (ShopId::new(), ShopId::new());
        let id = AggregateId::new();
        store
            .append(vec![event(a, id, "clients.client")], ExpectedVersion::Exact(0))
            .unwrap();

        assert!(store.load_stream(b, id).unwrap().is_empty());
        assert!(store.load_all(b).unwrap().is_empty());
        assert_eq!(store.load_all(a).unwrap().len(), 1);
    }

    #[test]
    fn mixed_shop_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();
        let err = store
            .append(
                vec![
                    event(ShopId::new(), id, "clients.client"),
                    event(ShopId::new(), id, "clients.client"),
                ],
                ExpectedVersion::Any,
            )
            .unwrap_err();
        assert!(matches!(err, EventStoreError::ShopIsolation(_)));
    }

    #[test]
    fn aggregate_type_of_a_stream_is_stable() {
        let store = InMemoryEventStore::new();
        let shop = ShopId::new();
        let id = AggregateId::new();
        store
            .append(vec![event(shop, id, "clients.client")], ExpectedVersion::Exact(0))
            .unwrap();

        let err = store
            .append(vec![event(shop, id, "orders.order")], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::AggregateTypeMismatch(_)));
    }

    #[test]
    fn load_all_keeps_commit_order_across_streams() {
        let store = InMemoryEventStore::new();
        let shop = ShopId::new();
        let (x, y) = (AggregateId::new(), AggregateId::new());
        store
            .append(vec![event(shop, x, "clients.client")], ExpectedVersion::Exact(0))
            .unwrap();
        store
            .append(vec![event(shop, y, "orders.order")], ExpectedVersion::Exact(0))
            .unwrap();
        store
            .append(vec![event(shop, x, "clients.client")], ExpectedVersion::Exact(1))
            .unwrap();

        let all = store.load_all(shop).unwrap();
        let order: Vec<_> = all.iter().map(|e| (e.aggregate_id, e.sequence_number)).collect();
        assert_eq!(order, vec![(x, 1), (y, 1), (x, 2)]);
    }
}

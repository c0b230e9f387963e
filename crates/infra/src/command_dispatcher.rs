//! Command execution pipeline.
//!
//! ```text
//! command
//!   -> load stream (shop-scoped)
//!   -> rehydrate aggregate
//!   -> handle (pure decision)
//!   -> append with ExpectedVersion::Exact(loaded version)
//!   -> publish committed envelopes
//! ```
//!
//! Nothing is published unless the append succeeded. A publish failure after a
//! successful append is reported, but the events stay committed; consumers
//! catch up on the next rebuild.
//!
//! Append and publish run under one commit lock, so subscribers see every
//! stream in sequence order even when commands race on the same aggregate.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use washline_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, ShopId};
use washline_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Stale stream version or a conflicting state transition.
    #[error("conflict: {0}")]
    Concurrency(String),

    #[error("shop isolation violation: {0}")]
    ShopIsolation(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    /// A stored payload no longer decodes into the aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    #[error(transparent)]
    Store(EventStoreError),

    /// The append succeeded but publication did not.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::ShopIsolation(msg) => DispatchError::ShopIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Runs commands against event-sourced aggregates over any store and bus.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    commit_lock: Mutex<()>,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Execute `command` against the aggregate `aggregate_id` of `shop_id`.
    ///
    /// `make_aggregate` builds the empty instance history is replayed onto, e.g.
    /// `|_, id| Order::empty(OrderId::new(id))`. Returns the committed events;
    /// an empty vector means the command was a no-op.
    pub fn dispatch<A>(
        &self,
        shop_id: ShopId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(ShopId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: washline_events::Event + Serialize + DeserializeOwned,
    {
        let history = self.store.load_stream(shop_id, aggregate_id)?;
        validate_loaded_stream(shop_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(shop_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;

        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    shop_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = {
            // The guard protects no data, so a poisoned lock is still usable.
            let _commit = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let committed = self.store.append(uncommitted, expected)?;
            for stored in &committed {
                self.bus
                    .publish(stored.to_envelope())
                    .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
            }
            committed
        };

        tracing::debug!(
            shop_id = %shop_id,
            aggregate_id = %aggregate_id,
            aggregate_type = %aggregate_type,
            events = committed.len(),
            "command committed"
        );

        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        shop_id: ShopId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(ShopId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(shop_id, aggregate_id)?;
        validate_loaded_stream(shop_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(shop_id, aggregate_id);
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Reject foreign or out-of-order events even if a backend returns them.
fn validate_loaded_stream(
    shop_id: ShopId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.shop_id != shop_id {
            return Err(DispatchError::ShopIsolation(format!(
                "loaded stream contains wrong shop_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::ShopIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;
    use washline_clients::{
        Client, ClientCommand, ClientId, ContactInfo, RecordTransaction, RegisterClient,
    };
    use washline_events::InMemoryEventBus;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap()
    }

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn register(shop_id: ShopId, id: AggregateId) -> ClientCommand {
        ClientCommand::RegisterClient(RegisterClient {
            shop_id,
            client_id: ClientId::new(id),
            name: "Amina Yusuf".to_string(),
            contact: ContactInfo::default(),
            occurred_at: test_time(),
        })
    }

    fn charge(shop_id: ShopId, id: AggregateId, amount: u64) -> ClientCommand {
        ClientCommand::RecordTransaction(RecordTransaction {
            shop_id,
            client_id: ClientId::new(id),
            amount,
            deposit: 0,
            memo: None,
            occurred_at: test_time(),
        })
    }

    fn make(_: ShopId, id: AggregateId) -> Client {
        Client::empty(ClientId::new(id))
    }

    #[test]
    fn dispatch_persists_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let shop = ShopId::new();
        let id = AggregateId::new();

        let committed = d
            .dispatch(shop, id, "clients.client", register(shop, id), make)
            .unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].event_type, "clients.client.registered");

        let env = sub.try_recv().unwrap();
        assert_eq!(env.shop_id(), shop);
        assert_eq!(env.sequence_number(), 1);
    }

    #[test]
    fn history_is_replayed_before_handling() {
        let d = dispatcher();
        let shop = ShopId::new();
        let id = AggregateId::new();

        d.dispatch(shop, id, "clients.client", register(shop, id), make).unwrap();
        d.dispatch(shop, id, "clients.client", charge(shop, id, 1500), make).unwrap();
        d.dispatch(shop, id, "clients.client", charge(shop, id, 500), make).unwrap();

        let client = d.load(shop, id, make).unwrap();
        assert_eq!(client.balance(), 2000);
        assert_eq!(client.ledger().len(), 2);
    }

    #[test]
    fn domain_rejection_appends_nothing() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let shop = ShopId::new();
        let id = AggregateId::new();

        let err = d
            .dispatch(shop, id, "clients.client", charge(shop, id, 100), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound));
        assert!(d.store().load_stream(shop, id).unwrap().is_empty());
        assert!(sub.try_recv().is_err());
    }

    #[test]
    fn duplicate_registration_is_a_conflict() {
        let d = dispatcher();
        let shop = ShopId::new();
        let id = AggregateId::new();

        d.dispatch(shop, id, "clients.client", register(shop, id), make).unwrap();
        let err = d
            .dispatch(shop, id, "clients.client", register(shop, id), make)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
    }

    #[test]
    fn streams_of_other_shops_are_invisible() {
        let d = dispatcher();
        let (a, b) = (ShopId::new(), ShopId::new());
        let id = AggregateId::new();

        d.dispatch(a, id, "clients.client", register(a, id), make).unwrap();
        let client = d.load(b, id, make).unwrap();
        assert!(!client.is_registered());
    }

    /// Holds the first armed append open after it is stored, so a second
    /// writer can race it to the bus.
    struct SlowAppendStore {
        inner: InMemoryEventStore,
        armed: std::sync::Mutex<Option<std::sync::mpsc::Sender<()>>>,
    }

    impl EventStore for SlowAppendStore {
        fn append(
            &self,
            events: Vec<UncommittedEvent>,
            expected_version: ExpectedVersion,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            let stored = self.inner.append(events, expected_version)?;
            let signal = self.armed.lock().unwrap().take();
            if let Some(tx) = signal {
                tx.send(()).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Ok(stored)
        }

        fn load_stream(
            &self,
            shop_id: ShopId,
            aggregate_id: AggregateId,
        ) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.load_stream(shop_id, aggregate_id)
        }

        fn load_all(&self, shop_id: ShopId) -> Result<Vec<StoredEvent>, EventStoreError> {
            self.inner.load_all(shop_id)
        }
    }

    #[test]
    fn racing_commands_publish_in_stream_order() {
        use crate::projections::{ClientDirectoryProjection, ClientReadModel};
        use crate::read_model::InMemoryShopStore;

        let d = CommandDispatcher::new(
            SlowAppendStore {
                inner: InMemoryEventStore::new(),
                armed: std::sync::Mutex::new(None),
            },
            Arc::new(InMemoryEventBus::<EventEnvelope<JsonValue>>::new()),
        );
        let sub = d.bus().subscribe();
        let shop = ShopId::new();
        let id = AggregateId::new();
        d.dispatch(shop, id, "clients.client", register(shop, id), make).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        *d.store().armed.lock().unwrap() = Some(tx);

        std::thread::scope(|s| {
            s.spawn(|| {
                d.dispatch(shop, id, "clients.client", charge(shop, id, 700), make)
                    .unwrap();
            });
            // Second charge starts while the first one sits between append and publish.
            rx.recv().unwrap();
            s.spawn(|| {
                d.dispatch(shop, id, "clients.client", charge(shop, id, 300), make)
                    .unwrap();
            });
        });

        let projection: ClientDirectoryProjection<InMemoryShopStore<ClientId, ClientReadModel>> =
            ClientDirectoryProjection::new(InMemoryShopStore::new());
        let mut seqs = Vec::new();
        while let Ok(env) = sub.try_recv() {
            seqs.push(env.sequence_number());
            projection.apply_envelope(&env).unwrap();
        }
        assert_eq!(seqs, vec![1, 2, 3]);

        let written = d.load(shop, id, make).unwrap();
        let read = projection.get(shop, &ClientId::new(id)).unwrap();
        assert_eq!(written.balance(), 1000);
        assert_eq!(read.balance, 1000);
        assert_eq!(read.ledger.len(), 2);
    }
}

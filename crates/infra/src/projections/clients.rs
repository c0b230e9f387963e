use serde::Serialize;
use serde_json::Value as JsonValue;

use washline_clients::{ClientEvent, ClientId, ClientStatus, ContactInfo, LedgerEntry};
use washline_core::ShopId;
use washline_events::EventEnvelope;

use crate::projections::cursor::{
    CursorCheck, ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order, shops_of,
};
use crate::read_model::ShopStore;

pub const CLIENT_AGGREGATE_TYPE: &str = "clients.client";

/// Client directory entry, including the transaction ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientReadModel {
    pub client_id: ClientId,
    pub name: String,
    pub contact: ContactInfo,
    pub status: ClientStatus,
    pub balance: i64,
    pub ledger: Vec<LedgerEntry>,
}

/// Client directory projection.
#[derive(Debug)]
pub struct ClientDirectoryProjection<S>
where
    S: ShopStore<ClientId, ClientReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ClientDirectoryProjection<S>
where
    S: ShopStore<ClientId, ClientReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, shop_id: ShopId, client_id: &ClientId) -> Option<ClientReadModel> {
        self.store.get(shop_id, client_id)
    }

    /// All clients of a shop, sorted by name.
    pub fn list(&self, shop_id: ShopId) -> Vec<ClientReadModel> {
        let mut clients = self.store.list(shop_id);
        clients.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        clients
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != CLIENT_AGGREGATE_TYPE {
            return Ok(());
        }

        let shop_id = envelope.shop_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(shop_id, aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: ClientEvent = decode(envelope)?;
        let (event_shop, client_id) = match &event {
            ClientEvent::ClientRegistered(e) => (e.shop_id, e.client_id),
            ClientEvent::ClientDetailsUpdated(e) => (e.shop_id, e.client_id),
            ClientEvent::TransactionRecorded(e) => (e.shop_id, e.client_id),
            ClientEvent::ClientDeactivated(e) => (e.shop_id, e.client_id),
            ClientEvent::ClientReactivated(e) => (e.shop_id, e.client_id),
        };
        ensure_same_stream(envelope, event_shop, client_id.0)?;

        let mut rm = self.store.get(shop_id, &client_id).unwrap_or(ClientReadModel {
            client_id,
            name: String::new(),
            contact: ContactInfo::default(),
            status: ClientStatus::Active,
            balance: 0,
            ledger: Vec::new(),
        });

        match event {
            ClientEvent::ClientRegistered(e) => {
                rm.name = e.name;
                rm.contact = e.contact;
                rm.status = ClientStatus::Active;
            }
            ClientEvent::ClientDetailsUpdated(e) => {
                if let Some(name) = e.name {
                    rm.name = name;
                }
                if let Some(contact) = e.contact {
                    rm.contact = contact;
                }
            }
            ClientEvent::TransactionRecorded(e) => {
                rm.balance = e.running_balance;
                rm.ledger.push(LedgerEntry {
                    txn_no: e.txn_no,
                    amount: e.amount,
                    deposit: e.deposit,
                    balance: e.balance,
                    running_balance: e.running_balance,
                    memo: e.memo,
                    occurred_at: e.occurred_at,
                });
            }
            ClientEvent::ClientDeactivated(_) => rm.status = ClientStatus::Inactive,
            ClientEvent::ClientReactivated(_) => rm.status = ClientStatus::Active,
        }

        self.store.upsert(shop_id, client_id, rm);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::{envelope, test_time};
    use crate::read_model::InMemoryShopStore;
    use washline_clients::{ClientDeactivated, ClientRegistered, TransactionRecorded};
    use washline_core::AggregateId;

    fn registered(shop_id: ShopId, client_id: ClientId, name: &str) -> ClientEvent {
        ClientEvent::ClientRegistered(ClientRegistered {
            shop_id,
            client_id,
            name: name.to_string(),
            contact: ContactInfo {
                phone: Some("0700 111 222".to_string()),
                ..ContactInfo::default()
            },
            occurred_at: test_time(),
        })
    }

    fn txn(shop_id: ShopId, client_id: ClientId, txn_no: u32, amount: u64, deposit: u64, running: i64) -> ClientEvent {
        ClientEvent::TransactionRecorded(TransactionRecorded {
            shop_id,
            client_id,
            txn_no,
            amount,
            deposit,
            balance: amount as i64 - deposit as i64,
            running_balance: running,
            memo: None,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn builds_directory_with_ledger() {
        let p = ClientDirectoryProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let id = ClientId::new(AggregateId::new());

        p.apply_envelope(&envelope(shop, id.0, CLIENT_AGGREGATE_TYPE, 1, &registered(shop, id, "Grace")))
            .unwrap();
        p.apply_envelope(&envelope(shop, id.0, CLIENT_AGGREGATE_TYPE, 2, &txn(shop, id, 1, 3000, 1000, 2000)))
            .unwrap();

        let rm = p.get(shop, &id).unwrap();
        assert_eq!(rm.name, "Grace");
        assert_eq!(rm.balance, 2000);
        assert_eq!(rm.ledger.len(), 1);
        assert_eq!(rm.contact.phone.as_deref(), Some("0700 111 222"));
    }

    #[test]
    fn redelivered_envelope_is_ignored() {
        let p = ClientDirectoryProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let id = ClientId::new(AggregateId::new());
        let reg = envelope(shop, id.0, CLIENT_AGGREGATE_TYPE, 1, &registered(shop, id, "Grace"));
        let charge = envelope(shop, id.0, CLIENT_AGGREGATE_TYPE, 2, &txn(shop, id, 1, 500, 0, 500));

        p.apply_envelope(&reg).unwrap();
        p.apply_envelope(&charge).unwrap();
        p.apply_envelope(&charge).unwrap();

        assert_eq!(p.get(shop, &id).unwrap().ledger.len(), 1);
    }

    #[test]
    fn mismatched_shop_in_payload_is_rejected() {
        let p = ClientDirectoryProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let id = ClientId::new(AggregateId::new());
        let foreign = registered(ShopId::new(), id, "Grace");

        let err = p
            .apply_envelope(&envelope(shop, id.0, CLIENT_AGGREGATE_TYPE, 1, &foreign))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::ShopIsolation(_)));
    }

    #[test]
    fn rebuild_replays_into_a_clean_model() {
        let p = ClientDirectoryProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let id = ClientId::new(AggregateId::new());
        let deactivated = ClientEvent::ClientDeactivated(ClientDeactivated {
            shop_id: shop,
            client_id: id,
            reason: None,
            occurred_at: test_time(),
        });
        let envs = vec![
            envelope(shop, id.0, CLIENT_AGGREGATE_TYPE, 2, &deactivated),
            envelope(shop, id.0, CLIENT_AGGREGATE_TYPE, 1, &registered(shop, id, "Grace")),
        ];

        p.rebuild_from_scratch(envs.clone()).unwrap();
        p.rebuild_from_scratch(envs).unwrap();

        let rm = p.get(shop, &id).unwrap();
        assert_eq!(rm.status, ClientStatus::Inactive);
        assert_eq!(p.list(shop).len(), 1);
    }
}

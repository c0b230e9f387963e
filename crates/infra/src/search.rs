//! Shop-wide search over the read models.
//!
//! Case-insensitive substring match. Clients match on name, phone, email or
//! address; catalog items on name or category; orders on id, notes, line
//! descriptions or the name of a matching client.

use std::collections::HashSet;

use serde::Serialize;

use washline_catalog::ServiceItemId;
use washline_clients::ClientId;
use washline_core::ShopId;

use crate::projections::{
    CatalogItemReadModel, CatalogProjection, ClientDirectoryProjection, ClientReadModel,
    OrderBoardProjection, OrderReadModel,
};
use crate::read_model::ShopStore;
use washline_orders::OrderId;

/// Results per kind are capped at this many hits.
pub const MAX_HITS: usize = 25;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub clients: Vec<ClientReadModel>,
    pub items: Vec<CatalogItemReadModel>,
    pub orders: Vec<OrderReadModel>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.items.is_empty() && self.orders.is_empty()
    }
}

fn matches(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn client_matches(client: &ClientReadModel, needle: &str) -> bool {
    let contact = &client.contact;
    matches(&client.name, needle)
        || [&contact.phone, &contact.email, &contact.address]
            .into_iter()
            .flatten()
            .any(|v| matches(v, needle))
}

fn order_matches(order: &OrderReadModel, needle: &str, clients: &HashSet<ClientId>) -> bool {
    clients.contains(&order.client_id)
        || matches(&order.order_id.0.to_string(), needle)
        || order.notes.as_deref().is_some_and(|n| matches(n, needle))
        || order.lines.iter().any(|l| matches(&l.description, needle))
}

/// Run `query` against one shop's clients, catalog and orders.
///
/// A blank query returns nothing rather than everything.
pub fn search<C, I, O>(
    shop_id: ShopId,
    query: &str,
    clients: &ClientDirectoryProjection<C>,
    catalog: &CatalogProjection<I>,
    orders: &OrderBoardProjection<O>,
) -> SearchResults
where
    C: ShopStore<ClientId, ClientReadModel>,
    I: ShopStore<ServiceItemId, CatalogItemReadModel>,
    O: ShopStore<OrderId, OrderReadModel>,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return SearchResults::default();
    }

    let all_clients: Vec<_> = clients
        .list(shop_id)
        .into_iter()
        .filter(|c| client_matches(c, &needle))
        .collect();
    let matched_ids: HashSet<ClientId> = all_clients.iter().map(|c| c.client_id).collect();

    let items = catalog
        .list(shop_id, true)
        .into_iter()
        .filter(|i| matches(&i.name, &needle) || matches(&i.category, &needle))
        .take(MAX_HITS)
        .collect();

    let orders = orders
        .list(shop_id)
        .into_iter()
        .filter(|o| order_matches(o, &needle, &matched_ids))
        .take(MAX_HITS)
        .collect();

    SearchResults {
        clients: all_clients.into_iter().take(MAX_HITS).collect(),
        items,
        orders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::{envelope, order_created, test_time};
    use crate::projections::{CLIENT_AGGREGATE_TYPE, ORDER_AGGREGATE_TYPE, SERVICE_ITEM_AGGREGATE_TYPE};
    use crate::read_model::InMemoryShopStore;
    use washline_catalog::{ServiceItemAdded, ServiceItemEvent, ServiceKind, Unit};
    use washline_clients::{ClientEvent, ClientRegistered, ContactInfo};
    use washline_core::AggregateId;

    struct Fixture {
        shop: ShopId,
        clients: ClientDirectoryProjection<InMemoryShopStore<ClientId, ClientReadModel>>,
        catalog: CatalogProjection<InMemoryShopStore<ServiceItemId, CatalogItemReadModel>>,
        orders: OrderBoardProjection<InMemoryShopStore<OrderId, OrderReadModel>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                shop: ShopId::new(),
                clients: ClientDirectoryProjection::new(InMemoryShopStore::new()),
                catalog: CatalogProjection::new(InMemoryShopStore::new()),
                orders: OrderBoardProjection::new(InMemoryShopStore::new()),
            }
        }

        fn client(&self, name: &str, phone: &str) -> ClientId {
            let id = ClientId::new(AggregateId::new());
            let event = ClientEvent::ClientRegistered(ClientRegistered {
                shop_id: self.shop,
                client_id: id,
                name: name.to_string(),
                contact: ContactInfo {
                    phone: Some(phone.to_string()),
                    email: None,
                    address: None,
                },
                occurred_at: test_time(),
            });
            self.clients
                .apply_envelope(&envelope(self.shop, id.0, CLIENT_AGGREGATE_TYPE, 1, &event))
                .unwrap();
            id
        }

        fn item(&self, name: &str, category: &str) {
            let id = ServiceItemId::new(AggregateId::new());
            let event = ServiceItemEvent::ServiceItemAdded(ServiceItemAdded {
                shop_id: self.shop,
                item_id: id,
                name: name.to_string(),
                category: category.to_string(),
                service: ServiceKind::WashAndIron,
                unit: Unit::Piece,
                unit_price: 200,
                occurred_at: test_time(),
            });
            self.catalog
                .apply_envelope(&envelope(self.shop, id.0, SERVICE_ITEM_AGGREGATE_TYPE, 1, &event))
                .unwrap();
        }

        fn order(&self, client: ClientId) -> OrderId {
            let id = OrderId::new(AggregateId::new());
            let event = order_created(self.shop, id, client, &[(1, 100)], 0, test_time());
            self.orders
                .apply_envelope(&envelope(self.shop, id.0, ORDER_AGGREGATE_TYPE, 1, &event))
                .unwrap();
            id
        }

        fn run(&self, q: &str) -> SearchResults {
            search(self.shop, q, &self.clients, &self.catalog, &self.orders)
        }
    }

    #[test]
    fn finds_clients_case_insensitively_and_their_orders() {
        let f = Fixture::new();
        let amina = f.client("Amina Yusuf", "0700 111");
        let other = f.client("Brian Otieno", "0700 222");
        let order = f.order(amina);
        f.order(other);

        let hits = f.run("  aMiNa ");
        assert_eq!(hits.clients.len(), 1);
        assert_eq!(hits.clients[0].client_id, amina);
        assert_eq!(hits.orders.len(), 1);
        assert_eq!(hits.orders[0].order_id, order);

        assert_eq!(f.run("222").clients[0].client_id, other);
    }

    #[test]
    fn matches_catalog_by_category() {
        let f = Fixture::new();
        f.item("Suit two-piece", "Formal");
        f.item("Duvet", "Bedding");

        let hits = f.run("formal");
        assert_eq!(hits.items.len(), 1);
        assert_eq!(hits.items[0].name, "Suit two-piece");
        assert!(hits.clients.is_empty());
    }

    #[test]
    fn blank_query_returns_nothing() {
        let f = Fixture::new();
        f.client("Amina", "1");
        assert!(f.run("   ").is_empty());
    }

    #[test]
    fn other_shops_are_invisible() {
        let f = Fixture::new();
        f.client("Amina", "1");
        let hits = search(ShopId::new(), "amina", &f.clients, &f.catalog, &f.orders);
        assert!(hits.is_empty());
    }
}

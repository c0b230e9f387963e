use serde::Serialize;
use serde_json::Value as JsonValue;

use washline_catalog::{ServiceItemEvent, ServiceItemId, ServiceKind, Unit};
use washline_core::ShopId;
use washline_events::EventEnvelope;

use crate::projections::cursor::{
    CursorCheck, ProjectionError, StreamCursors, decode, ensure_same_stream, replay_order, shops_of,
};
use crate::read_model::ShopStore;

pub const SERVICE_ITEM_AGGREGATE_TYPE: &str = "catalog.item";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItemReadModel {
    pub item_id: ServiceItemId,
    pub name: String,
    pub category: String,
    pub service: ServiceKind,
    pub unit: Unit,
    pub unit_price: u64,
    pub retired: bool,
}

/// Price list of the shop.
#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: ShopStore<ServiceItemId, CatalogItemReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CatalogProjection<S>
where
    S: ShopStore<ServiceItemId, CatalogItemReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, shop_id: ShopId, item_id: &ServiceItemId) -> Option<CatalogItemReadModel> {
        self.store.get(shop_id, item_id)
    }

    /// Items sorted by category then name; retired items only when asked for.
    pub fn list(&self, shop_id: ShopId, include_retired: bool) -> Vec<CatalogItemReadModel> {
        let mut items: Vec<_> = self
            .store
            .list(shop_id)
            .into_iter()
            .filter(|i| include_retired || !i.retired)
            .collect();
        items.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        items
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != SERVICE_ITEM_AGGREGATE_TYPE {
            return Ok(());
        }

        let shop_id = envelope.shop_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(shop_id, aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let event: ServiceItemEvent = decode(envelope)?;
        let (event_shop, item_id) = match &event {
            ServiceItemEvent::ServiceItemAdded(e) => (e.shop_id, e.item_id),
            ServiceItemEvent::ServiceItemUpdated(e) => (e.shop_id, e.item_id),
            ServiceItemEvent::PriceChanged(e) => (e.shop_id, e.item_id),
            ServiceItemEvent::ServiceItemRetired(e) => (e.shop_id, e.item_id),
            ServiceItemEvent::ServiceItemRestored(e) => (e.shop_id, e.item_id),
        };
        ensure_same_stream(envelope, event_shop, item_id.0)?;

        match event {
            ServiceItemEvent::ServiceItemAdded(e) => {
                self.store.upsert(
                    shop_id,
                    item_id,
                    CatalogItemReadModel {
                        item_id,
                        name: e.name,
                        category: e.category,
                        service: e.service,
                        unit: e.unit,
                        unit_price: e.unit_price,
                        retired: false,
                    },
                );
            }
            other => {
                // The cursor guarantees `ServiceItemAdded` was applied first.
                let Some(mut rm) = self.store.get(shop_id, &item_id) else {
                    return Ok(());
                };
                match other {
                    ServiceItemEvent::ServiceItemUpdated(e) => {
                        if let Some(name) = e.name {
                            rm.name = name;
                        }
                        if let Some(category) = e.category {
                            rm.category = category;
                        }
                    }
                    ServiceItemEvent::PriceChanged(e) => rm.unit_price = e.new_price,
                    ServiceItemEvent::ServiceItemRetired(_) => rm.retired = true,
                    ServiceItemEvent::ServiceItemRestored(_) => rm.retired = false,
                    ServiceItemEvent::ServiceItemAdded(_) => {}
                }
                self.store.upsert(shop_id, item_id, rm);
            }
        }

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
    use washline_catalog::{PriceChanged, ServiceItemAdded, ServiceItemRetired};
    use washline_core::AggregateId;

    fn added(shop_id: ShopId, item_id: ServiceItemId, name: &str, category: &str) -> ServiceItemEvent {
        ServiceItemEvent::ServiceItemAdded(ServiceItemAdded {
            shop_id,
            item_id,
            name: name.to_string(),
            category: category.to_string(),
            service: ServiceKind::Wash,
            unit: Unit::Piece,
            unit_price: 250,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn tracks_price_and_retirement() {
        let p = CatalogProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        let id = ServiceItemId::new(AggregateId::new());

        p.apply_envelope(&envelope(shop, id.0, SERVICE_ITEM_AGGREGATE_TYPE, 1, &added(shop, id, "Shirt", "tops")))
            .unwrap();
        let repriced = ServiceItemEvent::PriceChanged(PriceChanged {
            shop_id: shop,
            item_id: id,
            old_price: 250,
            new_price: 300,
            occurred_at: test_time(),
        });
        p.apply_envelope(&envelope(shop, id.0, SERVICE_ITEM_AGGREGATE_TYPE, 2, &repriced))
            .unwrap();
        assert_eq!(p.get(shop, &id).unwrap().unit_price, 300);

        let retired = ServiceItemEvent::ServiceItemRetired(ServiceItemRetired {
            shop_id: shop,
            item_id: id,
            occurred_at: test_time(),
        });
        p.apply_envelope(&envelope(shop, id.0, SERVICE_ITEM_AGGREGATE_TYPE, 3, &retired))
            .unwrap();

        assert!(p.list(shop, false).is_empty());
        assert_eq!(p.list(shop, true).len(), 1);
    }

    #[test]
    fn list_is_sorted_by_category_then_name() {
        let p = CatalogProjection::new(InMemoryShopStore::new());
        let shop = ShopId::new();
        for (name, category) in [("Trousers", "bottoms"), ("Shirt", "tops"), ("Jeans", "bottoms")] {
            let id = ServiceItemId::new(AggregateId::new());
            p.apply_envelope(&envelope(shop, id.0, SERVICE_ITEM_AGGREGATE_TYPE, 1, &added(shop, id, name, category)))
                .unwrap();
        }

        let names: Vec<_> = p.list(shop, false).into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["Jeans", "Trousers", "Shirt"]);
    }
}

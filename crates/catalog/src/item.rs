use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use washline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopId};
use washline_events::Event;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceItemId(pub AggregateId);

impl ServiceItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ServiceItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What the shop does to the article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Wash,
    DryClean,
    Iron,
    WashAndIron,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Wash => "wash",
            ServiceKind::DryClean => "dry_clean",
            ServiceKind::Iron => "iron",
            ServiceKind::WashAndIron => "wash_and_iron",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wash" => Ok(ServiceKind::Wash),
            "dry_clean" => Ok(ServiceKind::DryClean),
            "iron" => Ok(ServiceKind::Iron),
            "wash_and_iron" => Ok(ServiceKind::WashAndIron),
            other => Err(DomainError::validation(format!("unknown service '{other}'"))),
        }
    }
}

/// Pricing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Piece,
    Kg,
    Pair,
}

/// Aggregate root: ServiceItem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceItem {
    id: ServiceItemId,
    shop_id: Option<ShopId>,
    name: String,
    category: String,
    service: ServiceKind,
    unit: Unit,
    unit_price: u64,
    retired: bool,
    version: u64,
    created: bool,
}

impl ServiceItem {
    pub fn empty(id: ServiceItemId) -> Self {
        Self {
            id,
            shop_id: None,
            name: String::new(),
            category: String::new(),
            service: ServiceKind::Wash,
            unit: Unit::Piece,
            unit_price: 0,
            retired: false,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ServiceItemId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}

impl AggregateRoot for ServiceItem {
    type Id = ServiceItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddServiceItem {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub name: String,
    pub category: String,
    pub service: ServiceKind,
    pub unit: Unit,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServiceItem {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePrice {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireServiceItem {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreServiceItem {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceItemCommand {
    AddServiceItem(AddServiceItem),
    UpdateServiceItem(UpdateServiceItem),
    ChangePrice(ChangePrice),
    RetireServiceItem(RetireServiceItem),
    RestoreServiceItem(RestoreServiceItem),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceItemAdded {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub name: String,
    pub category: String,
    pub service: ServiceKind,
    pub unit: Unit,
    pub unit_price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceItemUpdated {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChanged {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub old_price: u64,
    pub new_price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceItemRetired {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceItemRestored {
    pub shop_id: ShopId,
    pub item_id: ServiceItemId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceItemEvent {
    ServiceItemAdded(ServiceItemAdded),
    ServiceItemUpdated(ServiceItemUpdated),
    PriceChanged(PriceChanged),
    ServiceItemRetired(ServiceItemRetired),
    ServiceItemRestored(ServiceItemRestored),
}

impl Event for ServiceItemEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ServiceItemEvent::ServiceItemAdded(_) => "catalog.item.added",
            ServiceItemEvent::ServiceItemUpdated(_) => "catalog.item.updated",
            ServiceItemEvent::PriceChanged(_) => "catalog.item.price_changed",
            ServiceItemEvent::ServiceItemRetired(_) => "catalog.item.retired",
            ServiceItemEvent::ServiceItemRestored(_) => "catalog.item.restored",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ServiceItemEvent::ServiceItemAdded(e) => e.occurred_at,
            ServiceItemEvent::ServiceItemUpdated(e) => e.occurred_at,
            ServiceItemEvent::PriceChanged(e) => e.occurred_at,
            ServiceItemEvent::ServiceItemRetired(e) => e.occurred_at,
            ServiceItemEvent::ServiceItemRestored(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ServiceItem {
    type Command = ServiceItemCommand;
    type Event = ServiceItemEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ServiceItemEvent::ServiceItemAdded(e) => {
                self.id = e.item_id;
                self.shop_id = Some(e.shop_id);
                self.name = e.name.clone();
                self.category = e.category.clone();
                self.service = e.service;
                self.unit = e.unit;
                self.unit_price = e.unit_price;
                self.retired = false;
                self.created = true;
            }
            ServiceItemEvent::ServiceItemUpdated(e) => {
                if let Some(name) = &e.name {
                    self.name = name.clone();
                }
                if let Some(category) = &e.category {
                    self.category = category.clone();
                }
            }
            ServiceItemEvent::PriceChanged(e) => {
                self.unit_price = e.new_price;
            }
            ServiceItemEvent::ServiceItemRetired(_) => self.retired = true,
            ServiceItemEvent::ServiceItemRestored(_) => self.retired = false,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ServiceItemCommand::AddServiceItem(cmd) => self.handle_add(cmd),
            ServiceItemCommand::UpdateServiceItem(cmd) => self.handle_update(cmd),
            ServiceItemCommand::ChangePrice(cmd) => self.handle_change_price(cmd),
            ServiceItemCommand::RetireServiceItem(cmd) => self.handle_retire(cmd),
            ServiceItemCommand::RestoreServiceItem(cmd) => self.handle_restore(cmd),
        }
    }
}

impl ServiceItem {
    fn ensure_exists(&self, shop_id: ShopId, item_id: ServiceItemId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::invariant("shop mismatch"));
        }
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    fn handle_add(&self, cmd: &AddServiceItem) -> Result<Vec<ServiceItemEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("service item already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }

        Ok(vec![ServiceItemEvent::ServiceItemAdded(ServiceItemAdded {
            shop_id: cmd.shop_id,
            item_id: cmd.item_id,
            name: cmd.name.trim().to_string(),
            category: cmd.category.trim().to_string(),
            service: cmd.service,
            unit: cmd.unit,
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateServiceItem) -> Result<Vec<ServiceItemEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.item_id)?;

        if cmd.name.is_none() && cmd.category.is_none() {
            return Err(DomainError::validation("nothing to update"));
        }
        if matches!(&cmd.name, Some(n) if n.trim().is_empty()) {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![ServiceItemEvent::ServiceItemUpdated(ServiceItemUpdated {
            shop_id: cmd.shop_id,
            item_id: cmd.item_id,
            name: cmd.name.as_ref().map(|n| n.trim().to_string()),
            category: cmd.category.as_ref().map(|c| c.trim().to_string()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_price(&self, cmd: &ChangePrice) -> Result<Vec<ServiceItemEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.item_id)?;

        if self.retired {
            return Err(DomainError::invariant("cannot re-price a retired item"));
        }
        if cmd.unit_price == 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        if cmd.unit_price == self.unit_price {
            return Err(DomainError::conflict("price is unchanged"));
        }

        Ok(vec![ServiceItemEvent::PriceChanged(PriceChanged {
            shop_id: cmd.shop_id,
            item_id: cmd.item_id,
            old_price: self.unit_price,
            new_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_retire(&self, cmd: &RetireServiceItem) -> Result<Vec<ServiceItemEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.item_id)?;

        if self.retired {
            return Err(DomainError::conflict("service item is already retired"));
        }

        Ok(vec![ServiceItemEvent::ServiceItemRetired(ServiceItemRetired {
            shop_id: cmd.shop_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restore(&self, cmd: &RestoreServiceItem) -> Result<Vec<ServiceItemEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.item_id)?;

        if !self.retired {
            return Err(DomainError::conflict("service item is not retired"));
        }

        Ok(vec![ServiceItemEvent::ServiceItemRestored(ServiceItemRestored {
            shop_id: cmd.shop_id,
            item_id: cmd.item_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use washline_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn added(shop_id: ShopId, item_id: ServiceItemId) -> ServiceItem {
        let mut item = ServiceItem::empty(item_id);
        execute(
            &mut item,
            &ServiceItemCommand::AddServiceItem(AddServiceItem {
                shop_id,
                item_id,
                name: "Shirt".to_string(),
                category: "Tops".to_string(),
                service: ServiceKind::WashAndIron,
                unit: Unit::Piece,
                unit_price: 350,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        item
    }

    fn change_price(shop_id: ShopId, item_id: ServiceItemId, unit_price: u64) -> ServiceItemCommand {
        ServiceItemCommand::ChangePrice(ChangePrice {
            shop_id,
            item_id,
            unit_price,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn add_then_change_price_records_old_and_new() {
        let shop_id = ShopId::new();
        let item_id = ServiceItemId::new(AggregateId::new());
        let mut item = added(shop_id, item_id);

        let events = execute(&mut item, &change_price(shop_id, item_id, 400)).unwrap();
        match &events[0] {
            ServiceItemEvent::PriceChanged(e) => {
                assert_eq!(e.old_price, 350);
                assert_eq!(e.new_price, 400);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(item.unit_price(), 400);
        assert_eq!(item.version(), 2);
    }

    #[test]
    fn zero_price_is_rejected() {
        let item_id = ServiceItemId::new(AggregateId::new());
        let err = ServiceItem::empty(item_id)
            .handle(&ServiceItemCommand::AddServiceItem(AddServiceItem {
                shop_id: ShopId::new(),
                item_id,
                name: "Duvet".to_string(),
                category: "Bedding".to_string(),
                service: ServiceKind::Wash,
                unit: Unit::Piece,
                unit_price: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unchanged_price_is_a_conflict() {
        let shop_id = ShopId::new();
        let item_id = ServiceItemId::new(AggregateId::new());
        let item = added(shop_id, item_id);
        assert!(matches!(
            item.handle(&change_price(shop_id, item_id, 350)),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn retired_items_cannot_be_repriced_until_restored() {
        let shop_id = ShopId::new();
        let item_id = ServiceItemId::new(AggregateId::new());
        let mut item = added(shop_id, item_id);

        execute(
            &mut item,
            &ServiceItemCommand::RetireServiceItem(RetireServiceItem {
                shop_id,
                item_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(item.is_retired());

        let err = item.handle(&change_price(shop_id, item_id, 500)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("retired") => {}
            other => panic!("unexpected error: {other:?}"),
        }

        execute(
            &mut item,
            &ServiceItemCommand::RestoreServiceItem(RestoreServiceItem {
                shop_id,
                item_id,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(!item.is_retired());
        assert!(item.handle(&change_price(shop_id, item_id, 500)).is_ok());
    }

    #[test]
    fn service_kind_parses_snake_case() {
        assert_eq!("dry_clean".parse::<ServiceKind>().unwrap(), ServiceKind::DryClean);
        assert_eq!(ServiceKind::WashAndIron.as_str(), "wash_and_iron");
        assert!("steam".parse::<ServiceKind>().is_err());
    }
}

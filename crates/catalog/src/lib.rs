//! Catalog of serviceable items (event-sourced).
//!
//! Each item pairs an article with a service and a unit price; orders price their
//! lines from here.

pub mod item;

pub use item::{
    AddServiceItem, ChangePrice, PriceChanged, RestoreServiceItem, RetireServiceItem, ServiceItem,
    ServiceItemAdded, ServiceItemCommand, ServiceItemEvent, ServiceItemId, ServiceItemRestored,
    ServiceItemRetired, ServiceItemUpdated, ServiceKind, Unit, UpdateServiceItem,
};

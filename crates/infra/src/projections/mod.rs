//! Projection implementations (read model builders).
//!
//! Projections consume committed envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: reconstructed from the event log by `rebuild_from_scratch`
//! - **Shop-isolated**: data is partitioned by shop
//! - **Idempotent**: safe for at-least-once delivery

pub mod cursor;

pub mod bills;
pub mod catalog;
pub mod clients;
pub mod deliveries;
pub mod due_customers;
pub mod orders;
pub mod reports;

pub use bills::{BILL_AGGREGATE_TYPE, BillPaymentReadModel, BillReadModel, BillsProjection};
pub use catalog::{CatalogItemReadModel, CatalogProjection, SERVICE_ITEM_AGGREGATE_TYPE};
pub use clients::{CLIENT_AGGREGATE_TYPE, ClientDirectoryProjection, ClientReadModel};
pub use cursor::{CursorCheck, ProjectionError, StreamCursors};
pub use deliveries::{DELIVERY_AGGREGATE_TYPE, DeliveriesProjection, DeliveryReadModel};
pub use due_customers::{DueCustomer, DueCustomersProjection};
pub use orders::{ORDER_AGGREGATE_TYPE, OrderBoardProjection, OrderReadModel};
pub use reports::{DailyReport, ReportsProjection, ShopSummary};

//! Infrastructure wiring: event store, bus, dispatcher and read models.
//!
//! Commands go through one [`CommandDispatcher`]; committed envelopes reach the
//! projections through a background subscriber, so reads are eventually
//! consistent with writes.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use washline_billing::{Bill, BillCommand, BillId};
use washline_catalog::{ServiceItem, ServiceItemCommand, ServiceItemId};
use washline_clients::{Client, ClientCommand, ClientId};
use washline_core::{AggregateId, ShopId};
use washline_deliveries::{Delivery, DeliveryCommand, DeliveryId};
use washline_events::{EventBus, EventEnvelope, InMemoryEventBus};
use washline_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use washline_infra::event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
use washline_infra::projections::{
    BILL_AGGREGATE_TYPE, BillReadModel, BillsProjection, CLIENT_AGGREGATE_TYPE,
    CatalogItemReadModel, CatalogProjection, ClientDirectoryProjection, ClientReadModel,
    DELIVERY_AGGREGATE_TYPE, DailyReport, DeliveriesProjection, DeliveryReadModel, DueCustomer,
    DueCustomersProjection, ORDER_AGGREGATE_TYPE, OrderBoardProjection, OrderReadModel,
    ProjectionError, ReportsProjection, SERVICE_ITEM_AGGREGATE_TYPE,
};
use washline_infra::read_model::InMemoryShopStore;
use washline_orders::{Order, OrderCommand, OrderId};

use crate::config::ApiConfig;

pub type SharedStore = Arc<dyn EventStore + Send + Sync>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Dispatcher = CommandDispatcher<SharedStore, Bus>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("DATABASE_URL is required for persistent stores")]
    MissingDatabaseUrl,

    #[cfg(feature = "postgres")]
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error("read model rebuild failed: {0}")]
    Projection(#[from] ProjectionError),
}

/// Every read model the API serves.
#[derive(Debug)]
pub struct Projections {
    pub clients: ClientDirectoryProjection<InMemoryShopStore<ClientId, ClientReadModel>>,
    pub catalog: CatalogProjection<InMemoryShopStore<ServiceItemId, CatalogItemReadModel>>,
    pub orders: OrderBoardProjection<InMemoryShopStore<OrderId, OrderReadModel>>,
    pub bills: BillsProjection<InMemoryShopStore<BillId, BillReadModel>>,
    pub deliveries: DeliveriesProjection<InMemoryShopStore<DeliveryId, DeliveryReadModel>>,
    pub due_customers: DueCustomersProjection<InMemoryShopStore<ClientId, DueCustomer>>,
    pub reports: ReportsProjection<InMemoryShopStore<NaiveDate, DailyReport>>,
}

impl Projections {
    pub fn new() -> Self {
        Self {
            clients: ClientDirectoryProjection::new(InMemoryShopStore::new()),
            catalog: CatalogProjection::new(InMemoryShopStore::new()),
            orders: OrderBoardProjection::new(InMemoryShopStore::new()),
            bills: BillsProjection::new(InMemoryShopStore::new()),
            deliveries: DeliveriesProjection::new(InMemoryShopStore::new()),
            due_customers: DueCustomersProjection::new(InMemoryShopStore::new()),
            reports: ReportsProjection::new(InMemoryShopStore::new()),
        }
    }

    /// Feed one envelope to every projection; each ignores foreign aggregate types.
    ///
    /// All projections see the envelope even if an earlier one fails; the first
    /// failure is returned.
    pub fn apply(&self, env: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let results = [
            self.clients.apply_envelope(env),
            self.catalog.apply_envelope(env),
            self.orders.apply_envelope(env),
            self.bills.apply_envelope(env),
            self.deliveries.apply_envelope(env),
            self.due_customers.apply_envelope(env),
            self.reports.apply_envelope(env),
        ];
        results.into_iter().collect()
    }

    /// Replace the read models of every shop in `events` by replaying them.
    pub fn rebuild(&self, events: &[StoredEvent]) -> Result<(), ProjectionError> {
        let envelopes = || events.iter().map(StoredEvent::to_envelope);
        self.clients.rebuild_from_scratch(envelopes())?;
        self.catalog.rebuild_from_scratch(envelopes())?;
        self.orders.rebuild_from_scratch(envelopes())?;
        self.bills.rebuild_from_scratch(envelopes())?;
        self.deliveries.rebuild_from_scratch(envelopes())?;
        self.due_customers.rebuild_from_scratch(envelopes())?;
        self.reports.rebuild_from_scratch(envelopes())?;
        Ok(())
    }
}

impl Default for Projections {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppServices {
    dispatcher: Dispatcher,
    projections: Arc<Projections>,
    shop_name: String,
}

impl AppServices {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    pub fn shop_name(&self) -> &str {
        &self.shop_name
    }

    pub fn dispatch_client(
        &self,
        shop_id: ShopId,
        client_id: ClientId,
        command: ClientCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(shop_id, client_id.0, CLIENT_AGGREGATE_TYPE, command, |_, id| {
            Client::empty(ClientId::new(id))
        })
    }

    pub fn dispatch_item(
        &self,
        shop_id: ShopId,
        item_id: ServiceItemId,
        command: ServiceItemCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(
            shop_id,
            item_id.0,
            SERVICE_ITEM_AGGREGATE_TYPE,
            command,
            |_, id| ServiceItem::empty(ServiceItemId::new(id)),
        )
    }

    pub fn dispatch_order(
        &self,
        shop_id: ShopId,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(shop_id, order_id.0, ORDER_AGGREGATE_TYPE, command, |_, id| {
            Order::empty(OrderId::new(id))
        })
    }

    pub fn dispatch_bill(
        &self,
        shop_id: ShopId,
        bill_id: BillId,
        command: BillCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(shop_id, bill_id.0, BILL_AGGREGATE_TYPE, command, |_, id| {
            Bill::empty(BillId::new(id))
        })
    }

    pub fn dispatch_delivery(
        &self,
        shop_id: ShopId,
        delivery_id: DeliveryId,
        command: DeliveryCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatcher.dispatch(
            shop_id,
            delivery_id.0,
            DELIVERY_AGGREGATE_TYPE,
            command,
            |_, id| Delivery::empty(DeliveryId::new(id)),
        )
    }

    /// Current write-side state of a client; used for cross-aggregate checks.
    pub fn load_client(&self, shop_id: ShopId, client_id: ClientId) -> Result<Client, DispatchError> {
        self.dispatcher
            .load(shop_id, client_id.0, |_, id: AggregateId| Client::empty(ClientId::new(id)))
    }

    pub fn load_order(&self, shop_id: ShopId, order_id: OrderId) -> Result<Order, DispatchError> {
        self.dispatcher
            .load(shop_id, order_id.0, |_, id: AggregateId| Order::empty(OrderId::new(id)))
    }

    pub fn load_delivery(
        &self,
        shop_id: ShopId,
        delivery_id: DeliveryId,
    ) -> Result<Delivery, DispatchError> {
        self.dispatcher.load(shop_id, delivery_id.0, |_, id: AggregateId| {
            Delivery::empty(DeliveryId::new(id))
        })
    }
}

pub async fn build_services(config: &ApiConfig) -> Result<AppServices, StartupError> {
    if config.use_persistent_stores {
        #[cfg(feature = "postgres")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but the postgres feature is not enabled, falling back to in-memory"
            );
        }
    }

    Ok(build_in_memory_services(config))
}

fn build_in_memory_services(config: &ApiConfig) -> AppServices {
    let store: SharedStore = Arc::new(InMemoryEventStore::new());
    tracing::info!("using in-memory event store");
    wire(store, Arc::new(Projections::new()), config)
}

#[cfg(feature = "postgres")]
async fn build_persistent_services(config: &ApiConfig) -> Result<AppServices, StartupError> {
    use sqlx::postgres::PgPoolOptions;
    use washline_infra::event_store::PostgresEventStore;

    let url = config
        .database_url
        .as_deref()
        .ok_or(StartupError::MissingDatabaseUrl)?;
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let store = PostgresEventStore::new(pool);
    store.ensure_schema().await?;

    let projections = Arc::new(Projections::new());
    let shops = store.shop_ids().await?;
    for shop_id in &shops {
        let events = store.load_all_async(*shop_id).await?;
        projections.rebuild(&events)?;
        tracing::info!(shop_id = %shop_id, events = events.len(), "read models rebuilt");
    }
    tracing::info!(shops = shops.len(), "using postgres event store");

    let store: SharedStore = Arc::new(store);
    Ok(wire(store, projections, config))
}

/// Subscribe the projections to the bus and assemble the services.
fn wire(store: SharedStore, projections: Arc<Projections>, config: &ApiConfig) -> AppServices {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let sub = bus.subscribe();

    {
        let projections = projections.clone();
        tokio::task::spawn_blocking(move || {
            // Ends once the dispatcher (the last publisher) is dropped.
            while let Ok(env) = sub.recv() {
                if let Err(e) = projections.apply(&env) {
                    tracing::warn!(
                        aggregate_type = env.aggregate_type(),
                        aggregate_id = %env.aggregate_id(),
                        sequence_number = env.sequence_number(),
                        error = %e,
                        "projection apply failed"
                    );
                }
            }
        });
    }

    AppServices {
        dispatcher: CommandDispatcher::new(store, bus),
        projections,
        shop_name: config.shop_name.clone(),
    }
}

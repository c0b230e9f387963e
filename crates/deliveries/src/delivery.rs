use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use washline_clients::ClientId;
use washline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopId, UserId};
use washline_events::Event;
use washline_orders::OrderId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub AggregateId);

impl DeliveryId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// ```text
/// scheduled -> out_for_delivery -> delivered
///     ^              |
///     +--- failed <--+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Scheduled,
    OutForDelivery,
    Delivered,
    Failed,
}

/// Aggregate root: Delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    id: DeliveryId,
    shop_id: Option<ShopId>,
    order_id: Option<OrderId>,
    client_id: Option<ClientId>,
    address: String,
    scheduled_for: Option<DateTime<Utc>>,
    courier: Option<UserId>,
    status: DeliveryStatus,
    attempts: u32,
    received_by: Option<String>,
    last_failure: Option<String>,
    version: u64,
    created: bool,
}

impl Delivery {
    pub fn empty(id: DeliveryId) -> Self {
        Self {
            id,
            shop_id: None,
            order_id: None,
            client_id: None,
            address: String::new(),
            scheduled_for: None,
            courier: None,
            status: DeliveryStatus::Scheduled,
            attempts: 0,
            received_by: None,
            last_failure: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DeliveryId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn scheduled_for(&self) -> Option<DateTime<Utc>> {
        self.scheduled_for
    }

    pub fn courier(&self) -> Option<UserId> {
        self.courier
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    /// Number of times the delivery left the shop.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn received_by(&self) -> Option<&str> {
        self.received_by.as_deref()
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }
}

impl AggregateRoot for Delivery {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDelivery {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub address: String,
    pub scheduled_for: DateTime<Utc>,
    pub courier: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignCourier {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub courier: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchDelivery {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteDelivery {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub received_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailDelivery {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleDelivery {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub scheduled_for: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryCommand {
    ScheduleDelivery(ScheduleDelivery),
    AssignCourier(AssignCourier),
    DispatchDelivery(DispatchDelivery),
    CompleteDelivery(CompleteDelivery),
    FailDelivery(FailDelivery),
    RescheduleDelivery(RescheduleDelivery),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryScheduled {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub address: String,
    pub scheduled_for: DateTime<Utc>,
    pub courier: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierAssigned {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub courier: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDispatched {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub courier: UserId,
    pub attempt: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCompleted {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub order_id: OrderId,
    pub received_by: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailed {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRescheduled {
    pub shop_id: ShopId,
    pub delivery_id: DeliveryId,
    pub scheduled_for: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryEvent {
    DeliveryScheduled(DeliveryScheduled),
    CourierAssigned(CourierAssigned),
    DeliveryDispatched(DeliveryDispatched),
    DeliveryCompleted(DeliveryCompleted),
    DeliveryFailed(DeliveryFailed),
    DeliveryRescheduled(DeliveryRescheduled),
}

impl Event for DeliveryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryEvent::DeliveryScheduled(_) => "deliveries.delivery.scheduled",
            DeliveryEvent::CourierAssigned(_) => "deliveries.delivery.courier_assigned",
            DeliveryEvent::DeliveryDispatched(_) => "deliveries.delivery.dispatched",
            DeliveryEvent::DeliveryCompleted(_) => "deliveries.delivery.completed",
            DeliveryEvent::DeliveryFailed(_) => "deliveries.delivery.failed",
            DeliveryEvent::DeliveryRescheduled(_) => "deliveries.delivery.rescheduled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryEvent::DeliveryScheduled(e) => e.occurred_at,
            DeliveryEvent::CourierAssigned(e) => e.occurred_at,
            DeliveryEvent::DeliveryDispatched(e) => e.occurred_at,
            DeliveryEvent::DeliveryCompleted(e) => e.occurred_at,
            DeliveryEvent::DeliveryFailed(e) => e.occurred_at,
            DeliveryEvent::DeliveryRescheduled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Delivery {
    type Command = DeliveryCommand;
    type Event = DeliveryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryEvent::DeliveryScheduled(e) => {
                self.id = e.delivery_id;
                self.shop_id = Some(e.shop_id);
                self.order_id = Some(e.order_id);
                self.client_id = Some(e.client_id);
                self.address = e.address.clone();
                self.scheduled_for = Some(e.scheduled_for);
                self.courier = e.courier;
                self.status = DeliveryStatus::Scheduled;
                self.attempts = 0;
                self.created = true;
            }
            DeliveryEvent::CourierAssigned(e) => self.courier = Some(e.courier),
            DeliveryEvent::DeliveryDispatched(e) => {
                self.status = DeliveryStatus::OutForDelivery;
                self.attempts = e.attempt;
            }
            DeliveryEvent::DeliveryCompleted(e) => {
                self.status = DeliveryStatus::Delivered;
                self.received_by = e.received_by.clone();
            }
            DeliveryEvent::DeliveryFailed(e) => {
                self.status = DeliveryStatus::Failed;
                self.last_failure = Some(e.reason.clone());
            }
            DeliveryEvent::DeliveryRescheduled(e) => {
                self.status = DeliveryStatus::Scheduled;
                self.scheduled_for = Some(e.scheduled_for);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryCommand::ScheduleDelivery(cmd) => self.handle_schedule(cmd),
            DeliveryCommand::AssignCourier(cmd) => self.handle_assign(cmd),
            DeliveryCommand::DispatchDelivery(cmd) => self.handle_dispatch(cmd),
            DeliveryCommand::CompleteDelivery(cmd) => self.handle_complete(cmd),
            DeliveryCommand::FailDelivery(cmd) => self.handle_fail(cmd),
            DeliveryCommand::RescheduleDelivery(cmd) => self.handle_reschedule(cmd),
        }
    }
}

impl Delivery {
    fn ensure_exists(&self, shop_id: ShopId, delivery_id: DeliveryId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::invariant("shop mismatch"));
        }
        if self.id != delivery_id {
            return Err(DomainError::invariant("delivery_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, allowed: &[DeliveryStatus], action: &str) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "cannot {action} a delivery that is {:?}",
                self.status
            )))
        }
    }

    fn handle_schedule(&self, cmd: &ScheduleDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("delivery already exists"));
        }
        if cmd.address.trim().is_empty() {
            return Err(DomainError::validation("address cannot be empty"));
        }

        Ok(vec![DeliveryEvent::DeliveryScheduled(DeliveryScheduled {
            shop_id: cmd.shop_id,
            delivery_id: cmd.delivery_id,
            order_id: cmd.order_id,
            client_id: cmd.client_id,
            address: cmd.address.trim().to_string(),
            scheduled_for: cmd.scheduled_for,
            courier: cmd.courier,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignCourier) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.delivery_id)?;
        self.ensure_status(&[DeliveryStatus::Scheduled, DeliveryStatus::Failed], "reassign")?;

        if self.courier == Some(cmd.courier) {
            return Err(DomainError::conflict("courier is already assigned"));
        }

        Ok(vec![DeliveryEvent::CourierAssigned(CourierAssigned {
            shop_id: cmd.shop_id,
            delivery_id: cmd.delivery_id,
            courier: cmd.courier,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_dispatch(&self, cmd: &DispatchDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.delivery_id)?;
        self.ensure_status(&[DeliveryStatus::Scheduled], "dispatch")?;

        let courier = self
            .courier
            .ok_or_else(|| DomainError::invariant("assign a courier before dispatching"))?;

        Ok(vec![DeliveryEvent::DeliveryDispatched(DeliveryDispatched {
            shop_id: cmd.shop_id,
            delivery_id: cmd.delivery_id,
            courier,
            attempt: self.attempts + 1,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.delivery_id)?;
        self.ensure_status(&[DeliveryStatus::OutForDelivery], "complete")?;

        let order_id = self.order_id.ok_or_else(DomainError::not_found)?;

        Ok(vec![DeliveryEvent::DeliveryCompleted(DeliveryCompleted {
            shop_id: cmd.shop_id,
            delivery_id: cmd.delivery_id,
            order_id,
            received_by: cmd
                .received_by
                .as_ref()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fail(&self, cmd: &FailDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.delivery_id)?;
        self.ensure_status(&[DeliveryStatus::OutForDelivery], "fail")?;

        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("failure reason cannot be empty"));
        }

        Ok(vec![DeliveryEvent::DeliveryFailed(DeliveryFailed {
            shop_id: cmd.shop_id,
            delivery_id: cmd.delivery_id,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reschedule(&self, cmd: &RescheduleDelivery) -> Result<Vec<DeliveryEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.delivery_id)?;
        self.ensure_status(&[DeliveryStatus::Scheduled, DeliveryStatus::Failed], "reschedule")?;

        Ok(vec![DeliveryEvent::DeliveryRescheduled(DeliveryRescheduled {
            shop_id: cmd.shop_id,
            delivery_id: cmd.delivery_id,
            scheduled_for: cmd.scheduled_for,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use washline_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    struct Fixture {
        shop_id: ShopId,
        delivery_id: DeliveryId,
        delivery: Delivery,
    }

    impl Fixture {
        fn scheduled(courier: Option<UserId>) -> Self {
            let shop_id = ShopId::new();
            let delivery_id = DeliveryId::new(AggregateId::new());
            let mut delivery = Delivery::empty(delivery_id);
            execute(
                &mut delivery,
                &DeliveryCommand::ScheduleDelivery(ScheduleDelivery {
                    shop_id,
                    delivery_id,
                    order_id: OrderId::new(AggregateId::new()),
                    client_id: ClientId::new(AggregateId::new()),
                    address: " 4 Harbour View ".to_string(),
                    scheduled_for: test_time() + Duration::hours(3),
                    courier,
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            Self {
                shop_id,
                delivery_id,
                delivery,
            }
        }

        fn run(&mut self, command: DeliveryCommand) -> Result<Vec<DeliveryEvent>, DomainError> {
            execute(&mut self.delivery, &command)
        }

        fn dispatch(&mut self) -> Result<Vec<DeliveryEvent>, DomainError> {
            self.run(DeliveryCommand::DispatchDelivery(DispatchDelivery {
                shop_id: self.shop_id,
                delivery_id: self.delivery_id,
                occurred_at: test_time(),
            }))
        }

        fn fail(&mut self, reason: &str) -> Result<Vec<DeliveryEvent>, DomainError> {
            self.run(DeliveryCommand::FailDelivery(FailDelivery {
                shop_id: self.shop_id,
                delivery_id: self.delivery_id,
                reason: reason.to_string(),
                occurred_at: test_time(),
            }))
        }

        fn complete(&mut self) -> Result<Vec<DeliveryEvent>, DomainError> {
            self.run(DeliveryCommand::CompleteDelivery(CompleteDelivery {
                shop_id: self.shop_id,
                delivery_id: self.delivery_id,
                received_by: Some("Neighbour".to_string()),
                occurred_at: test_time(),
            }))
        }

        fn reschedule(&mut self) -> Result<Vec<DeliveryEvent>, DomainError> {
            self.run(DeliveryCommand::RescheduleDelivery(RescheduleDelivery {
                shop_id: self.shop_id,
                delivery_id: self.delivery_id,
                scheduled_for: test_time() + Duration::days(1),
                occurred_at: test_time(),
            }))
        }
    }

    #[test]
    fn dispatch_requires_a_courier() {
        let mut fx = Fixture::scheduled(None);
        assert_eq!(fx.delivery.address(), "4 Harbour View");

        let err = fx.dispatch().unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("assign a courier") => {}
            other => panic!("unexpected error: {other:?}"),
        }

        let courier = UserId::new();
        fx.run(DeliveryCommand::AssignCourier(AssignCourier {
            shop_id: fx.shop_id,
            delivery_id: fx.delivery_id,
            courier,
            occurred_at: test_time(),
        }))
        .unwrap();
        fx.dispatch().unwrap();
        assert_eq!(fx.delivery.status(), DeliveryStatus::OutForDelivery);
        assert_eq!(fx.delivery.courier(), Some(courier));
    }

    #[test]
    fn complete_carries_the_order() {
        let mut fx = Fixture::scheduled(Some(UserId::new()));
        fx.dispatch().unwrap();

        let events = fx.complete().unwrap();
        match &events[0] {
            DeliveryEvent::DeliveryCompleted(e) => {
                assert_eq!(Some(e.order_id), fx.delivery.order_id());
                assert_eq!(e.received_by.as_deref(), Some("Neighbour"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(fx.delivery.status(), DeliveryStatus::Delivered);
    }

    #[test]
    fn cannot_complete_before_dispatch() {
        let mut fx = Fixture::scheduled(Some(UserId::new()));
        assert!(matches!(fx.complete(), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn failed_delivery_can_be_rescheduled_and_retried() {
        let mut fx = Fixture::scheduled(Some(UserId::new()));
        fx.dispatch().unwrap();
        fx.fail("nobody home").unwrap();
        assert_eq!(fx.delivery.status(), DeliveryStatus::Failed);
        assert_eq!(fx.delivery.last_failure(), Some("nobody home"));

        assert!(fx.dispatch().is_err());
        fx.reschedule().unwrap();
        fx.dispatch().unwrap();
        assert_eq!(fx.delivery.attempts(), 2);
        fx.complete().unwrap();
    }

    #[test]
    fn failure_needs_a_reason() {
        let mut fx = Fixture::scheduled(Some(UserId::new()));
        fx.dispatch().unwrap();
        assert!(matches!(fx.fail("  "), Err(DomainError::Validation(_))));
    }

    #[test]
    fn delivered_is_terminal() {
        let mut fx = Fixture::scheduled(Some(UserId::new()));
        fx.dispatch().unwrap();
        fx.complete().unwrap();

        assert!(fx.reschedule().is_err());
        assert!(fx.dispatch().is_err());
        assert!(fx.fail("lost").is_err());
    }
}

//! Delivery tracking (event-sourced): hand-over of finished orders to clients.

pub mod delivery;

pub use delivery::{
    AssignCourier, CompleteDelivery, CourierAssigned, Delivery, DeliveryCommand,
    DeliveryCompleted, DeliveryDispatched, DeliveryEvent, DeliveryFailed, DeliveryId,
    DeliveryRescheduled, DeliveryScheduled, DeliveryStatus, DispatchDelivery, FailDelivery,
    RescheduleDelivery, ScheduleDelivery,
};

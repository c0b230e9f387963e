//! Laundry orders (event-sourced).
//!
//! An order walks a fixed pipeline of [`Stage`]s. At every stage the worker
//! ticks each intake line off a [`StageChecklist`], recording how many pieces
//! they actually counted; the order only moves on when every count matches intake.

pub mod checklist;
pub mod order;
pub mod stage;

pub use checklist::{ChecklistProgress, CountMismatch, StageChecklist};
pub use order::{
    AddOrderLine, AdvanceStage, CancelOrder, CheckItem, CreateOrder, ItemChecked, ItemUnchecked,
    LineItem, MarkDelivered, Order, OrderCancelled, OrderCommand, OrderCreated, OrderDelivered,
    OrderEvent, OrderId, OrderLine, OrderLineAdded, OrderPaymentRecorded, OrderStatus,
    RecordOrderPayment, StageAdvanced, UncheckItem,
};
pub use stage::Stage;

//! Request bodies and query strings.
//!
//! Ids arrive as strings and are parsed in the handlers so a malformed id is a
//! 400 with a readable message instead of a JSON rejection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use washline_billing::{BillLine, PaymentMethod};
use washline_catalog::{ServiceKind, Unit};
use washline_clients::ContactInfo;
use washline_orders::Stage;

// clients

#[derive(Debug, Deserialize)]
pub struct RegisterClientRequest {
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct RecordTransactionRequest {
    pub amount: u64,
    #[serde(default)]
    pub deposit: u64,
    pub memo: Option<String>,
}

/// Body of cancel/void/deactivate; the whole body may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

// catalog

#[derive(Debug, Deserialize)]
pub struct AddServiceItemRequest {
    pub name: String,
    pub category: String,
    pub service: ServiceKind,
    pub unit: Unit,
    pub unit_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceItemRequest {
    pub name: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePriceRequest {
    pub unit_price: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListItemsQuery {
    #[serde(default)]
    pub include_retired: bool,
}

// orders

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub item_id: String,
    pub quantity: u32,
    /// Overrides the catalog price for this line.
    pub unit_price: Option<u64>,
    /// Defaults to the catalog item name.
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub client_id: String,
    pub lines: Vec<OrderLineRequest>,
    #[serde(default)]
    pub deposit: u64,
    pub promised_for: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckItemRequest {
    pub counted: u32,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceStageRequest {
    /// Stage the caller believes the order is at.
    pub from: Stage,
}

#[derive(Debug, Deserialize)]
pub struct OrderPaymentRequest {
    pub amount: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub stage: Option<String>,
    pub client_id: Option<String>,
}

// bills

#[derive(Debug, Deserialize)]
pub struct IssueBillRequest {
    pub client_id: String,
    pub order_id: Option<String>,
    pub lines: Vec<BillLine>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct BillPaymentRequest {
    pub amount: u64,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Default, Deserialize)]
pub struct ListBillsQuery {
    #[serde(default)]
    pub open: bool,
    pub client_id: Option<String>,
}

// deliveries

#[derive(Debug, Deserialize)]
pub struct ScheduleDeliveryRequest {
    pub order_id: String,
    /// Defaults to the client's address on file.
    pub address: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub courier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignCourierRequest {
    pub courier: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteDeliveryRequest {
    pub received_by: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailDeliveryRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleDeliveryRequest {
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDeliveriesQuery {
    #[serde(default)]
    pub mine: bool,
    pub order_id: Option<String>,
}

// reports / search

#[derive(Debug, Default, Deserialize)]
pub struct DailyReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

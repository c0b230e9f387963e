use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use washline_catalog::ServiceItemId;
use washline_clients::ClientId;
use washline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopId, line_total, sum_amounts};
use washline_events::Event;

use crate::checklist::StageChecklist;
use crate::stage::Stage;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    InProgress,
    Delivered,
    Cancelled,
}

/// Line as submitted at intake, before numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: ServiceItemId,
    pub description: String,
    pub quantity: u32,
    /// Price in smallest currency unit.
    pub unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub item_id: ServiceItemId,
    pub description: String,
    pub quantity: u32,
    pub unit_price: u64,
}

impl OrderLine {
    pub fn amount(&self) -> Result<u64, DomainError> {
        line_total(u64::from(self.quantity), self.unit_price)
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    shop_id: Option<ShopId>,
    client_id: Option<ClientId>,
    lines: Vec<OrderLine>,
    stage: Stage,
    status: OrderStatus,
    checklists: BTreeMap<Stage, StageChecklist>,
    amount: u64,
    deposit: u64,
    payments_total: u64,
    payments_count: u32,
    promised_for: Option<DateTime<Utc>>,
    notes: Option<String>,
    received_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            shop_id: None,
            client_id: None,
            lines: Vec::new(),
            stage: Stage::Entry,
            status: OrderStatus::InProgress,
            checklists: BTreeMap::new(),
            amount: 0,
            deposit: 0,
            payments_total: 0,
            payments_count: 0,
            promised_for: None,
            notes: None,
            received_at: None,
            delivered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn deposit(&self) -> u64 {
        self.deposit
    }

    /// Deposit plus every later payment.
    pub fn paid(&self) -> u64 {
        self.deposit.saturating_add(self.payments_total)
    }

    pub fn balance(&self) -> u64 {
        self.amount.saturating_sub(self.paid())
    }

    /// Balance still owed; cancelled orders owe nothing.
    pub fn unpaid_balance(&self) -> u64 {
        match self.status {
            OrderStatus::Cancelled => 0,
            _ => self.balance(),
        }
    }

    pub fn promised_for(&self) -> Option<DateTime<Utc>> {
        self.promised_for
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    /// Checklist of `stage`; stages nobody has touched yet get an empty one.
    pub fn checklist(&self, stage: Stage) -> StageChecklist {
        self.checklists
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| StageChecklist::new(stage))
    }

    pub fn current_checklist_complete(&self) -> bool {
        self.checklist(self.stage).is_complete(&self.lines)
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub lines: Vec<LineItem>,
    pub deposit: u64,
    pub promised_for: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOrderLine {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub line: LineItem,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckItem {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub stage: Stage,
    pub line_no: u32,
    pub counted: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncheckItem {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub stage: Stage,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Move the order past `from`. Carrying the stage the caller saw keeps two
/// workers from advancing the same order twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceStage {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub from: Stage,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOrderPayment {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    AddOrderLine(AddOrderLine),
    CheckItem(CheckItem),
    UncheckItem(UncheckItem),
    AdvanceStage(AdvanceStage),
    RecordOrderPayment(RecordOrderPayment),
    MarkDelivered(MarkDelivered),
    CancelOrder(CancelOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub client_id: ClientId,
    pub lines: Vec<OrderLine>,
    pub amount: u64,
    pub deposit: u64,
    pub promised_for: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineAdded {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub line: OrderLine,
    pub new_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemChecked {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub stage: Stage,
    pub line_no: u32,
    pub expected: u32,
    pub counted: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUnchecked {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub stage: Stage,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAdvanced {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub from: Stage,
    pub to: Stage,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaymentRecorded {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub payment_no: u32,
    pub amount: u64,
    pub new_total_paid: u64,
    pub balance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub outstanding_balance: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub shop_id: ShopId,
    pub order_id: OrderId,
    pub stage: Stage,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderLineAdded(OrderLineAdded),
    ItemChecked(ItemChecked),
    ItemUnchecked(ItemUnchecked),
    StageAdvanced(StageAdvanced),
    OrderPaymentRecorded(OrderPaymentRecorded),
    OrderDelivered(OrderDelivered),
    OrderCancelled(OrderCancelled),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.order.created",
            OrderEvent::OrderLineAdded(_) => "orders.order.line_added",
            OrderEvent::ItemChecked(_) => "orders.order.item_checked",
            OrderEvent::ItemUnchecked(_) => "orders.order.item_unchecked",
            OrderEvent::StageAdvanced(_) => "orders.order.stage_advanced",
            OrderEvent::OrderPaymentRecorded(_) => "orders.order.payment_recorded",
            OrderEvent::OrderDelivered(_) => "orders.order.delivered",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::OrderLineAdded(e) => e.occurred_at,
            OrderEvent::ItemChecked(e) => e.occurred_at,
            OrderEvent::ItemUnchecked(e) => e.occurred_at,
            OrderEvent::StageAdvanced(e) => e.occurred_at,
            OrderEvent::OrderPaymentRecorded(e) => e.occurred_at,
            OrderEvent::OrderDelivered(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.shop_id = Some(e.shop_id);
                self.client_id = Some(e.client_id);
                self.lines = e.lines.clone();
                self.amount = e.amount;
                self.deposit = e.deposit;
                self.payments_total = 0;
                self.payments_count = 0;
                self.stage = Stage::Entry;
                self.status = OrderStatus::InProgress;
                self.checklists.clear();
                self.promised_for = e.promised_for;
                self.notes = e.notes.clone();
                self.received_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::OrderLineAdded(e) => {
                self.lines.push(e.line.clone());
                self.amount = e.new_amount;
            }
            OrderEvent::ItemChecked(e) => {
                self.checklists
                    .entry(e.stage)
                    .or_insert_with(|| StageChecklist::new(e.stage))
                    .check(e.line_no, e.counted);
            }
            OrderEvent::ItemUnchecked(e) => {
                if let Some(checklist) = self.checklists.get_mut(&e.stage) {
                    checklist.uncheck(e.line_no);
                }
            }
            OrderEvent::StageAdvanced(e) => {
                self.stage = e.to;
            }
            OrderEvent::OrderPaymentRecorded(e) => {
                self.payments_total = e.new_total_paid.saturating_sub(self.deposit);
                self.payments_count = e.payment_no;
            }
            OrderEvent::OrderDelivered(e) => {
                self.status = OrderStatus::Delivered;
                self.delivered_at = Some(e.occurred_at);
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::AddOrderLine(cmd) => self.handle_add_line(cmd),
            OrderCommand::CheckItem(cmd) => self.handle_check(cmd),
            OrderCommand::UncheckItem(cmd) => self.handle_uncheck(cmd),
            OrderCommand::AdvanceStage(cmd) => self.handle_advance(cmd),
            OrderCommand::RecordOrderPayment(cmd) => self.handle_payment(cmd),
            OrderCommand::MarkDelivered(cmd) => self.handle_mark_delivered(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

fn validate_line(line: &LineItem) -> Result<(), DomainError> {
    if line.description.trim().is_empty() {
        return Err(DomainError::validation("line description cannot be empty"));
    }
    if line.quantity == 0 {
        return Err(DomainError::validation("line quantity must be positive"));
    }
    if line.unit_price == 0 {
        return Err(DomainError::validation("line unit_price must be positive"));
    }
    Ok(())
}

fn number_line(line_no: u32, line: &LineItem) -> OrderLine {
    OrderLine {
        line_no,
        item_id: line.item_id,
        description: line.description.trim().to_string(),
        quantity: line.quantity,
        unit_price: line.unit_price,
    }
}

impl Order {
    fn ensure_exists(&self, shop_id: ShopId, order_id: OrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::invariant("shop mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_in_progress(&self) -> Result<(), DomainError> {
        match self.status {
            OrderStatus::InProgress => Ok(()),
            OrderStatus::Delivered => Err(DomainError::invariant("order is already delivered")),
            OrderStatus::Cancelled => Err(DomainError::invariant("order is cancelled")),
        }
    }

    fn line(&self, line_no: u32) -> Result<&OrderLine, DomainError> {
        self.lines
            .iter()
            .find(|l| l.line_no == line_no)
            .ok_or_else(|| DomainError::validation(format!("order has no line {line_no}")))
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot create order without lines"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, line) in cmd.lines.iter().enumerate() {
            validate_line(line)?;
            lines.push(number_line(idx as u32 + 1, line));
        }

        let amounts = lines.iter().map(OrderLine::amount).collect::<Result<Vec<_>, _>>()?;
        let amount = sum_amounts(amounts)?;

        if cmd.deposit > amount {
            return Err(DomainError::validation("deposit cannot exceed order amount"));
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            client_id: cmd.client_id,
            lines,
            amount,
            deposit: cmd.deposit,
            promised_for: cmd.promised_for,
            notes: cmd.notes.clone().filter(|n| !n.trim().is_empty()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddOrderLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.order_id)?;
        self.ensure_in_progress()?;

        if self.stage != Stage::Entry {
            return Err(DomainError::invariant("lines can only be added at entry"));
        }
        if !self.checklist(Stage::Entry).is_empty() {
            return Err(DomainError::invariant(
                "lines cannot be added once intake counting has started",
            ));
        }
        validate_line(&cmd.line)?;

        let line = number_line(self.lines.len() as u32 + 1, &cmd.line);
        let new_amount = self
            .amount
            .checked_add(line.amount()?)
            .ok_or_else(|| DomainError::validation("order amount overflow"))?;

        Ok(vec![OrderEvent::OrderLineAdded(OrderLineAdded {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            line,
            new_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn ensure_current_stage(&self, stage: Stage) -> Result<(), DomainError> {
        if stage != self.stage {
            return Err(DomainError::conflict(format!(
                "order is at stage '{}', not '{}'",
                self.stage, stage
            )));
        }
        Ok(())
    }

    fn handle_check(&self, cmd: &CheckItem) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.order_id)?;
        self.ensure_in_progress()?;
        self.ensure_current_stage(cmd.stage)?;
        let line = self.line(cmd.line_no)?;

        Ok(vec![OrderEvent::ItemChecked(ItemChecked {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            stage: cmd.stage,
            line_no: cmd.line_no,
            expected: line.quantity,
            counted: cmd.counted,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_uncheck(&self, cmd: &UncheckItem) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.order_id)?;
        self.ensure_in_progress()?;
        self.ensure_current_stage(cmd.stage)?;
        self.line(cmd.line_no)?;

        if !self.checklist(cmd.stage).is_checked(cmd.line_no) {
            return Err(DomainError::conflict(format!(
                "line {} is not checked",
                cmd.line_no
            )));
        }

        Ok(vec![OrderEvent::ItemUnchecked(ItemUnchecked {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            stage: cmd.stage,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance(&self, cmd: &AdvanceStage) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.order_id)?;
        self.ensure_in_progress()?;
        self.ensure_current_stage(cmd.from)?;

        let to = self
            .stage
            .next()
            .ok_or_else(|| DomainError::invariant("delivery is the last stage"))?;

        let checklist = self.checklist(self.stage);
        if !checklist.is_complete(&self.lines) {
            let mismatches = checklist.mismatches(&self.lines);
            let unchecked = checklist.unchecked_lines(&self.lines);
            return Err(DomainError::invariant(format!(
                "{} checklist incomplete (unchecked lines: {:?}, count mismatches: {})",
                self.stage,
                unchecked,
                mismatches.len()
            )));
        }

        Ok(vec![OrderEvent::StageAdvanced(StageAdvanced {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            from: self.stage,
            to,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_payment(&self, cmd: &RecordOrderPayment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.order_id)?;

        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::invariant("cannot take payment on a cancelled order"));
        }
        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        if self.balance() == 0 {
            return Err(DomainError::invariant("order is fully paid"));
        }
        if cmd.amount > self.balance() {
            return Err(DomainError::invariant("cannot overpay order"));
        }

        let new_total_paid = self
            .paid()
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;

        Ok(vec![OrderEvent::OrderPaymentRecorded(OrderPaymentRecorded {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            payment_no: self.payments_count + 1,
            amount: cmd.amount,
            new_total_paid,
            balance: self.amount - new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_delivered(&self, cmd: &MarkDelivered) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.order_id)?;
        self.ensure_in_progress()?;

        if self.stage != Stage::Delivery {
            return Err(DomainError::invariant(format!(
                "order is at stage '{}' and cannot be handed over yet",
                self.stage
            )));
        }
        if !self.current_checklist_complete() {
            return Err(DomainError::invariant("delivery checklist incomplete"));
        }

        Ok(vec![OrderEvent::OrderDelivered(OrderDelivered {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            outstanding_balance: self.balance(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.order_id)?;

        match self.status {
            OrderStatus::Delivered => {
                return Err(DomainError::invariant("delivered orders cannot be cancelled"));
            }
            OrderStatus::Cancelled => {
                return Err(DomainError::conflict("order is already cancelled"));
            }
            OrderStatus::InProgress => {}
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            shop_id: cmd.shop_id,
            order_id: cmd.order_id,
            stage: self.stage,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

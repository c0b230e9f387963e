use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use washline_clients::ClientId;
use washline_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ShopId, line_total, sum_amounts};
use washline_events::Event;
use washline_orders::OrderId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(pub AggregateId);

impl BillId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BillId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    Open,
    PartiallyPaid,
    Paid,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillLine {
    pub description: String,
    pub quantity: u32,
    /// Price in smallest currency unit.
    pub unit_price: u64,
}

/// Aggregate root: Bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bill {
    id: BillId,
    shop_id: Option<ShopId>,
    client_id: Option<ClientId>,
    order_id: Option<OrderId>,
    status: BillStatus,
    lines: Vec<BillLine>,
    due_date: Option<DateTime<Utc>>,
    total_amount: u64,
    total_paid: u64,
    payments_count: u32,
    version: u64,
    created: bool,
}

impl Bill {
    pub fn empty(id: BillId) -> Self {
        Self {
            id,
            shop_id: None,
            client_id: None,
            order_id: None,
            status: BillStatus::Open,
            lines: Vec::new(),
            due_date: None,
            total_amount: 0,
            total_paid: 0,
            payments_count: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BillId {
        self.id
    }

    pub fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn total_paid(&self) -> u64 {
        self.total_paid
    }

    pub fn outstanding_amount(&self) -> u64 {
        match self.status {
            BillStatus::Void => 0,
            _ => self.total_amount.saturating_sub(self.total_paid),
        }
    }

    pub fn lines(&self) -> &[BillLine] {
        &self.lines
    }

    pub fn can_accept_payment(&self) -> bool {
        self.status != BillStatus::Void && self.outstanding_amount() > 0
    }
}

impl AggregateRoot for Bill {
    type Id = BillId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueBill {
    pub shop_id: ShopId,
    pub bill_id: BillId,
    pub client_id: ClientId,
    pub order_id: Option<OrderId>,
    pub lines: Vec<BillLine>,
    pub due_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBillPayment {
    pub shop_id: ShopId,
    pub bill_id: BillId,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidBill {
    pub shop_id: ShopId,
    pub bill_id: BillId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillCommand {
    IssueBill(IssueBill),
    RecordBillPayment(RecordBillPayment),
    VoidBill(VoidBill),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillIssued {
    pub shop_id: ShopId,
    pub bill_id: BillId,
    pub client_id: ClientId,
    pub order_id: Option<OrderId>,
    pub lines: Vec<BillLine>,
    pub due_date: DateTime<Utc>,
    pub total_amount: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPaymentRecorded {
    pub shop_id: ShopId,
    pub bill_id: BillId,
    pub payment_no: u32,
    pub amount: u64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub new_total_paid: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillVoided {
    pub shop_id: ShopId,
    pub bill_id: BillId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillEvent {
    BillIssued(BillIssued),
    BillPaymentRecorded(BillPaymentRecorded),
    BillVoided(BillVoided),
}

impl Event for BillEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BillEvent::BillIssued(_) => "billing.bill.issued",
            BillEvent::BillPaymentRecorded(_) => "billing.bill.payment_recorded",
            BillEvent::BillVoided(_) => "billing.bill.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BillEvent::BillIssued(e) => e.occurred_at,
            BillEvent::BillPaymentRecorded(e) => e.occurred_at,
            BillEvent::BillVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Bill {
    type Command = BillCommand;
    type Event = BillEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BillEvent::BillIssued(e) => {
                self.id = e.bill_id;
                self.shop_id = Some(e.shop_id);
                self.client_id = Some(e.client_id);
                self.order_id = e.order_id;
                self.lines = e.lines.clone();
                self.due_date = Some(e.due_date);
                self.total_amount = e.total_amount;
                self.total_paid = 0;
                self.payments_count = 0;
                self.status = BillStatus::Open;
                self.created = true;
            }
            BillEvent::BillPaymentRecorded(e) => {
                self.total_paid = e.new_total_paid;
                self.payments_count = e.payment_no;
                self.status = if self.total_paid >= self.total_amount {
                    BillStatus::Paid
                } else {
                    BillStatus::PartiallyPaid
                };
            }
            BillEvent::BillVoided(_) => {
                self.status = BillStatus::Void;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BillCommand::IssueBill(cmd) => self.handle_issue(cmd),
            BillCommand::RecordBillPayment(cmd) => self.handle_record_payment(cmd),
            BillCommand::VoidBill(cmd) => self.handle_void(cmd),
        }
    }
}

impl Bill {
    fn ensure_exists(&self, shop_id: ShopId, bill_id: BillId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.shop_id != Some(shop_id) {
            return Err(DomainError::invariant("shop mismatch"));
        }
        if self.id != bill_id {
            return Err(DomainError::invariant("bill_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueBill) -> Result<Vec<BillEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bill already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot issue bill without lines"));
        }

        let mut amounts = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if line.description.trim().is_empty() {
                return Err(DomainError::validation("bill line description cannot be empty"));
            }
            if line.quantity == 0 {
                return Err(DomainError::validation("bill line quantity must be positive"));
            }
            if line.unit_price == 0 {
                return Err(DomainError::validation("bill line unit_price must be positive"));
            }
            amounts.push(line_total(u64::from(line.quantity), line.unit_price)?);
        }
        let total_amount = sum_amounts(amounts)?;

        Ok(vec![BillEvent::BillIssued(BillIssued {
            shop_id: cmd.shop_id,
            bill_id: cmd.bill_id,
            client_id: cmd.client_id,
            order_id: cmd.order_id,
            lines: cmd.lines.clone(),
            due_date: cmd.due_date,
            total_amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(&self, cmd: &RecordBillPayment) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.bill_id)?;

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "cannot record payment on void or fully paid bill",
            ));
        }
        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }

        let new_total_paid = self
            .total_paid
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;
        if new_total_paid > self.total_amount {
            return Err(DomainError::invariant("cannot overpay bill"));
        }

        Ok(vec![BillEvent::BillPaymentRecorded(BillPaymentRecorded {
            shop_id: cmd.shop_id,
            bill_id: cmd.bill_id,
            payment_no: self.payments_count + 1,
            amount: cmd.amount,
            method: cmd.method,
            reference: cmd.reference.clone(),
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidBill) -> Result<Vec<BillEvent>, DomainError> {
        self.ensure_exists(cmd.shop_id, cmd.bill_id)?;

        match self.status {
            BillStatus::Void => return Err(DomainError::conflict("bill is already void")),
            BillStatus::Paid => {
                return Err(DomainError::invariant("a fully paid bill cannot be voided"));
            }
            BillStatus::Open | BillStatus::PartiallyPaid => {}
        }

        Ok(vec![BillEvent::BillVoided(BillVoided {
            shop_id: cmd.shop_id,
            bill_id: cmd.bill_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use washline_events::execute;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn issued(shop_id: ShopId, bill_id: BillId) -> Bill {
        let mut bill = Bill::empty(bill_id);
        execute(
            &mut bill,
            &BillCommand::IssueBill(IssueBill {
                shop_id,
                bill_id,
                client_id: ClientId::new(AggregateId::new()),
                order_id: None,
                lines: vec![
                    BillLine {
                        description: "Monthly linen service".to_string(),
                        quantity: 1,
                        unit_price: 5_000,
                    },
                    BillLine {
                        description: "Express surcharge".to_string(),
                        quantity: 2,
                        unit_price: 250,
                    },
                ],
                due_date: test_time() + Duration::days(14),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        bill
    }

    fn pay(shop_id: ShopId, bill_id: BillId, amount: u64) -> BillCommand {
        BillCommand::RecordBillPayment(RecordBillPayment {
            shop_id,
            bill_id,
            amount,
            method: PaymentMethod::Cash,
            reference: None,
            occurred_at: test_time(),
        })
    }

    fn void(shop_id: ShopId, bill_id: BillId) -> BillCommand {
        BillCommand::VoidBill(VoidBill {
            shop_id,
            bill_id,
            reason: Some("duplicate".to_string()),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn issue_totals_lines() {
        let bill = issued(ShopId::new(), BillId::new(AggregateId::new()));
        assert_eq!(bill.total_amount(), 5_500);
        assert_eq!(bill.outstanding_amount(), 5_500);
        assert_eq!(bill.status(), BillStatus::Open);
    }

    #[test]
    fn partial_then_full_payment_updates_status() {
        let shop_id = ShopId::new();
        let bill_id = BillId::new(AggregateId::new());
        let mut bill = issued(shop_id, bill_id);

        let events = execute(&mut bill, &pay(shop_id, bill_id, 2_000)).unwrap();
        match &events[0] {
            BillEvent::BillPaymentRecorded(e) => {
                assert_eq!(e.payment_no, 1);
                assert_eq!(e.new_total_paid, 2_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(bill.status(), BillStatus::PartiallyPaid);

        execute(&mut bill, &pay(shop_id, bill_id, 3_500)).unwrap();
        assert_eq!(bill.status(), BillStatus::Paid);
        assert_eq!(bill.outstanding_amount(), 0);
    }

    #[test]
    fn cannot_overpay_bill() {
        let shop_id = ShopId::new();
        let bill_id = BillId::new(AggregateId::new());
        let bill = issued(shop_id, bill_id);

        let err = bill.handle(&pay(shop_id, bill_id, 5_501)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("cannot overpay bill") => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn void_bill_owes_nothing_and_refuses_payment() {
        let shop_id = ShopId::new();
        let bill_id = BillId::new(AggregateId::new());
        let mut bill = issued(shop_id, bill_id);

        execute(&mut bill, &pay(shop_id, bill_id, 500)).unwrap();
        execute(&mut bill, &void(shop_id, bill_id)).unwrap();

        assert_eq!(bill.status(), BillStatus::Void);
        assert_eq!(bill.outstanding_amount(), 0);
        assert!(matches!(
            bill.handle(&pay(shop_id, bill_id, 100)),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(matches!(bill.handle(&void(shop_id, bill_id)), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn paid_bill_cannot_be_voided() {
        let shop_id = ShopId::new();
        let bill_id = BillId::new(AggregateId::new());
        let mut bill = issued(shop_id, bill_id);
        execute(&mut bill, &pay(shop_id, bill_id, 5_500)).unwrap();

        assert!(matches!(
            bill.handle(&void(shop_id, bill_id)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn line_validation() {
        let bill_id = BillId::new(AggregateId::new());
        let err = Bill::empty(bill_id)
            .handle(&BillCommand::IssueBill(IssueBill {
                shop_id: ShopId::new(),
                bill_id,
                client_id: ClientId::new(AggregateId::new()),
                order_id: None,
                lines: vec![BillLine {
                    description: "Ironing".to_string(),
                    quantity: 0,
                    unit_price: 100,
                }],
                due_date: test_time(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn total_paid_never_exceeds_total(
            payments in prop::collection::vec(1u64..3_000, 1..15)
        ) {
            let shop_id = ShopId::new();
            let bill_id = BillId::new(AggregateId::new());
            let mut bill = issued(shop_id, bill_id);

            for amount in payments {
                let _ = execute(&mut bill, &pay(shop_id, bill_id, amount));
                prop_assert!(bill.total_paid() <= bill.total_amount());
                prop_assert_eq!(
                    bill.outstanding_amount(),
                    bill.total_amount() - bill.total_paid()
                );
            }
        }
    }
}

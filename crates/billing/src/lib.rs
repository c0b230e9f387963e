//! Client billing (event-sourced).
//!
//! Bills are issued against a client, optionally for a specific order, and are
//! settled by one or more bill payments.

pub mod bill;

pub use bill::{
    Bill, BillCommand, BillEvent, BillId, BillIssued, BillLine, BillPaymentRecorded, BillStatus,
    BillVoided, IssueBill, PaymentMethod, RecordBillPayment, VoidBill,
};

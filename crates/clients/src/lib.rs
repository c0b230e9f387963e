//! Client accounts of a laundry shop (event-sourced).
//!
//! A client carries contact details and a running balance fed by a transaction
//! ledger: every entry adds `amount - deposit` to what the client owes.

pub mod client;

pub use client::{
    Client, ClientCommand, ClientDeactivated, ClientDetailsUpdated, ClientEvent, ClientId,
    ClientReactivated, ClientRegistered, ClientStatus, ContactInfo, DeactivateClient, LedgerEntry,
    ReactivateClient, RecordTransaction, RegisterClient, TransactionRecorded, UpdateClientDetails,
};

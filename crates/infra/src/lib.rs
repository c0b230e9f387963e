//! Infrastructure layer: event storage, command dispatch, read models and the
//! shop-facing renderings built on top of them.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod receipts;
pub mod search;

#[cfg(test)]
mod integration_tests;

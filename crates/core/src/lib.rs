//! `washline-core`: domain building blocks shared by every laundry module.
//!
//! Pure domain primitives only: identifiers, the error model, aggregate traits
//! and money arithmetic. No IO lives here.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, ShopId, UserId};
pub use money::{line_total, sum_amounts};

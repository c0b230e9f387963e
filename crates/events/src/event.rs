use chrono::{DateTime, Utc};

/// A domain fact.
///
/// Events are immutable, append-only and carry a schema version so stored
/// payloads can evolve.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"orders.order.stage_advanced"`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32;

    /// Business time at which the fact happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}

//! Per-stream cursors shared by every projection.
//!
//! A cursor remembers the last `sequence_number` applied for a
//! `(shop_id, aggregate_id)` stream. Redelivered envelopes at or below the
//! cursor are skipped; an envelope that jumps ahead of `cursor + 1` is a gap
//! and is rejected so the projection never silently loses an event.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use washline_core::{AggregateId, ShopId};
use washline_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize {aggregate_type} event: {message}")]
    Deserialize {
        aggregate_type: String,
        message: String,
    },

    #[error("shop isolation violation: {0}")]
    ShopIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Outcome of checking an envelope against its stream cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorCheck {
    Apply,
    /// Already applied; redelivery.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct StreamCursors {
    inner: RwLock<HashMap<(ShopId, AggregateId), u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, shop_id: ShopId, aggregate_id: AggregateId) -> u64 {
        self.inner
            .read()
            .ok()
            .and_then(|c| c.get(&(shop_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    pub fn check(
        &self,
        shop_id: ShopId,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> Result<CursorCheck, ProjectionError> {
        let last = self.position(shop_id, aggregate_id);
        if sequence_number == 0 || sequence_number > last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            return Ok(CursorCheck::Duplicate);
        }
        Ok(CursorCheck::Apply)
    }

    pub fn advance(&self, shop_id: ShopId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut c) = self.inner.write() {
            c.insert((shop_id, aggregate_id), sequence_number);
        }
    }

    pub fn clear_shop(&self, shop_id: ShopId) {
        if let Ok(mut c) = self.inner.write() {
            c.retain(|(s, _), _| *s != shop_id);
        }
    }
}

/// Decode an envelope payload into a domain event enum.
pub(crate) fn decode<E>(envelope: &EventEnvelope<JsonValue>) -> Result<E, ProjectionError>
where
    E: serde::de::DeserializeOwned,
{
    serde_json::from_value(envelope.payload().clone()).map_err(|e| ProjectionError::Deserialize {
        aggregate_type: envelope.aggregate_type().to_string(),
        message: e.to_string(),
    })
}

/// Reject events whose own ids disagree with the envelope carrying them.
pub(crate) fn ensure_same_stream(
    envelope: &EventEnvelope<JsonValue>,
    shop_id: ShopId,
    aggregate_id: AggregateId,
) -> Result<(), ProjectionError> {
    if shop_id != envelope.shop_id() {
        return Err(ProjectionError::ShopIsolation(
            "event shop_id does not match envelope shop_id".to_string(),
        ));
    }
    if aggregate_id != envelope.aggregate_id() {
        return Err(ProjectionError::ShopIsolation(
            "event aggregate id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}

/// Shops present in a batch, deduplicated.
pub(crate) fn shops_of(envelopes: &[EventEnvelope<JsonValue>]) -> Vec<ShopId> {
    let mut shops: Vec<_> = envelopes.iter().map(|e| e.shop_id()).collect();
    shops.sort();
    shops.dedup();
    shops
}

/// Deterministic replay order: shop, aggregate, sequence.
pub(crate) fn replay_order(envelopes: &mut [EventEnvelope<JsonValue>]) {
    envelopes.sort_by_key(|e| (e.shop_id(), e.aggregate_id(), e.sequence_number()));
}

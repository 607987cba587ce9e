//! Sequence-backed identity generation.
//!
//! Each generator key holds a small counter: one database round trip yields
//! `increment_by` identities. Requests for the same key serialize on that
//! key's mutex; different keys never contend.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tracing::trace;

use crate::error::TwoWayResult;

/// Supplies the next value of a database sequence.
pub trait SequenceSource {
    fn next_value(&self, sequence: &str) -> TwoWayResult<i64>;
}

impl<F> SequenceSource for F
where
    F: Fn(&str) -> TwoWayResult<i64>,
{
    fn next_value(&self, sequence: &str) -> TwoWayResult<i64> {
        self(sequence)
    }
}

#[derive(Debug, Default)]
struct Counter {
    base: i64,
    remaining: i64,
}

/// Process-wide identity cache keyed by entity and generator name.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    counters: DashMap<String, Arc<Mutex<Counter>>>,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next identity for `key`, refilling from `sequence` when the cached
    /// block is used up.
    pub fn next_id(
        &self,
        key: &str,
        sequence: &str,
        increment_by: i64,
        source: &dyn SequenceSource,
    ) -> TwoWayResult<i64> {
        let increment_by = increment_by.max(1);
        let counter = self.counters.entry(key.to_string()).or_default().clone();
        let mut counter = counter.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if counter.remaining <= 0 {
            counter.base = source.next_value(sequence)?;
            counter.remaining = increment_by;
            trace!(key, sequence, base = counter.base, "sequence refilled");
        }
        let id = counter.base + (increment_by - counter.remaining);
        counter.remaining -= 1;
        Ok(id)
    }
}

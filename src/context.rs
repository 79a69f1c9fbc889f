//! Per-run generator state: sequence counters, uniqueness sets, and the `db_lookup` cache.
//!
//! A fresh [`RunContext`] is created for each task execution ([`crate::executor`]) and is never
//! shared across concurrently running tasks, so two tasks generating the same field path never
//! see each other's sequence counters or uniqueness sets.

use std::collections::{HashMap, HashSet};

use num_bigint::BigInt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::value::Value;

/// Mutable state threaded through every generator call for a single task run.
pub struct RunContext {
    /// Already-emitted values for each field path declared unique, keyed by the field's
    /// canonical string form (see [`Value::canonical_string`]).
    unique_values: HashMap<String, HashSet<String>>,
    /// Running counters for `sequence`/`increment` and `date_sequence` rules, keyed by field
    /// path (date sequences additionally prefix the key with `"date_"`, matching the
    /// original system's counter-key convention).
    sequence_counters: HashMap<String, BigInt>,
    /// Cached rows fetched for `db_lookup` rules, keyed by `(data source name, table, column)`.
    db_lookup_cache: HashMap<(String, String, String), Vec<Value>>,
    /// The run's random number generator.
    pub rng: StdRng,
    /// Maximum number of retries before a uniqueness violation becomes
    /// [`crate::error::Error::UniquenessExhausted`].
    ///
    /// The original system retries unboundedly (recursing on collision), which can hang forever
    /// once a unique field's value space is exhausted; this cap is a deliberate improvement
    /// (see the REDESIGN FLAGS section of the governing spec).
    pub max_unique_retries: u32,
}

impl RunContext {
    /// Creates a fresh, empty context seeded from the system entropy source.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a fresh, empty context with an explicit RNG (deterministic in tests).
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            unique_values: HashMap::new(),
            sequence_counters: HashMap::new(),
            db_lookup_cache: HashMap::new(),
            rng,
            max_unique_retries: 1000,
        }
    }

    /// Returns `true` if `field` is new to its uniqueness set, recording it if so.
    ///
    /// Fields not declared unique always return `true` without recording anything.
    pub fn try_claim_unique(&mut self, field: &str, is_unique: bool, value: &Value) -> bool {
        if !is_unique {
            return true;
        }
        let set = self.unique_values.entry(field.to_owned()).or_default();
        set.insert(value.canonical_string())
    }

    /// Returns the next value of the sequence counter at `key`, initializing it to `start` on
    /// first use and advancing by `step` on every subsequent call.
    pub fn next_sequence(&mut self, key: &str, start: &BigInt, step: &BigInt) -> BigInt {
        match self.sequence_counters.get_mut(key) {
            Some(counter) => {
                *counter += step;
                counter.clone()
            }
            None => {
                self.sequence_counters.insert(key.to_owned(), start.clone());
                start.clone()
            }
        }
    }

    /// Returns the current count of a `date_sequence` counter at `key` (0 on first call),
    /// advancing it by 1 for the next call. Kept distinct from [`Self::next_sequence`] because
    /// date sequences advance a day-count, not the emitted value itself.
    pub fn next_date_sequence_count(&mut self, key: &str) -> i64 {
        let counter_key = format!("date_{key}");
        let counter = self.sequence_counters.entry(counter_key).or_insert_with(|| BigInt::from(0));
        let current = counter.clone();
        *counter += 1;
        // Date offsets are bounded by realistic run sizes; i64 is ample and keeps chrono's
        // `Duration` arithmetic simple.
        current.to_string().parse().unwrap_or(0)
    }

    /// Looks up a cached `db_lookup` column, calling `fetch` to populate it on a cache miss.
    pub fn db_lookup_cached(
        &mut self,
        data_source: &str,
        table: &str,
        column: &str,
        fetch: impl FnOnce() -> Vec<Value>,
    ) -> &[Value] {
        let key = (data_source.to_owned(), table.to_owned(), column.to_owned());
        self.db_lookup_cache.entry(key).or_insert_with(fetch)
    }

    /// Clears uniqueness-tracking state but preserves sequence counters, matching the original
    /// system's `Reset()` semantics (sequences stay continuous across resets; call
    /// [`Self::reset_sequences`] explicitly when that's not wanted).
    pub fn reset(&mut self) {
        self.unique_values.clear();
    }

    /// Clears sequence counters back to their start values.
    pub fn reset_sequences(&mut self) {
        self.sequence_counters.clear();
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_starts_at_configured_value_and_steps() {
        let mut ctx = RunContext::new();
        let start = BigInt::from(100);
        let step = BigInt::from(5);
        assert_eq!(ctx.next_sequence("id", &start, &step), BigInt::from(100));
        assert_eq!(ctx.next_sequence("id", &start, &step), BigInt::from(105));
        assert_eq!(ctx.next_sequence("id", &start, &step), BigInt::from(110));
    }

    #[test]
    fn independent_fields_have_independent_counters() {
        let mut ctx = RunContext::new();
        let one = BigInt::from(1);
        assert_eq!(ctx.next_sequence("a", &one, &one), BigInt::from(1));
        assert_eq!(ctx.next_sequence("b", &one, &one), BigInt::from(1));
        assert_eq!(ctx.next_sequence("a", &one, &one), BigInt::from(2));
    }

    #[test]
    fn unique_claim_rejects_repeats_only_when_declared_unique() {
        let mut ctx = RunContext::new();
        let v = Value::from("x");
        assert!(ctx.try_claim_unique("email", true, &v));
        assert!(!ctx.try_claim_unique("email", true, &v));
        assert!(ctx.try_claim_unique("notes", false, &v));
        assert!(ctx.try_claim_unique("notes", false, &v));
    }

    #[test]
    fn reset_clears_uniqueness_but_not_sequences() {
        let mut ctx = RunContext::new();
        let one = BigInt::from(1);
        ctx.next_sequence("id", &one, &one);
        ctx.try_claim_unique("email", true, &Value::from("x"));
        ctx.reset();
        assert!(ctx.try_claim_unique("email", true, &Value::from("x")));
        assert_eq!(ctx.next_sequence("id", &one, &one), BigInt::from(2));
    }
}

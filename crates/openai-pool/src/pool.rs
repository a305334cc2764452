//! Pool state and weighted random key selection
//!
//! The pool owns every configured key together with its weight and validity
//! flag. Selection draws a uniform value in `[0, total_active_weight)` and
//! walks the valid keys accumulating weights until the running sum passes the
//! draw, so each valid key is picked with probability `weight / total`.
//!
//! Validity is one-way: once a key is invalidated it never re-enters rotation
//! for the remainder of the process lifetime. Weights are immutable; keys with
//! weight zero stay in the pool but are never drawn.

use std::sync::Mutex;

use common::Secret;
use rand::RngExt;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Position of a key in the configured list, stable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(pub(crate) usize);

/// A selected key, ready to authorize one outbound request.
#[derive(Debug, Clone)]
pub struct SelectedKey {
    id: KeyId,
    token: Secret,
}

impl SelectedKey {
    /// Identity to report back to the pool when the call fails.
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// Raw token for the authorization header.
    pub fn token(&self) -> &str {
        self.token.expose()
    }

    /// Masked form for logging.
    pub fn fingerprint(&self) -> String {
        self.token.fingerprint()
    }
}

#[derive(Debug)]
struct KeyEntry {
    token: Secret,
    weight: u32,
    valid: bool,
}

#[derive(Debug)]
struct PoolState {
    entries: Vec<KeyEntry>,
    // Sum of weights over valid entries, maintained by invalidate() so a
    // concurrent select() never observes a half-applied recomputation.
    active_weight: u64,
}

/// Weighted key pool shared by all in-flight calls.
///
/// A single `Mutex` guards the entry list and the cached active-weight total.
/// Both `select` and `invalidate` are computation-only and never block on I/O,
/// so the critical sections are short and the pool can be called from any
/// number of concurrent tasks.
pub struct KeyPool {
    state: Mutex<PoolState>,
}

impl KeyPool {
    /// Build a pool from configured `(token, weight)` pairs. All keys start
    /// valid; order is preserved for diagnostics snapshots.
    pub fn new(keys: impl IntoIterator<Item = (String, u32)>) -> Self {
        let entries: Vec<KeyEntry> = keys
            .into_iter()
            .map(|(token, weight)| KeyEntry {
                token: Secret::new(token),
                weight,
                valid: true,
            })
            .collect();
        let active_weight = entries.iter().map(|e| u64::from(e.weight)).sum();
        info!(keys = entries.len(), active_weight, "key pool initialized");
        Self {
            state: Mutex::new(PoolState {
                entries,
                active_weight,
            }),
        }
    }

    /// Select a key by weighted random draw over the valid entries.
    ///
    /// Returns `Exhausted` when no entry is drawable: the pool is empty, every
    /// key has been invalidated, or the surviving keys all have weight zero.
    /// The zero-weight case fails cleanly rather than dividing by zero.
    pub fn select(&self) -> Result<SelectedKey> {
        let state = self.state.lock().expect("key pool lock poisoned");
        if state.active_weight == 0 {
            return Err(Error::Exhausted {
                total: state.entries.len(),
                invalid: state.entries.iter().filter(|e| !e.valid).count(),
            });
        }

        let draw = rand::rng().random_range(0..state.active_weight);
        let mut acc = 0u64;
        for (idx, entry) in state.entries.iter().enumerate() {
            if !entry.valid || entry.weight == 0 {
                continue;
            }
            acc += u64::from(entry.weight);
            if draw < acc {
                return Ok(SelectedKey {
                    id: KeyId(idx),
                    token: entry.token.clone(),
                });
            }
        }

        // The cumulative walk covers [0, active_weight), so the draw always
        // lands inside some entry while the invariant above holds.
        unreachable!("weighted draw out of range: draw={draw} total={}", state.active_weight)
    }

    /// Permanently remove a key from rotation.
    ///
    /// Idempotent and safe under concurrent invocation for the same key; the
    /// first call flips the flag and subtracts the key's weight from the
    /// active total, later calls are no-ops. Returns whether this call
    /// performed the transition.
    pub fn invalidate(&self, id: KeyId) -> bool {
        let mut state = self.state.lock().expect("key pool lock poisoned");
        let Some(entry) = state.entries.get_mut(id.0) else {
            return false;
        };
        if !entry.valid {
            return false;
        }
        entry.valid = false;
        let weight = u64::from(entry.weight);
        let fingerprint = entry.token.fingerprint();
        state.active_weight -= weight;
        metrics::counter!("pool_key_invalidations_total").increment(1);
        warn!(
            key = %fingerprint,
            remaining_weight = state.active_weight,
            "api key invalidated, removed from rotation"
        );
        true
    }

    /// Snapshot of invalidated keys as masked fingerprints, in configured
    /// order. This is the payload handed to the exhaustion notifier; raw
    /// secrets are never exposed here.
    pub fn invalidated(&self) -> Vec<String> {
        let state = self.state.lock().expect("key pool lock poisoned");
        state
            .entries
            .iter()
            .filter(|e| !e.valid)
            .map(|e| e.token.fingerprint())
            .collect()
    }

    /// Total number of configured keys.
    pub fn len(&self) -> usize {
        self.state.lock().expect("key pool lock poisoned").entries.len()
    }

    /// Whether the pool was configured with zero keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of keys still in rotation.
    pub fn active_len(&self) -> usize {
        let state = self.state.lock().expect("key pool lock poisoned");
        state.entries.iter().filter(|e| e.valid).count()
    }

    /// Pool health summary.
    ///
    /// Status mapping: all keys valid → healthy, some valid → degraded,
    /// none valid → exhausted.
    pub fn health(&self) -> serde_json::Value {
        let state = self.state.lock().expect("key pool lock poisoned");
        let total = state.entries.len();
        let active = state.entries.iter().filter(|e| e.valid).count();

        let keys: Vec<serde_json::Value> = state
            .entries
            .iter()
            .map(|e| {
                let status = if e.valid { "active" } else { "invalidated" };
                serde_json::json!({
                    "key": e.token.fingerprint(),
                    "weight": e.weight,
                    "status": status,
                })
            })
            .collect();

        let status = if active == total && total > 0 {
            "healthy"
        } else if active > 0 {
            "degraded"
        } else {
            "exhausted"
        };

        serde_json::json!({
            "status": status,
            "keys_total": total,
            "keys_active": active,
            "keys_invalidated": total - active,
            "active_weight": state.active_weight,
            "keys": keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(weights: &[u32]) -> KeyPool {
        KeyPool::new(
            weights
                .iter()
                .enumerate()
                .map(|(i, w)| (format!("sk-test-key-{i:04}"), *w)),
        )
    }

    #[test]
    fn select_returns_only_valid_keys() {
        let pool = pool(&[1, 1, 1]);
        pool.invalidate(KeyId(1));

        for _ in 0..200 {
            let key = pool.select().unwrap();
            assert_ne!(key.id(), KeyId(1), "invalidated key must never be drawn");
        }
    }

    #[test]
    fn empty_pool_is_exhausted() {
        let pool = pool(&[]);
        let err = pool.select().unwrap_err();
        assert!(matches!(err, Error::Exhausted { total: 0, invalid: 0 }));
    }

    #[test]
    fn all_zero_weights_fail_cleanly() {
        let pool = pool(&[0, 0]);
        let err = pool.select().unwrap_err();
        assert!(matches!(err, Error::Exhausted { total: 2, invalid: 0 }));
    }

    #[test]
    fn zero_weight_key_is_never_drawn() {
        let pool = pool(&[0, 5]);
        for _ in 0..100 {
            assert_eq!(pool.select().unwrap().id(), KeyId(1));
        }
    }

    #[test]
    fn selection_follows_weights() {
        // Weights 1 and 3: the second key should win ~75% of draws. With
        // 10_000 draws the standard deviation is ~43, so the generous bounds
        // below have astronomically low flake probability.
        let pool = pool(&[1, 3]);
        let mut heavy = 0u32;
        for _ in 0..10_000 {
            if pool.select().unwrap().id() == KeyId(1) {
                heavy += 1;
            }
        }
        assert!(
            (7_200..=7_800).contains(&heavy),
            "expected ~7500 draws of the weight-3 key, got {heavy}"
        );
    }

    #[test]
    fn invalidate_is_idempotent() {
        let pool = pool(&[2, 3]);
        assert!(pool.invalidate(KeyId(0)));
        let after_first = pool.health();

        assert!(!pool.invalidate(KeyId(0)));
        let after_second = pool.health();

        assert_eq!(after_first, after_second);
        assert_eq!(after_second["active_weight"], 3);
        assert_eq!(after_second["keys_active"], 1);
    }

    #[test]
    fn invalidate_unknown_id_is_a_noop() {
        let pool = pool(&[1]);
        assert!(!pool.invalidate(KeyId(7)));
        assert_eq!(pool.active_len(), 1);
    }

    #[test]
    fn exhaustion_happens_exactly_at_last_invalidation() {
        let pool = pool(&[1, 1, 1]);

        pool.invalidate(KeyId(0));
        assert!(pool.select().is_ok());
        pool.invalidate(KeyId(2));
        assert!(pool.select().is_ok());
        pool.invalidate(KeyId(1));

        let err = pool.select().unwrap_err();
        assert!(matches!(err, Error::Exhausted { total: 3, invalid: 3 }));
    }

    #[test]
    fn invalidated_snapshot_is_masked_and_ordered() {
        let pool = KeyPool::new([
            ("sk-live-aaaaaaaaaaaa".to_string(), 1),
            ("sk-live-bbbbbbbbbbbb".to_string(), 1),
        ]);
        pool.invalidate(KeyId(1));
        pool.invalidate(KeyId(0));

        let snapshot = pool.invalidated();
        assert_eq!(snapshot.len(), 2);
        // Configured order, not invalidation order.
        assert_eq!(snapshot[0], "sk-li\u{2026}aa");
        assert_eq!(snapshot[1], "sk-li\u{2026}bb");
        for fp in &snapshot {
            assert!(!fp.contains("aaaaaaaa") && !fp.contains("bbbbbbbb"));
        }
    }

    #[test]
    fn health_reports_degradation() {
        let pool = pool(&[1, 1]);
        assert_eq!(pool.health()["status"], "healthy");

        pool.invalidate(KeyId(0));
        let health = pool.health();
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["keys_invalidated"], 1);

        pool.invalidate(KeyId(1));
        assert_eq!(pool.health()["status"], "exhausted");
    }

    #[test]
    fn selection_never_returns_key_after_invalidation_under_contention() {
        let pool = std::sync::Arc::new(pool(&[1, 1]));

        std::thread::scope(|s| {
            for _ in 0..4 {
                let pool = pool.clone();
                s.spawn(move || {
                    for _ in 0..2_000 {
                        // Selection may legitimately return either key before
                        // the invalidation lands; it must never panic and the
                        // pool must stay internally consistent throughout.
                        let _ = pool.select();
                    }
                });
            }
            // Race the invalidation against the selectors.
            pool.invalidate(KeyId(0));
        });

        // Once invalidate() has returned, no later select may see the key.
        for _ in 0..500 {
            assert_eq!(pool.select().unwrap().id(), KeyId(1));
        }
        let health = pool.health();
        assert_eq!(health["active_weight"], 1);
        assert_eq!(health["keys_active"], 1);
    }

    #[test]
    fn concurrent_invalidation_of_same_key_applies_once() {
        let pool = std::sync::Arc::new(pool(&[4, 1]));

        let transitions: usize = std::thread::scope(|s| {
            (0..8)
                .map(|_| {
                    let pool = pool.clone();
                    s.spawn(move || usize::from(pool.invalidate(KeyId(0))))
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .sum()
        });

        assert_eq!(transitions, 1, "exactly one caller performs the transition");
        assert_eq!(pool.health()["active_weight"], 1);
    }

    #[test]
    fn selected_key_debug_does_not_leak_token() {
        let pool = KeyPool::new([("sk-live-supersecretvalue".to_string(), 1)]);
        let key = pool.select().unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains("supersecret"), "got: {debug}");
    }
}

//! Reservation ledger — holder bookkeeping per resource pool.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use rig_core::{PoolName, ResourceRequirement, RunId};

struct Inner {
    /// Configured shared-pool capacities. Pools without an entry are
    /// exclusive: any holder blocks any other requester.
    capacities: HashMap<PoolName, u32>,
    /// Current holds: pool → (run → units held).
    holds: HashMap<PoolName, HashMap<RunId, u32>>,
}

/// The resource reservation ledger.
///
/// Two runs with overlapping requirement sets can never both hold their
/// reservations; two runs with disjoint sets are unaffected by each other.
pub struct ReservationLedger {
    inner: Mutex<Inner>,
}

impl ReservationLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacities: HashMap::new(),
                holds: HashMap::new(),
            }),
        }
    }

    /// Declare a shared pool with a fixed capacity. Holds against it are
    /// counted instead of exclusive.
    pub fn with_capacity(self, provider: &str, pool: &str, capacity: u32) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .capacities
                .insert(PoolName::new(provider, pool), capacity);
        }
        self
    }

    /// Atomically reserve every requirement in the set for `run`.
    ///
    /// If any single requirement cannot be satisfied, nothing is reserved
    /// and `false` is returned. No partial reservation is ever observable.
    pub fn try_acquire(&self, run: RunId, requirements: &[ResourceRequirement]) -> bool {
        let mut inner = self.inner.lock().unwrap();

        // A set may name the same pool more than once; admission is judged
        // against the summed need.
        let mut needed: HashMap<&PoolName, u32> = HashMap::new();
        for req in requirements {
            *needed.entry(&req.pool).or_insert(0) += req.count;
        }

        for (&pool, &count) in &needed {
            match inner.capacities.get(pool) {
                Some(&capacity) => {
                    let held: u32 = inner
                        .holds
                        .get(pool)
                        .map(|h| h.values().sum())
                        .unwrap_or(0);
                    if held + count > capacity {
                        debug!(pool = %pool, held, count, capacity, "reservation refused");
                        return false;
                    }
                }
                None => {
                    if inner.holds.get(pool).is_some_and(|h| !h.is_empty()) {
                        debug!(pool = %pool, "reservation refused, pool exclusively held");
                        return false;
                    }
                }
            }
        }

        for (pool, count) in needed {
            *inner
                .holds
                .entry(pool.clone())
                .or_default()
                .entry(run)
                .or_insert(0) += count;
        }
        debug!(%run, pools = requirements.len(), "resources reserved");
        true
    }

    /// Clear `run`'s holds on the given requirements.
    ///
    /// Safe to call repeatedly or for requirements that were never
    /// acquired; each entry is an idempotent no-op once cleared.
    pub fn release(&self, run: RunId, requirements: &[ResourceRequirement]) {
        let mut inner = self.inner.lock().unwrap();
        for req in requirements {
            if let Some(holders) = inner.holds.get_mut(&req.pool) {
                if holders.remove(&run).is_some() {
                    debug!(%run, pool = %req.pool, "reservation released");
                }
                if holders.is_empty() {
                    inner.holds.remove(&req.pool);
                }
            }
        }
    }

    /// Runs currently holding capacity from `pool`.
    pub fn holders(&self, pool: &PoolName) -> Vec<RunId> {
        let inner = self.inner.lock().unwrap();
        inner
            .holds
            .get(pool)
            .map(|h| h.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Pools on which `run` currently holds capacity.
    pub fn held_by(&self, run: RunId) -> Vec<PoolName> {
        let inner = self.inner.lock().unwrap();
        inner
            .holds
            .iter()
            .filter(|(_, holders)| holders.contains_key(&run))
            .map(|(pool, _)| pool.clone())
            .collect()
    }
}

impl Default for ReservationLedger {
    fn default() -> Self {
        Self::new()
    }
}

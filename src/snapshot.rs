//! Last-known-good snapshots per resource class
//!
//! Pollers are the only writers; presentation collaborators read. Each
//! slot holds an `Arc` that is swapped wholesale on success, so readers
//! never observe a torn value and failures never clear data: consumers
//! keep seeing the last-known-good state through an outage.

use crate::models::{Charge, ChargePoint, Wallet, WalletTransaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Wallet balance and first page of transactions, fetched together
#[derive(Debug, Clone, Default)]
pub struct WalletSnapshot {
    pub wallet: Wallet,
    pub transactions: Vec<WalletTransaction>,
}

/// Holds the latest successfully fetched value per resource class
#[derive(Default)]
pub struct SnapshotStore {
    charge_points: RwLock<Option<Arc<HashMap<u64, ChargePoint>>>>,
    charges: RwLock<Option<Arc<HashMap<u64, Charge>>>>,
    wallet: RwLock<Option<Arc<WalletSnapshot>>>,
    generation: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest charge point reference set, keyed by id
    pub fn charge_points(&self) -> Option<Arc<HashMap<u64, ChargePoint>>> {
        self.read(&self.charge_points)
    }

    /// Latest charge per charge point
    pub fn charges(&self) -> Option<Arc<HashMap<u64, Charge>>> {
        self.read(&self.charges)
    }

    /// Latest wallet state
    pub fn wallet(&self) -> Option<Arc<WalletSnapshot>> {
        self.read(&self.wallet)
    }

    /// Replace the charge point reference set wholesale
    pub fn set_charge_points(&self, charge_points: HashMap<u64, ChargePoint>) {
        self.write(&self.charge_points, Arc::new(charge_points));
    }

    /// Replace the wallet snapshot
    pub fn set_wallet(&self, snapshot: WalletSnapshot) {
        self.write(&self.wallet, Arc::new(snapshot));
    }

    /// Record the most recent charge for one charge point. `None` means
    /// the fetch succeeded and the point has no charges.
    pub fn set_charge(&self, charge_point_id: u64, charge: Option<Charge>) {
        let mut next: HashMap<u64, Charge> = self
            .charges()
            .map(|current| current.as_ref().clone())
            .unwrap_or_default();
        match charge {
            Some(charge) => {
                next.insert(charge_point_id, charge);
            }
            None => {
                next.remove(&charge_point_id);
            }
        }
        self.write(&self.charges, Arc::new(next));
    }

    /// Drop charge entries for charge points no longer in the reference
    /// set. Called after a wholesale charge point refresh.
    pub fn prune_charges(&self, known_ids: &[u64]) {
        let Some(current) = self.charges() else {
            return;
        };
        if current.keys().all(|id| known_ids.contains(id)) {
            return;
        }
        let next: HashMap<u64, Charge> = current
            .iter()
            .filter(|(id, _)| known_ids.contains(id))
            .map(|(id, charge)| (*id, charge.clone()))
            .collect();
        self.write(&self.charges, Arc::new(next));
    }

    /// Monotonic counter incremented on every write, for change detection
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn read<T>(&self, slot: &RwLock<Option<Arc<T>>>) -> Option<Arc<T>> {
        slot.read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn write<T>(&self, slot: &RwLock<Option<Arc<T>>>, value: Arc<T>) {
        *slot
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(value);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Addresses already claimed for a balance lookup in this run, with the
/// balance observed at first sight once the lookup completes.
///
/// [`SeenAddressSet::try_reserve`] is the only way in: the check and the insert
/// happen under one lock, so concurrent workers can never both win the same
/// address.
#[derive(Debug, Default)]
pub struct SeenAddressSet {
    entries: Mutex<HashMap<Address, Option<U256>>>,
}

impl SeenAddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the set with already-known balances (for example from a checkpoint).
    pub fn seeded(entries: impl IntoIterator<Item = (Address, U256)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(address, balance)| (address, Some(balance)))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    /// Claims `address` for a lookup. Returns `true` only for the first caller.
    pub fn try_reserve(&self, address: Address) -> bool {
        let mut entries = self.lock();
        match entries.entry(address) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(None);
                true
            }
        }
    }

    /// Records the looked-up balance. Returns `false` if a balance was already
    /// stored for the address, in which case the existing value is kept.
    pub fn record_balance(&self, address: Address, balance: U256) -> bool {
        let mut entries = self.lock();
        let slot = entries.entry(address).or_insert(None);
        if slot.is_some() {
            return false;
        }
        *slot = Some(balance);
        true
    }

    #[cfg(test)]
    fn balance_of(&self, address: &Address) -> Option<U256> {
        self.lock().get(address).copied().flatten()
    }

    #[cfg(test)]
    fn contains(&self, address: &Address) -> bool {
        self.lock().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Address, Option<U256>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

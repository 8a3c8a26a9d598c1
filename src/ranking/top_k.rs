//! Bounded, always-sorted ranking of the largest holders.

use super::holder::Holder;
use alloy_primitives::U256;

/// Result of offering a candidate to a [`TopKSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Set was below capacity; the holder was inserted.
    Inserted,
    /// Set was full; the holder displaced the returned previous minimum.
    Replaced(Holder),
    /// Zero balance, or not larger than the current minimum of a full set.
    Discarded,
}

/// Holders kept in ascending balance order, never more than `capacity` of
/// them. The first element is always the next eviction candidate.
#[derive(Debug, Clone)]
pub struct TopKSet {
    capacity: usize,
    holders: Vec<Holder>,
}

impl TopKSet {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "top-k capacity must be greater than zero");
        Self {
            capacity,
            holders: Vec::new(),
        }
    }

    /// Builds a set from previously ranked holders in any order, keeping the
    /// largest `capacity` of them.
    pub fn from_holders(capacity: usize, holders: impl IntoIterator<Item = Holder>) -> Self {
        let mut set = Self::new(capacity);
        for holder in holders {
            set.offer(holder);
        }
        set
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.holders.len() >= self.capacity
    }

    pub fn min(&self) -> Option<&Holder> {
        self.holders.first()
    }

    pub fn min_balance(&self) -> Option<U256> {
        self.min().map(|holder| holder.balance)
    }

    /// Ascending view.
    pub fn as_slice(&self) -> &[Holder] {
        &self.holders
    }

    /// Copy of the holders, largest balance first.
    pub fn descending(&self) -> Vec<Holder> {
        self.holders.iter().rev().copied().collect()
    }

    pub fn offer(&mut self, holder: Holder) -> Offer {
        if holder.balance.is_zero() {
            return Offer::Discarded;
        }

        if !self.is_full() {
            self.insert_sorted(holder);
            return Offer::Inserted;
        }

        match self.min_balance() {
            Some(min) if holder.balance > min => {
                let evicted = self.holders.remove(0);
                self.insert_sorted(holder);
                Offer::Replaced(evicted)
            }
            _ => Offer::Discarded,
        }
    }

    fn insert_sorted(&mut self, holder: Holder) {
        let position = self.holders.partition_point(|existing| *existing < holder);
        self.holders.insert(position, holder);
    }
}

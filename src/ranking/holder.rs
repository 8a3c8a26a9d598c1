use alloy_primitives::{Address, U256};
use std::cmp::Ordering;
use std::fmt;

/// An address paired with its balance (wei) at the scan's reference block.
///
/// Holders order by balance; equal balances fall back to the address so the
/// ordering is total and stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Holder {
    pub address: Address,
    pub balance: U256,
}

impl Holder {
    pub fn new(address: Address, balance: U256) -> Self {
        Self { address, balance }
    }
}

impl Ord for Holder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.balance
            .cmp(&other.balance)
            .then_with(|| self.address.cmp(&other.address))
    }
}

impl PartialOrd for Holder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.address, self.balance)
    }
}

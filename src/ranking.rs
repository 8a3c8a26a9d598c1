//! Bounded top-K ranking, address deduplication and the single-writer task
//! that applies scanner candidates.

pub mod holder;
pub mod maintainer;
pub mod seen;
pub mod top_k;

pub use holder::Holder;
pub use maintainer::{MaintainerSummary, RankingMaintainer, ScannedBlock, SharedRanking};
pub use seen::SeenAddressSet;
pub use top_k::{Offer, TopKSet};

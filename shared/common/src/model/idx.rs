//! Per-year monotonic identifier counter.

use serde::{Deserialize, Serialize};

/// One document per calendar year, mutated only under transactional
/// increment by the Match Reconciler when minting a new `xmatch_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdxCounter {
    pub current_idx: u64,
}

impl IdxCounter {
    #[must_use]
    pub const fn zero() -> Self {
        Self { current_idx: 0 }
    }
}

pub mod block;
pub mod model;

use std::sync::{Arc, RwLock};

pub use block::Block;
pub use model::{Ledger, mine_pending};

/// Difficulty bounds (keep low in dev to avoid long waits). The nonce search
/// has no reachable target past the 64 hex digits of a sha256 hash.
pub const DIFF_MIN: u32 = 1;
pub const DIFF_MAX: u32 = 6;

/// The one lock guarding all shared ledger state (chain + pending pool).
/// Writers (submit, append) are exclusive; balance replays share read access
/// and can never observe a mid-append chain.
pub type SharedLedger = Arc<RwLock<Ledger>>;

use thiserror::Error;

/// Errors surfaced by the ledger and the orchestrator. Strategy loops never
/// propagate these; they log and continue with the next tick.
#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// The chain head moved between mining and append; the block belongs to a
    /// spent pending-pool generation and must be discarded.
    #[error("stale block: chain head moved before append")]
    StaleBlock,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),
}

//! In-process agent economy on a proof-of-work ledger.
//!
//! Autonomous agents earn currency through mining, trading and service
//! provision. All value flows through one shared [`Ledger`]; balances are
//! replayed from the chain on every read, never cached. The [`Orchestrator`]
//! owns every store and drives all strategy ticks from a single scheduler
//! task, scaling the population up as the economy grows.

pub mod agent;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod transaction;
pub mod wallet;

pub use agent::{Agent, AgentId, StrategyKind};
pub use blockchain::{Block, Ledger, SharedLedger};
pub use config::EconomyConfig;
pub use error::EconomyError;
pub use orchestrator::{AgentStats, Orchestrator, SystemStats};
pub use transaction::Transaction;
pub use wallet::{Wallet, WalletRegistry};

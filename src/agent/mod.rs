pub mod model;
pub mod scheduler;
pub mod strategy;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use model::{Agent, AgentId, ReinvestCategory, ReinvestmentTotals, StrategyKind};

/// Agent records indexed by handle, shared between the orchestrator and the
/// scheduler task.
pub type SharedAgents = Arc<RwLock<HashMap<AgentId, Agent>>>;

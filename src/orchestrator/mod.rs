pub mod model;

pub use model::{AgentStats, Orchestrator, SystemStats};

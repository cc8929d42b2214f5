use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EconomyConfig;

/// Opaque handle to an agent managed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Earning strategies an agent can run; several may be active at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    Mining,
    Trading,
    ServiceProvision,
}

impl StrategyKind {
    /// Tick cadence of this strategy under the given configuration.
    pub fn interval(self, cfg: &EconomyConfig) -> Duration {
        match self {
            StrategyKind::Mining => cfg.mining_interval,
            StrategyKind::Trading => cfg.trading_interval,
            StrategyKind::ServiceProvision => cfg.service_interval,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Mining => "mining",
            StrategyKind::Trading => "trading",
            StrategyKind::ServiceProvision => "service-provision",
        };
        f.write_str(name)
    }
}

/// Scaling categories the reinvestment hook can allocate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReinvestCategory {
    CapacityUpgrade,
    CapitalIncrease,
    ServiceExpansion,
}

/// Cumulative reinvestment allocations per category. Policy record only;
/// nothing here feeds back into ledger state or earning rates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReinvestmentTotals {
    pub capacity_upgrade: u64,
    pub capital_increase: u64,
    pub service_expansion: u64,
}

impl ReinvestmentTotals {
    pub fn record(&mut self, category: ReinvestCategory, amount: u64) {
        let slot = match category {
            ReinvestCategory::CapacityUpgrade => &mut self.capacity_upgrade,
            ReinvestCategory::CapitalIncrease => &mut self.capital_increase,
            ReinvestCategory::ServiceExpansion => &mut self.service_expansion,
        };
        *slot = slot.saturating_add(amount);
    }

    pub fn total(&self) -> u64 {
        self.capacity_upgrade + self.capital_increase + self.service_expansion
    }
}

/// One autonomous participant: a wallet identity plus its running strategies.
///
/// `earnings` is the strategy-level income metric (what the agent's ticks
/// generated), not the confirmed balance, which is always replayed from the
/// chain. `last_recorded_balance` feeds the mining strategy's earned-delta
/// computation.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub address: String,
    strategies: HashSet<StrategyKind>,
    pub earnings: u64,
    pub last_recorded_balance: i128,
    pub reinvested: ReinvestmentTotals,
    pub is_active: bool,
}

impl Agent {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            address: address.into(),
            strategies: HashSet::new(),
            earnings: 0,
            last_recorded_balance: 0,
            reinvested: ReinvestmentTotals::default(),
            is_active: true,
        }
    }

    /// Add a strategy to the active set. Returns `false` if it was already
    /// running (adding is idempotent).
    pub fn add_strategy(&mut self, kind: StrategyKind) -> bool {
        self.strategies.insert(kind)
    }

    pub fn runs(&self, kind: StrategyKind) -> bool {
        self.strategies.contains(&kind)
    }

    pub fn strategies(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.strategies.iter().copied()
    }

    /// Halt the agent: every periodic strategy of this agent stops by the
    /// next tick boundary.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}

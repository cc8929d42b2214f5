use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::blockchain::{DIFF_MAX, DIFF_MIN};

/// All simulation parameters in one place. The randomized thresholds and
/// yields are placeholders for real economic models; callers tune them here
/// instead of reading magic numbers out of strategy code.
#[derive(Debug, Clone)]
pub struct EconomyConfig {
    /// Proof-of-Work difficulty (number of leading zero hex digits).
    /// Dev values: 2 keeps a mining tick well under a second; 3 takes seconds.
    pub difficulty: u32,
    /// Block subsidy credited to the reward transaction of every mined block.
    pub mining_reward: u64,

    /// Base resolution of the strategy scheduler.
    pub scheduler_tick: Duration,

    /// Cadence of mining strategy ticks.
    pub mining_interval: Duration,
    /// A mining tick draws a hash-power value in [0, 1) and only mines when
    /// the draw reaches this threshold.
    pub mining_success_threshold: f64,
    /// Fraction of fresh mining earnings handed to the reinvestment hook.
    pub mining_reinvest_fraction: f64,

    /// Cadence of trading strategy ticks.
    pub trading_interval: Duration,
    /// Probability that a trading tick succeeds.
    pub trading_success_prob: f64,
    /// Fraction of cumulative earnings staked per trade.
    pub trading_stake_fraction: f64,
    /// Hard cap on a single trade's stake.
    pub trading_stake_cap: u64,
    /// Profit yield range; the realized yield is drawn uniformly from it.
    pub trading_yield_min: f64,
    pub trading_yield_max: f64,

    /// Cadence of service-provision ticks.
    pub service_interval: Duration,
    /// Flat earning range of one service tick.
    pub service_earning_min: u64,
    pub service_earning_max: u64,
    /// Fraction of each service earning handed to the reinvestment hook.
    pub service_reinvest_fraction: f64,

    /// Reinvestment below this amount is a silent no-op.
    pub reinvest_min: u64,

    /// Cadence of the orchestrator's balance monitor.
    pub monitor_interval: Duration,
    /// Aggregate confirmed balance beyond which one more agent is spawned.
    pub scale_balance_threshold: u64,
    /// Hard cap on the active-agent population.
    pub max_agents: usize,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            difficulty: 2,
            mining_reward: 50,
            scheduler_tick: Duration::from_millis(200),
            mining_interval: Duration::from_secs(2),
            mining_success_threshold: 0.5,
            mining_reinvest_fraction: 0.5,
            trading_interval: Duration::from_secs(3),
            trading_success_prob: 0.6,
            trading_stake_fraction: 0.10,
            trading_stake_cap: 100,
            trading_yield_min: 0.05,
            trading_yield_max: 0.25,
            service_interval: Duration::from_secs(5),
            service_earning_min: 5,
            service_earning_max: 20,
            service_reinvest_fraction: 0.30,
            reinvest_min: 10,
            monitor_interval: Duration::from_secs(10),
            scale_balance_threshold: 1_000,
            max_agents: 10,
        }
    }
}

impl EconomyConfig {
    /// Defaults overlaid with `ECONOMY_*` environment variables (the binary
    /// loads `.env` first via dotenvy). Unset or unparsable values fall back
    /// to the default; parsed values are clamped into their operating bands.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            difficulty: env_parse("ECONOMY_DIFFICULTY", base.difficulty),
            mining_reward: env_parse("ECONOMY_MINING_REWARD", base.mining_reward),
            mining_interval: env_parse_ms("ECONOMY_MINING_INTERVAL_MS", base.mining_interval),
            trading_interval: env_parse_ms("ECONOMY_TRADING_INTERVAL_MS", base.trading_interval),
            service_interval: env_parse_ms("ECONOMY_SERVICE_INTERVAL_MS", base.service_interval),
            monitor_interval: env_parse_ms("ECONOMY_MONITOR_INTERVAL_MS", base.monitor_interval),
            scale_balance_threshold: env_parse(
                "ECONOMY_SCALE_THRESHOLD",
                base.scale_balance_threshold,
            ),
            max_agents: env_parse("ECONOMY_MAX_AGENTS", base.max_agents),
            ..base
        }
        .clamped()
    }

    /// Copy of `self` with every tunable forced into its operating band:
    /// difficulty between `DIFF_MIN` and `DIFF_MAX`, intervals non-zero,
    /// probabilities and fractions within [0, 1], value ranges ordered.
    /// `tokio::time::interval` panics on a zero period and `gen_bool` on a
    /// probability outside [0, 1]; difficulty is bounded by the hash length.
    pub fn clamped(mut self) -> Self {
        self.difficulty = self.difficulty.clamp(DIFF_MIN, DIFF_MAX);

        let floor = Duration::from_millis(1);
        self.scheduler_tick = self.scheduler_tick.max(floor);
        self.mining_interval = self.mining_interval.max(floor);
        self.trading_interval = self.trading_interval.max(floor);
        self.service_interval = self.service_interval.max(floor);
        self.monitor_interval = self.monitor_interval.max(floor);

        self.mining_success_threshold = self.mining_success_threshold.clamp(0.0, 1.0);
        self.mining_reinvest_fraction = self.mining_reinvest_fraction.clamp(0.0, 1.0);
        self.trading_success_prob = self.trading_success_prob.clamp(0.0, 1.0);
        self.trading_stake_fraction = self.trading_stake_fraction.clamp(0.0, 1.0);
        self.service_reinvest_fraction = self.service_reinvest_fraction.clamp(0.0, 1.0);

        if self.trading_yield_max < self.trading_yield_min {
            self.trading_yield_max = self.trading_yield_min;
        }
        if self.service_earning_max < self.service_earning_min {
            self.service_earning_max = self.service_earning_min;
        }
        self
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_parse_ms(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

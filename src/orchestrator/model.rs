use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::agent::{scheduler, Agent, AgentId, SharedAgents, StrategyKind};
use crate::blockchain::{Ledger, SharedLedger};
use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::transaction::Transaction;
use crate::wallet::{generate_wallet, sign_hash, Wallet, WalletRegistry};

/// Point-in-time view of one agent, balance included. Balances come from a
/// chain replay at snapshot time, so a stats call never disagrees with the
/// ledger it was taken from.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStats {
    pub name: String,
    pub address: String,
    pub balance: i128,
    pub earnings: u64,
    pub reinvested: u64,
    pub strategies: Vec<String>,
    pub is_active: bool,
}

/// Aggregate system snapshot for monitoring and export.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub chain_length: usize,
    pub pending_count: usize,
    pub wallet_count: usize,
    pub active_agents: usize,
    pub agents: Vec<AgentStats>,
}

/// Owns every store of the economy: the ledger, the wallet registry and the
/// agent records. Background work (the strategy scheduler and the scaling
/// monitor) is spawned by `start` and torn down by `shutdown`; everything else
/// is a synchronous method over the shared state.
pub struct Orchestrator {
    config: EconomyConfig,
    ledger: SharedLedger,
    wallets: RwLock<WalletRegistry>,
    agents: SharedAgents,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl Orchestrator {
    /// Build an orchestrator over fresh stores. The config's tunables are
    /// clamped into their operating bands on the way in.
    pub fn new(config: EconomyConfig) -> Self {
        let config = config.clamped();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            ledger: Arc::new(RwLock::new(Ledger::new(
                config.difficulty,
                config.mining_reward,
            ))),
            wallets: RwLock::new(WalletRegistry::new()),
            agents: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            config,
        }
    }

    /// Spawn the scheduler and the scaling monitor. Calling `start` twice is
    /// a logged no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("ORCH - already running");
            return;
        }
        info!(
            "ORCH - starting (difficulty={}, reward={}, max_agents={})",
            self.config.difficulty, self.config.mining_reward, self.config.max_agents
        );

        let scheduler_handle = tokio::spawn(scheduler::run_scheduler(
            self.config.clone(),
            Arc::clone(&self.ledger),
            Arc::clone(&self.agents),
            self.shutdown_tx.subscribe(),
        ));

        let monitor = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();
        let monitor_handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(monitor.config.monitor_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("SCALER - monitor stopping");
                            return;
                        }
                        continue;
                    }
                }
                monitor.auto_scale_pass();
                let stats = monitor.get_system_stats();
                info!(
                    "STATS - chain={} pending={} wallets={} active_agents={}",
                    stats.chain_length,
                    stats.pending_count,
                    stats.wallet_count,
                    stats.active_agents
                );
            }
        });

        self.tasks
            .lock()
            .expect("lock poisoned")
            .extend([scheduler_handle, monitor_handle]);
    }

    /// Create an agent with a fresh wallet. The agent starts active but idle;
    /// strategies are attached separately via `start_strategy`.
    pub fn create_agent(&self, name: &str) -> (Wallet, AgentId) {
        let wallet = generate_wallet();
        let agent = Agent::new(name, &wallet.address);
        let id = agent.id.clone();

        self.wallets
            .write()
            .expect("lock poisoned")
            .insert(wallet.clone());
        self.agents
            .write()
            .expect("lock poisoned")
            .insert(id.clone(), agent);

        info!(
            "REGISTRY - agent '{}' joined with wallet {} (id={})",
            name, wallet.address, id
        );
        (wallet, id)
    }

    /// Attach a strategy to an agent. The scheduler picks the pair up on its
    /// next base tick and fires the first tick immediately.
    pub fn start_strategy(
        &self,
        id: &AgentId,
        kind: StrategyKind,
    ) -> Result<(), EconomyError> {
        let mut agents = self.agents.write().expect("lock poisoned");
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| EconomyError::UnknownAgent(id.to_string()))?;
        if agent.add_strategy(kind) {
            info!("REGISTRY - agent '{}' now runs {}", agent.name, kind);
        }
        Ok(())
    }

    /// Mark an agent inactive. Its strategy ticks halt by the next scheduler
    /// boundary; its wallet and chain history stay untouched.
    pub fn stop_agent(&self, id: &AgentId) -> Result<(), EconomyError> {
        let mut agents = self.agents.write().expect("lock poisoned");
        let agent = agents
            .get_mut(id)
            .ok_or_else(|| EconomyError::UnknownAgent(id.to_string()))?;
        agent.deactivate();
        info!("REGISTRY - agent '{}' stopped", agent.name);
        Ok(())
    }

    /// Directed transfer between two agents' wallets, signed with the sender's
    /// key and gated on the sender's available confirmed balance. The credit
    /// stays pending until some miner seals it. Any failure is logged and
    /// reported as `false`.
    pub fn transfer(&self, from: &AgentId, to: &AgentId, amount: u64) -> bool {
        let Some((from_addr, to_addr)) = ({
            let agents = self.agents.read().expect("lock poisoned");
            match (agents.get(from), agents.get(to)) {
                (Some(f), Some(t)) => Some((f.address.clone(), t.address.clone())),
                _ => None,
            }
        }) else {
            warn!("TRANSFER - unknown agent in {} -> {}", from, to);
            return false;
        };

        let (pubkey, privkey) = {
            let wallets = self.wallets.read().expect("lock poisoned");
            match wallets.get(&from_addr) {
                Some(w) => (w.public_key.clone(), w.private_key.clone()),
                None => {
                    warn!("TRANSFER - no wallet for sender {}", from_addr);
                    return false;
                }
            }
        };

        let mut tx = Transaction::debit(from_addr.clone(), to_addr.clone(), amount, pubkey);
        match sign_hash(&privkey, tx.sighash()) {
            Ok(sig) => tx.signature = Some(sig),
            Err(e) => {
                warn!("TRANSFER - could not sign: {e}");
                return false;
            }
        }

        let submitted = self
            .ledger
            .write()
            .expect("lock poisoned")
            .submit_transfer(tx);
        match submitted {
            Ok(()) => {
                info!(
                    "TRANSFER - {} -> {} amount {} queued (pending until mined)",
                    from_addr, to_addr, amount
                );
                true
            }
            Err(e) => {
                warn!(
                    "TRANSFER - {} -> {} amount {} rejected: {e}",
                    from_addr, to_addr, amount
                );
                false
            }
        }
    }

    /// Confirmed balance of an address, replayed from the chain.
    pub fn balance_of(&self, address: &str) -> i128 {
        self.ledger
            .read()
            .expect("lock poisoned")
            .balance_of(address)
    }

    /// Snapshot of the whole system. Agent balances are replayed under a
    /// single ledger read lock, so they are mutually consistent.
    pub fn get_system_stats(&self) -> SystemStats {
        let mut agents: Vec<AgentStats> = {
            let agents = self.agents.read().expect("lock poisoned");
            agents
                .values()
                .map(|a| AgentStats {
                    name: a.name.clone(),
                    address: a.address.clone(),
                    balance: 0,
                    earnings: a.earnings,
                    reinvested: a.reinvested.total(),
                    strategies: a.strategies().map(|k| k.to_string()).collect(),
                    is_active: a.is_active,
                })
                .collect()
        };
        agents.sort_by(|x, y| x.name.cmp(&y.name));

        let (chain_length, pending_count) = {
            let lg = self.ledger.read().expect("lock poisoned");
            for a in &mut agents {
                a.balance = lg.balance_of(&a.address);
            }
            (lg.len(), lg.pending_len())
        };

        SystemStats {
            chain_length,
            pending_count,
            wallet_count: self.wallets.read().expect("lock poisoned").len(),
            active_agents: agents.iter().filter(|a| a.is_active).count(),
            agents,
        }
    }

    /// Full snapshot of every wallet the orchestrator manages.
    pub fn export_wallets(&self) -> Vec<Wallet> {
        self.wallets.read().expect("lock poisoned").export()
    }

    /// One scaling decision: when the aggregate confirmed balance across all
    /// managed wallets exceeds the threshold and the active-agent count is
    /// below the cap, spawn one agent on the mining + service combination.
    pub fn auto_scale_pass(&self) {
        let addresses: Vec<String> = {
            let wallets = self.wallets.read().expect("lock poisoned");
            wallets.iter().map(|w| w.address.clone()).collect()
        };
        let total: i128 = {
            let lg = self.ledger.read().expect("lock poisoned");
            addresses.iter().map(|a| lg.balance_of(a)).sum()
        };
        if total <= self.config.scale_balance_threshold as i128 {
            return;
        }

        let (active, known) = {
            let agents = self.agents.read().expect("lock poisoned");
            (
                agents.values().filter(|a| a.is_active).count(),
                agents.len(),
            )
        };
        if active >= self.config.max_agents {
            debug!(
                "SCALER - economy at {} but agent cap {} reached",
                total, self.config.max_agents
            );
            return;
        }

        let name = format!("agent-{}", known + 1);
        let (_, id) = self.create_agent(&name);
        self.start_strategy(&id, StrategyKind::Mining).ok();
        self.start_strategy(&id, StrategyKind::ServiceProvision).ok();
        info!(
            "SCALER - aggregate balance {} exceeded {}; spawned '{}' ({} active)",
            total,
            self.config.scale_balance_threshold,
            name,
            active + 1
        );
    }

    /// Stop everything: deactivate all agents, signal the background tasks and
    /// wait for them to drain. Idempotent; a second call returns immediately.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("ORCH - shutting down");

        {
            let mut agents = self.agents.write().expect("lock poisoned");
            for agent in agents.values_mut() {
                agent.deactivate();
            }
        }
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.tasks.lock().expect("lock poisoned"));
        for res in futures::future::join_all(handles).await {
            if let Err(e) = res {
                warn!("ORCH - background task ended abnormally: {e}");
            }
        }

        let lg = self.ledger.read().expect("lock poisoned");
        info!(
            "ORCH - stopped (chain length {}, chain valid: {})",
            lg.len(),
            lg.is_valid_chain()
        );
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Shared handle to the ledger, for direct reads and seeding.
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::blockchain::{mine_pending, DIFF_MAX};

    fn quick_config() -> EconomyConfig {
        let mut cfg = EconomyConfig::default();
        cfg.difficulty = 1;
        cfg
    }

    fn fund(orch: &Orchestrator, address: &str, amount: u64) {
        orch.ledger()
            .write()
            .unwrap()
            .submit_transaction(Transaction::minted(address, amount))
            .unwrap();
        mine_pending(orch.ledger(), "faucet").unwrap();
    }

    #[test]
    fn constructor_clamps_out_of_band_tunables() {
        let mut cfg = quick_config();
        cfg.difficulty = 99; // would leave the nonce search without a target
        cfg.trading_success_prob = 7.0;
        let orch = Orchestrator::new(cfg);

        assert_eq!(orch.config().difficulty, DIFF_MAX);
        assert_eq!(orch.config().trading_success_prob, 1.0);
        // The ledger mines against the clamped difficulty, not the raw one.
        assert_eq!(orch.ledger().read().unwrap().difficulty(), DIFF_MAX);
    }

    #[test]
    fn create_agent_registers_wallet_and_record() {
        let orch = Orchestrator::new(quick_config());
        let (wallet, id) = orch.create_agent("alice");

        assert!(orch
            .wallets
            .read()
            .unwrap()
            .contains(&wallet.address));
        let agents = orch.agents.read().unwrap();
        let agent = agents.get(&id).unwrap();
        assert_eq!(agent.address, wallet.address);
        assert!(agent.is_active);
    }

    #[test]
    fn transfer_moves_confirmed_funds_and_spares_bystanders() {
        let orch = Orchestrator::new(quick_config());
        let (w1, a1) = orch.create_agent("alice");
        let (w2, a2) = orch.create_agent("bob");
        let (w3, _a3) = orch.create_agent("carol");
        fund(&orch, &w1.address, 100);

        assert!(orch.transfer(&a1, &a2, 30));
        // Unconfirmed: the debit is pending, balances have not moved yet.
        assert_eq!(orch.balance_of(&w1.address), 100);
        assert_eq!(orch.balance_of(&w2.address), 0);

        mine_pending(orch.ledger(), "faucet").unwrap();
        assert_eq!(orch.balance_of(&w1.address), 70);
        assert_eq!(orch.balance_of(&w2.address), 30);
        assert_eq!(orch.balance_of(&w3.address), 0);
        assert!(orch.ledger().read().unwrap().is_valid_chain());
    }

    #[test]
    fn transfer_with_insufficient_funds_is_false_and_queues_nothing() {
        let orch = Orchestrator::new(quick_config());
        let (_w1, a1) = orch.create_agent("alice");
        let (_w2, a2) = orch.create_agent("bob");

        assert!(!orch.transfer(&a1, &a2, 30));
        assert_eq!(orch.ledger().read().unwrap().pending_len(), 0);
    }

    #[test]
    fn transfer_to_unknown_agent_is_false() {
        let orch = Orchestrator::new(quick_config());
        let (_w1, a1) = orch.create_agent("alice");
        let ghost = AgentId::new();

        assert!(!orch.transfer(&a1, &ghost, 10));
        assert!(!orch.transfer(&ghost, &a1, 10));
    }

    #[test]
    fn stats_snapshot_is_consistent_with_the_ledger() {
        let orch = Orchestrator::new(quick_config());
        let (w1, a1) = orch.create_agent("alice");
        orch.start_strategy(&a1, StrategyKind::Trading).unwrap();
        fund(&orch, &w1.address, 40);

        let stats = orch.get_system_stats();
        assert_eq!(stats.chain_length, 2);
        assert_eq!(stats.pending_count, 0);
        assert_eq!(stats.wallet_count, 1);
        assert_eq!(stats.active_agents, 1);
        assert_eq!(stats.agents.len(), 1);
        let a = &stats.agents[0];
        assert_eq!(a.address, w1.address);
        assert_eq!(a.balance, 40);
        assert_eq!(a.strategies, vec!["trading".to_string()]);
        assert!(a.is_active);
    }

    #[test]
    fn unknown_agent_errors_are_typed() {
        let orch = Orchestrator::new(quick_config());
        let ghost = AgentId::new();
        assert!(matches!(
            orch.start_strategy(&ghost, StrategyKind::Mining),
            Err(EconomyError::UnknownAgent(_))
        ));
        assert!(matches!(
            orch.stop_agent(&ghost),
            Err(EconomyError::UnknownAgent(_))
        ));
    }

    #[test]
    fn auto_scale_spawns_one_agent_then_respects_the_cap() {
        let mut cfg = quick_config();
        cfg.scale_balance_threshold = 100;
        cfg.max_agents = 2;
        let orch = Orchestrator::new(cfg);
        let (w1, _a1) = orch.create_agent("seed");
        fund(&orch, &w1.address, 200);

        orch.auto_scale_pass();
        {
            let agents = orch.agents.read().unwrap();
            assert_eq!(agents.len(), 2);
            let spawned = agents
                .values()
                .find(|a| a.name == "agent-2")
                .expect("scaled agent present");
            assert!(spawned.runs(StrategyKind::Mining));
            assert!(spawned.runs(StrategyKind::ServiceProvision));
        }
        assert_eq!(orch.get_system_stats().wallet_count, 2);

        // At the cap the monitor stops spawning, whatever the balance.
        orch.auto_scale_pass();
        assert_eq!(orch.agents.read().unwrap().len(), 2);
    }

    #[test]
    fn auto_scale_below_threshold_is_a_noop() {
        let mut cfg = quick_config();
        cfg.scale_balance_threshold = 1_000;
        let orch = Orchestrator::new(cfg);
        let (w1, _a1) = orch.create_agent("seed");
        fund(&orch, &w1.address, 200);

        orch.auto_scale_pass();
        assert_eq!(orch.agents.read().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn start_runs_agents_and_shutdown_is_idempotent() {
        let mut cfg = quick_config();
        cfg.scheduler_tick = Duration::from_millis(10);
        cfg.service_interval = Duration::from_millis(20);
        let orch = Arc::new(Orchestrator::new(cfg));
        let (_w, id) = orch.create_agent("worker");
        orch.start_strategy(&id, StrategyKind::ServiceProvision)
            .unwrap();

        orch.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        orch.shutdown().await;

        let invoiced = orch.ledger().read().unwrap().pending_len();
        assert!(invoiced >= 1, "expected service ticks while running");
        assert!(!orch.agents.read().unwrap().get(&id).unwrap().is_active);

        // Second shutdown returns immediately and changes nothing.
        tokio::time::timeout(Duration::from_millis(200), orch.shutdown())
            .await
            .expect("second shutdown must be a no-op");
        assert_eq!(orch.ledger().read().unwrap().pending_len(), invoiced);
    }
}

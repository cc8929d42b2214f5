use std::collections::HashMap;

use log::{debug, info};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::model::{AgentId, StrategyKind};
use super::{strategy, SharedAgents};
use crate::blockchain::SharedLedger;
use crate::config::EconomyConfig;

/// Drive every active (agent, strategy) pair from one task.
///
/// A single base interval ticks at `cfg.scheduler_tick`; each pair keeps a
/// due-instant in a local map and fires when its own interval has elapsed.
/// A pair fires immediately the first time it is seen, so newly started
/// strategies do not wait out a full interval. Ticks that are due on the same
/// base tick run concurrently, and the task only checks the shutdown signal
/// between batches, so a batch that is mid-append always completes.
pub async fn run_scheduler(
    cfg: EconomyConfig,
    ledger: SharedLedger,
    agents: SharedAgents,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut base = interval(cfg.scheduler_tick);
    base.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut due: HashMap<(AgentId, StrategyKind), Instant> = HashMap::new();

    info!(
        "SCHEDULER - running (base tick {:?})",
        cfg.scheduler_tick
    );

    loop {
        tokio::select! {
            _ = base.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("SCHEDULER - shutdown signal received; stopping");
                    return;
                }
                continue;
            }
        }

        let mut pairs: Vec<(AgentId, StrategyKind)> = Vec::new();
        {
            let agents = agents.read().expect("lock poisoned");
            for agent in agents.values() {
                if !agent.is_active {
                    continue;
                }
                for kind in agent.strategies() {
                    pairs.push((agent.id.clone(), kind));
                }
            }
        }

        // Stopped or removed pairs drop their slot so a later restart fires
        // immediately again.
        due.retain(|key, _| pairs.contains(key));

        let now = Instant::now();
        let mut batch: Vec<(AgentId, StrategyKind)> = Vec::new();
        for pair in pairs {
            let deadline = due.entry(pair.clone()).or_insert(now);
            if *deadline <= now {
                *deadline = now + pair.1.interval(&cfg);
                batch.push(pair);
            }
        }

        if batch.is_empty() {
            continue;
        }
        debug!("SCHEDULER - dispatching {} strategy tick(s)", batch.len());
        let ticks = batch
            .iter()
            .map(|(id, kind)| strategy::run_tick(*kind, &cfg, &ledger, &agents, id));
        futures::future::join_all(ticks).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};
    use std::time::Duration;

    use super::*;
    use crate::agent::{Agent, StrategyKind};
    use crate::blockchain::Ledger;

    fn quick_config() -> EconomyConfig {
        let mut cfg = EconomyConfig::default();
        cfg.scheduler_tick = Duration::from_millis(10);
        cfg.service_interval = Duration::from_millis(20);
        cfg.service_earning_min = 7;
        cfg.service_earning_max = 7;
        cfg
    }

    fn spawn_scheduler(
        cfg: EconomyConfig,
    ) -> (
        SharedLedger,
        SharedAgents,
        AgentId,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let ledger: SharedLedger =
            Arc::new(RwLock::new(Ledger::new(cfg.difficulty, cfg.mining_reward)));
        let mut agent = Agent::new("svc", "addr-svc");
        agent.add_strategy(StrategyKind::ServiceProvision);
        let id = agent.id.clone();
        let agents: SharedAgents =
            Arc::new(RwLock::new(HashMap::from([(id.clone(), agent)])));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_scheduler(
            cfg,
            Arc::clone(&ledger),
            Arc::clone(&agents),
            rx,
        ));
        (ledger, agents, id, tx, handle)
    }

    #[tokio::test]
    async fn ticks_accrue_until_shutdown_then_stop_promptly() {
        let (ledger, agents, id, tx, handle) = spawn_scheduler(quick_config());

        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop by the next tick boundary")
            .unwrap();

        let invoiced = ledger.read().unwrap().pending_len();
        assert!(invoiced >= 2, "expected several service ticks, got {invoiced}");
        assert_eq!(
            agents.read().unwrap().get(&id).unwrap().earnings,
            7 * invoiced as u64
        );

        // Nothing fires after the task has returned.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ledger.read().unwrap().pending_len(), invoiced);
    }

    #[tokio::test]
    async fn first_tick_fires_immediately_then_waits_out_the_interval() {
        let mut cfg = quick_config();
        cfg.service_interval = Duration::from_secs(600);
        let (ledger, _agents, _id, tx, handle) = spawn_scheduler(cfg);

        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(ledger.read().unwrap().pending_len(), 1);
    }

    #[tokio::test]
    async fn deactivated_agent_is_skipped() {
        let cfg = quick_config();
        let (ledger, agents, id, tx, handle) = spawn_scheduler(cfg);
        agents.write().unwrap().get_mut(&id).unwrap().deactivate();

        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // The agent was stopped before its first due check.
        assert_eq!(ledger.read().unwrap().pending_len(), 0);
    }
}

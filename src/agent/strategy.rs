use std::sync::Arc;

use log::{debug, info, warn};
use rand::Rng;
use tokio::task;

use super::model::{AgentId, ReinvestCategory, StrategyKind};
use super::SharedAgents;
use crate::blockchain::{mine_pending, SharedLedger};
use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::transaction::Transaction;

/// Execute one tick of the given strategy. A tick never propagates an error:
/// failures are logged and the next tick starts from a clean slate.
pub async fn run_tick(
    kind: StrategyKind,
    cfg: &EconomyConfig,
    ledger: &SharedLedger,
    agents: &SharedAgents,
    id: &AgentId,
) {
    match kind {
        StrategyKind::Mining => mining_tick(cfg, ledger, agents, id).await,
        StrategyKind::Trading => trading_tick(cfg, ledger, agents, id).await,
        StrategyKind::ServiceProvision => service_tick(cfg, ledger, agents, id).await,
    }
}

/// Mining tick: draw a simulated hash-power value and, when it reaches the
/// success threshold, seal the pending pool into a block with this agent as
/// reward recipient. The nonce search runs on a blocking thread; the append
/// itself is the ledger's atomic stale-checked step. Earnings are the
/// confirmed balance delta since this agent's last record, half of which is
/// handed to the reinvestment hook.
pub async fn mining_tick(
    cfg: &EconomyConfig,
    ledger: &SharedLedger,
    agents: &SharedAgents,
    id: &AgentId,
) {
    let Some((address, last_balance)) = snapshot_active(agents, id, |a| {
        (a.address.clone(), a.last_recorded_balance)
    }) else {
        return;
    };

    let hash_power: f64 = rand::thread_rng().gen_range(0.0..1.0);
    if hash_power < cfg.mining_success_threshold {
        debug!(
            "MINER - {} idle tick (hash power {:.2} < {:.2})",
            address, hash_power, cfg.mining_success_threshold
        );
        return;
    }

    let outcome = {
        let ledger = Arc::clone(ledger);
        let miner = address.clone();
        task::spawn_blocking(move || mine_pending(&ledger, &miner)).await
    };

    match outcome {
        Ok(Ok(())) => {
            let balance = ledger.read().expect("lock poisoned").balance_of(&address);
            let earned = (balance - last_balance).max(0) as u64;
            {
                let mut agents = agents.write().expect("lock poisoned");
                if let Some(agent) = agents.get_mut(id) {
                    agent.earnings = agent.earnings.saturating_add(earned);
                    agent.last_recorded_balance = balance;
                }
            }
            info!(
                "MINER - {} earned {} (confirmed balance {})",
                address, earned, balance
            );
            reinvest(
                cfg,
                agents,
                id,
                (earned as f64 * cfg.mining_reinvest_fraction) as u64,
            );
        }
        Ok(Err(EconomyError::StaleBlock)) => {
            debug!(
                "MINER - {} lost the race for this pool generation; block discarded",
                address
            );
        }
        Ok(Err(e)) => warn!("MINER - {} tick failed: {e}", address),
        Err(e) => warn!("MINER - {} mining task aborted: {e}", address),
    }
}

/// Trading tick: with a fixed probability the trade succeeds and a minted
/// profit of `stake × yield` enters the pending pool. The stake is bounded by
/// a fraction of cumulative earnings and a hard cap. A failed trade debits
/// nothing; the agent only forgoes the profit.
pub async fn trading_tick(
    cfg: &EconomyConfig,
    ledger: &SharedLedger,
    agents: &SharedAgents,
    id: &AgentId,
) {
    let Some((address, earnings)) =
        snapshot_active(agents, id, |a| (a.address.clone(), a.earnings))
    else {
        return;
    };

    let (success, yield_frac) = {
        let mut rng = rand::thread_rng();
        (
            rng.gen_bool(cfg.trading_success_prob),
            rng.gen_range(cfg.trading_yield_min..=cfg.trading_yield_max),
        )
    };

    if !success {
        debug!("TRADE - {} missed; nothing debited", address);
        return;
    }

    let stake = ((earnings as f64) * cfg.trading_stake_fraction) as u64;
    let stake = stake.min(cfg.trading_stake_cap);
    let profit = (stake as f64 * yield_frac) as u64;
    if profit == 0 {
        debug!("TRADE - {} stake {} too small to book a profit", address, stake);
        return;
    }

    let submitted = ledger
        .write()
        .expect("lock poisoned")
        .submit_transaction(Transaction::minted(address.clone(), profit));
    match submitted {
        Ok(()) => {
            record_earning(agents, id, profit);
            info!(
                "TRADE - {} booked profit {} on stake {} (pending until mined)",
                address, profit, stake
            );
        }
        Err(e) => warn!("TRADE - {} could not submit profit: {e}", address),
    }
}

/// Service-provision tick: unconditionally invoice a flat-random earning,
/// then hand a fixed fraction of it to the reinvestment hook.
pub async fn service_tick(
    cfg: &EconomyConfig,
    ledger: &SharedLedger,
    agents: &SharedAgents,
    id: &AgentId,
) {
    let Some(address) = snapshot_active(agents, id, |a| a.address.clone()) else {
        return;
    };

    let earning =
        rand::thread_rng().gen_range(cfg.service_earning_min..=cfg.service_earning_max);

    let submitted = ledger
        .write()
        .expect("lock poisoned")
        .submit_transaction(Transaction::minted(address.clone(), earning));
    match submitted {
        Ok(()) => {
            record_earning(agents, id, earning);
            info!("SERVICE - {} invoiced {} (pending until mined)", address, earning);
            reinvest(
                cfg,
                agents,
                id,
                (earning as f64 * cfg.service_reinvest_fraction) as u64,
            );
        }
        Err(e) => warn!("SERVICE - {} could not submit earning: {e}", address),
    }
}

/// Reinvestment hook: allocate a slice of fresh earnings to one scaling
/// category, chosen uniformly at random. Below the configured minimum this is
/// a silent no-op. The allocation is recorded on the agent and logged; it
/// deliberately changes no ledger state and no earning rate.
pub fn reinvest(cfg: &EconomyConfig, agents: &SharedAgents, id: &AgentId, amount: u64) {
    if amount < cfg.reinvest_min {
        return;
    }

    let category = match rand::thread_rng().gen_range(0..3) {
        0 => ReinvestCategory::CapacityUpgrade,
        1 => ReinvestCategory::CapitalIncrease,
        _ => ReinvestCategory::ServiceExpansion,
    };

    let mut agents = agents.write().expect("lock poisoned");
    if let Some(agent) = agents.get_mut(id) {
        agent.reinvested.record(category, amount);
        info!(
            "REINVEST - {} allocated {} to {:?}",
            agent.address, amount, category
        );
    }
}

/// Read the fields a tick needs, or `None` when the agent is gone or stopped
/// (stopping an agent halts its ticks at exactly this boundary).
fn snapshot_active<T>(
    agents: &SharedAgents,
    id: &AgentId,
    read: impl FnOnce(&super::Agent) -> T,
) -> Option<T> {
    let agents = agents.read().expect("lock poisoned");
    match agents.get(id) {
        Some(agent) if agent.is_active => Some(read(agent)),
        _ => None,
    }
}

fn record_earning(agents: &SharedAgents, id: &AgentId, amount: u64) {
    let mut agents = agents.write().expect("lock poisoned");
    if let Some(agent) = agents.get_mut(id) {
        agent.earnings = agent.earnings.saturating_add(amount);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    use super::*;
    use crate::agent::Agent;
    use crate::blockchain::Ledger;

    fn setup(
        tweak: impl FnOnce(&mut EconomyConfig),
    ) -> (EconomyConfig, SharedLedger, SharedAgents, AgentId, String) {
        let mut cfg = EconomyConfig::default();
        cfg.difficulty = 1;
        tweak(&mut cfg);

        let ledger: SharedLedger =
            Arc::new(RwLock::new(Ledger::new(cfg.difficulty, cfg.mining_reward)));
        let agent = Agent::new("agent-1", "addr-1");
        let id = agent.id.clone();
        let address = agent.address.clone();
        let agents: SharedAgents =
            Arc::new(RwLock::new(HashMap::from([(id.clone(), agent)])));
        (cfg, ledger, agents, id, address)
    }

    #[tokio::test]
    async fn forced_mining_success_pays_exactly_one_agent() {
        let (cfg, ledger, agents, id, address) = setup(|cfg| {
            cfg.mining_success_threshold = 0.0; // every draw succeeds
            cfg.mining_reward = 100;
        });
        let bystander = Agent::new("agent-2", "addr-2");
        let bystander_addr = bystander.address.clone();
        agents
            .write()
            .unwrap()
            .insert(bystander.id.clone(), bystander);

        mining_tick(&cfg, &ledger, &agents, &id).await;

        let lg = ledger.read().unwrap();
        assert_eq!(lg.balance_of(&address), 100);
        assert_eq!(lg.balance_of(&bystander_addr), 0);
        assert_eq!(lg.len(), 2);

        let agents = agents.read().unwrap();
        let agent = agents.get(&id).unwrap();
        assert_eq!(agent.earnings, 100);
        assert_eq!(agent.last_recorded_balance, 100);
        // Half of the fresh earnings went through the reinvestment hook.
        assert_eq!(agent.reinvested.total(), 50);
    }

    #[tokio::test]
    async fn mining_below_threshold_leaves_the_chain_alone() {
        let (cfg, ledger, agents, id, _) = setup(|cfg| {
            cfg.mining_success_threshold = 1.1; // draws live in [0, 1): never
        });

        mining_tick(&cfg, &ledger, &agents, &id).await;
        assert_eq!(ledger.read().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn trading_profit_stays_pending_until_mined() {
        let (cfg, ledger, agents, id, address) = setup(|cfg| {
            cfg.trading_success_prob = 1.0;
            cfg.trading_yield_min = 0.2;
            cfg.trading_yield_max = 0.2;
            cfg.trading_stake_cap = 100;
        });
        agents.write().unwrap().get_mut(&id).unwrap().earnings = 1_000;

        trading_tick(&cfg, &ledger, &agents, &id).await;

        // stake = min(10% of 1000, 100) = 100; profit = 100 * 0.2 = 20
        {
            let lg = ledger.read().unwrap();
            assert_eq!(lg.pending_len(), 1);
            assert_eq!(lg.pending()[0].amount, 20);
            assert_eq!(lg.balance_of(&address), 0); // provisional income
        }
        assert_eq!(agents.read().unwrap().get(&id).unwrap().earnings, 1_020);

        mine_pending(&ledger, "someone-else").unwrap();
        assert_eq!(ledger.read().unwrap().balance_of(&address), 20);
    }

    #[tokio::test]
    async fn failed_trade_debits_nothing() {
        let (cfg, ledger, agents, id, address) = setup(|cfg| {
            cfg.trading_success_prob = 0.0;
        });
        agents.write().unwrap().get_mut(&id).unwrap().earnings = 1_000;

        trading_tick(&cfg, &ledger, &agents, &id).await;

        assert_eq!(ledger.read().unwrap().pending_len(), 0);
        assert_eq!(ledger.read().unwrap().balance_of(&address), 0);
        assert_eq!(agents.read().unwrap().get(&id).unwrap().earnings, 1_000);
    }

    #[tokio::test]
    async fn out_of_band_success_prob_is_clamped_before_the_draw() {
        let (cfg, ledger, agents, id, _) = setup(|cfg| {
            cfg.trading_success_prob = 1.5; // gen_bool rejects anything past 1.0
            cfg.trading_yield_min = 0.2;
            cfg.trading_yield_max = 0.2;
        });
        let cfg = cfg.clamped(); // probability lands on 1.0: the trade is certain
        agents.write().unwrap().get_mut(&id).unwrap().earnings = 1_000;

        trading_tick(&cfg, &ledger, &agents, &id).await;

        let lg = ledger.read().unwrap();
        assert_eq!(lg.pending_len(), 1);
        assert_eq!(lg.pending()[0].amount, 20);
    }

    #[tokio::test]
    async fn trading_with_no_earnings_skips_the_tick() {
        let (cfg, ledger, agents, id, _) = setup(|cfg| {
            cfg.trading_success_prob = 1.0;
        });

        trading_tick(&cfg, &ledger, &agents, &id).await;
        assert_eq!(ledger.read().unwrap().pending_len(), 0);
    }

    #[tokio::test]
    async fn service_tick_invoices_and_reinvests() {
        let (cfg, ledger, agents, id, address) = setup(|cfg| {
            cfg.service_earning_min = 100;
            cfg.service_earning_max = 100;
        });

        service_tick(&cfg, &ledger, &agents, &id).await;

        {
            let lg = ledger.read().unwrap();
            assert_eq!(lg.pending_len(), 1);
            assert_eq!(lg.pending()[0].to, address);
            assert_eq!(lg.pending()[0].amount, 100);
        }
        let agents = agents.read().unwrap();
        let agent = agents.get(&id).unwrap();
        assert_eq!(agent.earnings, 100);
        // 30% of 100 cleared the 10-unit reinvestment minimum.
        assert_eq!(agent.reinvested.total(), 30);
    }

    #[tokio::test]
    async fn reinvest_below_minimum_is_a_silent_noop() {
        let (cfg, _ledger, agents, id, _) = setup(|_| {});

        reinvest(&cfg, &agents, &id, 9);
        assert_eq!(agents.read().unwrap().get(&id).unwrap().reinvested.total(), 0);

        reinvest(&cfg, &agents, &id, 10);
        assert_eq!(agents.read().unwrap().get(&id).unwrap().reinvested.total(), 10);
    }

    #[tokio::test]
    async fn stopped_agent_ticks_are_noops() {
        let (cfg, ledger, agents, id, _) = setup(|cfg| {
            cfg.mining_success_threshold = 0.0;
            cfg.trading_success_prob = 1.0;
        });
        agents.write().unwrap().get_mut(&id).unwrap().deactivate();

        mining_tick(&cfg, &ledger, &agents, &id).await;
        trading_tick(&cfg, &ledger, &agents, &id).await;
        service_tick(&cfg, &ledger, &agents, &id).await;

        let lg = ledger.read().unwrap();
        assert_eq!(lg.len(), 1);
        assert_eq!(lg.pending_len(), 0);
    }
}

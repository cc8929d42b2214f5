use std::sync::Arc;
use std::time::Duration;

use agent_economy::{EconomyConfig, Orchestrator, StrategyKind};
use dotenvy::dotenv;
use log::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv();
    env_logger::init();

    let config = EconomyConfig::from_env();
    println!(
        "⛓️ Starting agent economy (difficulty {}, reward {}, up to {} agents)",
        config.difficulty, config.mining_reward, config.max_agents
    );

    let orchestrator = Arc::new(Orchestrator::new(config));

    // Seed population: two specialists, a self-funding trader, a generalist.
    // Trading stakes a share of past earnings, so every trader needs an
    // earning strategy beside it to bootstrap.
    let (_, miner) = orchestrator.create_agent("miner-1");
    let (_, trader) = orchestrator.create_agent("trader-1");
    let (_, provider) = orchestrator.create_agent("provider-1");
    let (_, generalist) = orchestrator.create_agent("generalist-1");

    orchestrator.start_strategy(&miner, StrategyKind::Mining)?;
    orchestrator.start_strategy(&trader, StrategyKind::Trading)?;
    orchestrator.start_strategy(&trader, StrategyKind::ServiceProvision)?;
    orchestrator.start_strategy(&provider, StrategyKind::ServiceProvision)?;
    orchestrator.start_strategy(&generalist, StrategyKind::Mining)?;
    orchestrator.start_strategy(&generalist, StrategyKind::Trading)?;
    orchestrator.start_strategy(&generalist, StrategyKind::ServiceProvision)?;

    orchestrator.start();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = report.tick() => {
                let stats = orchestrator.get_system_stats();
                info!(
                    "ECONOMY - blocks={} pending={} wallets={} active={}",
                    stats.chain_length, stats.pending_count, stats.wallet_count, stats.active_agents
                );
                for agent in &stats.agents {
                    info!(
                        "ECONOMY -   {:<14} balance={:<8} earnings={:<8} reinvested={:<6} [{}]",
                        agent.name,
                        agent.balance,
                        agent.earnings,
                        agent.reinvested,
                        agent.strategies.join(", ")
                    );
                }
            }
            res = &mut shutdown => {
                res?;
                break;
            }
        }
    }

    println!("⛓️ Ctrl-C received, shutting down");
    orchestrator.shutdown().await;

    let stats = orchestrator.get_system_stats();
    println!(
        "⛓️ Final state: {} blocks, {} wallets, {} units held across agents",
        stats.chain_length,
        stats.wallet_count,
        stats.agents.iter().map(|a| a.balance).sum::<i128>()
    );
    Ok(())
}

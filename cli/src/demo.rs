//! Scripted walkthrough of a full confidential rebalance cycle.

use anyhow::{anyhow, Result};
use cipherfolio::{EngineError, FheBackend, NoOpVenue};
use colored::Colorize;

use crate::config::{AssetSection, PortfolioConfig, PortfolioSection, SimulationSection};
use crate::session::{adapter_err, engine_err, Session};
use crate::{portfolio, rebalance};

const DAY_SECS: u64 = 86_400;

fn demo_config() -> PortfolioConfig {
    PortfolioConfig {
        portfolio: PortfolioSection {
            owner: 0xA1,
            rebalance_frequency_secs: DAY_SECS,
            tolerance_band_bps: 500,
            max_asset_weight_bps: Some(5_000),
        },
        assets: vec![
            AssetSection {
                ticker: "BTC".into(),
                target_bps: 4_000,
                trading_limit: 100_000,
                holding: 520_000,
            },
            AssetSection {
                ticker: "ETH".into(),
                target_bps: 3_500,
                trading_limit: 100_000,
                holding: 300_000,
            },
            AssetSection {
                ticker: "SOL".into(),
                target_bps: 2_500,
                trading_limit: 100_000,
                holding: 180_000,
            },
        ],
        simulation: SimulationSection::default(),
    }
}

pub fn run() -> Result<()> {
    let config = demo_config();

    println!("{}", "=== Confidential rebalance demo ===".bright_green().bold());
    println!();
    println!("{}", "1. Create and fund a drifted three-asset portfolio".bold());
    portfolio::status(&config)?;
    println!();

    println!("{}", "2. Trigger immediately: the cadence gate refuses".bold());
    let mut session = Session::from_config(&config)?;
    let early = session.engine.trigger_rebalance(
        session.owner,
        session.owner,
        session.now_secs,
        &mut NoOpVenue,
    );
    match early {
        Err(EngineError::RebalanceNotDue) => {
            println!("  {} RebalanceNotDue, as expected", "refused:".bright_yellow());
        }
        other => return Err(anyhow!("unexpected early-trigger result: {other:?}")),
    }
    println!();

    println!("{}", "3. A day later the cycle runs end to end".bold());
    rebalance::run(&config, 1)?;
    println!();

    println!("{}", "4. Record a performance round and attribute it".bold());
    let returns = session.engine.with_backend(|b| {
        let asset = [800u128, 500, 300]
            .iter()
            .map(|&r| b.enc_u128(r))
            .collect::<core::result::Result<Vec<_>, _>>()?;
        let bench = [400u128, 400, 400]
            .iter()
            .map(|&r| b.enc_u128(r))
            .collect::<core::result::Result<Vec<_>, _>>()?;
        Ok::<_, cipherfolio::AdapterError>((asset, bench))
    });
    let (asset_returns, benchmark_returns) = returns.map_err(adapter_err)?;
    session
        .engine
        .record_performance(session.owner, session.owner, asset_returns, benchmark_returns)
        .map_err(engine_err)?;
    let metrics = session
        .engine
        .metrics(session.owner)
        .ok_or_else(|| anyhow!("metrics missing after record"))?;
    session.engine.with_backend(|b| {
        println!(
            "  {} {} bp-weighted",
            "portfolio return:".bright_cyan(),
            b.decrypt_u128(metrics.total_return)
        );
        println!(
            "  {} {} bp-weighted",
            "benchmark return:".bright_cyan(),
            b.decrypt_u128(metrics.benchmark_return)
        );
        println!(
            "  {} {} bp-weighted",
            "active return:".bright_cyan(),
            b.decrypt_u128(metrics.active_return)
        );
    });
    println!();
    println!("{}", "Demo complete.".bright_green().bold());
    Ok(())
}

//! Portfolio inspection commands

use anyhow::{anyhow, Result};
use cipherfolio::BPS_SCALE;
use colored::Colorize;

use crate::config::PortfolioConfig;
use crate::session::Session;

/// Seed the engine from the scenario and confirm what was created.
pub fn create(config: &PortfolioConfig) -> Result<()> {
    let session = Session::from_config(config)?;
    let snapshot = session
        .engine
        .snapshot(session.owner)
        .ok_or_else(|| anyhow!("portfolio missing after create"))?;

    println!("{}", "Portfolio created".bright_green().bold());
    println!("  {} #{}", "id:".bright_cyan(), snapshot.id);
    println!(
        "  {} {}",
        "tokens:".bright_cyan(),
        snapshot
            .tokens
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!(
        "  {} every {} s",
        "rebalance:".bright_cyan(),
        snapshot.rebalance_frequency_secs
    );
    Ok(())
}

/// Decrypted view of the configured portfolio: holdings, live allocation
/// against targets, and the eligibility gate.
pub fn status(config: &PortfolioConfig) -> Result<()> {
    let session = Session::from_config(config)?;
    let snapshot = session
        .engine
        .snapshot(session.owner)
        .ok_or_else(|| anyhow!("portfolio missing after create"))?;
    let total = config.total_value();

    println!("{}", "Portfolio status".bright_green().bold());
    println!(
        "  {} {} ({})",
        "portfolio:".bright_cyan(),
        snapshot.id,
        if snapshot.is_active {
            "active".bright_green()
        } else {
            "inactive".bright_red()
        }
    );
    println!("  {} {}", "total value:".bright_cyan(), total);
    println!(
        "  {} {} s (last at {})",
        "cadence:".bright_cyan(),
        snapshot.rebalance_frequency_secs,
        snapshot.last_rebalance_secs
    );
    println!();
    println!(
        "  {:<10} {:>14} {:>10} {:>10} {:>8}",
        "asset", "holding", "current", "target", "drift"
    );
    for asset in &config.assets {
        let current = if total > 0 {
            asset.holding * BPS_SCALE / total
        } else {
            0
        };
        let drift = current.abs_diff(asset.target_bps);
        let drift_col = if drift > config.portfolio.tolerance_band_bps {
            format!("{drift}bp").bright_red()
        } else {
            format!("{drift}bp").bright_green()
        };
        println!(
            "  {:<10} {:>14} {:>8}bp {:>8}bp {:>8}",
            asset.ticker, asset.holding, current, asset.target_bps, drift_col
        );
    }
    Ok(())
}

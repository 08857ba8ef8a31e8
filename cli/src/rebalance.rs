//! Rebalance cycle driver: trigger, then decrypt and print the audit batch.

use anyhow::{anyhow, Result};
use cipherfolio::{NoOpVenue, RebalanceOrder};
use colored::Colorize;
use fhe_core::ClearBackend;
use log::info;

use crate::config::PortfolioConfig;
use crate::session::{engine_err, Session};

/// Run `cycles` rebalance cycles, advancing the clock to the cadence gate
/// plus one second each round.
pub fn run(config: &PortfolioConfig, cycles: u32) -> Result<()> {
    let mut session = Session::from_config(config)?;
    let mut venue = NoOpVenue;

    for cycle in 1..=cycles {
        session.advance(config.portfolio.rebalance_frequency_secs + 1);
        info!("cycle {cycle}: triggering at {}", session.now_secs);

        let order_ids = session
            .engine
            .trigger_rebalance(session.owner, session.owner, session.now_secs, &mut venue)
            .map_err(engine_err)?;
        let audit = session
            .engine
            .last_audit(session.owner)
            .ok_or_else(|| anyhow!("no audit batch after a successful cycle"))?;

        println!(
            "{} {} ({} orders at t={})",
            "Cycle".bright_green().bold(),
            cycle,
            order_ids.len(),
            session.now_secs
        );
        println!(
            "  {:<10} {:>14} {:>14} {:>8} {:>8} {:>8}",
            "asset", "amount_in", "min_out", "offset", "active", "weight!"
        );
        session.engine.with_backend(|b| {
            for (i, order) in audit.orders.iter().enumerate() {
                print_order(b, &session.tickers[i], order, b.decrypt_bool(audit.weight_flags[i]));
            }
        });
    }
    Ok(())
}

fn print_order(b: &ClearBackend, ticker: &str, order: &RebalanceOrder, overweight: bool) {
    let active = b.decrypt_bool(order.is_active);
    let active_col = if active {
        "yes".bright_yellow()
    } else {
        "no".normal()
    };
    let weight_col = if overweight {
        "OVER".bright_red()
    } else {
        "ok".normal()
    };
    println!(
        "  {:<10} {:>14} {:>14} {:>7}s {:>8} {:>8}",
        ticker,
        b.decrypt_u128(order.amount_in),
        b.decrypt_u128(order.min_amount_out),
        b.decrypt_u64(order.execution_window),
        active_col,
        weight_col
    );
}

//! In-process engine session seeded from a scenario file.
//!
//! The CLI runs everything against the clear-text backend, so every handle
//! is decryptable for display. A real deployment would swap in an FHE
//! backend and the decrypt calls below would not exist.

use anyhow::{anyhow, Result};
use cipherfolio::{
    AdapterError, AssetId, Ct128, EngineError, FheBackend, Principal, RebalanceEngine,
};
use fhe_core::ClearBackend;
use log::{debug, info};

use crate::config::{AssetSection, PortfolioConfig};

/// Principal the engine computes under in this process.
pub const ENGINE_PRINCIPAL: Principal = Principal::from_byte(0x01);

pub struct Session {
    pub engine: RebalanceEngine<ClearBackend>,
    pub owner: Principal,
    pub tickers: Vec<String>,
    pub now_secs: u64,
}

pub fn engine_err(e: EngineError) -> anyhow::Error {
    anyhow!("engine rejected the call: {e:?}")
}

pub fn adapter_err(e: AdapterError) -> anyhow::Error {
    anyhow!("ciphertext adapter failed: {e:?}")
}

impl Session {
    /// Create the portfolio and fund it with the configured holdings.
    pub fn from_config(config: &PortfolioConfig) -> Result<Self> {
        let engine = RebalanceEngine::new(ClearBackend::new(), ENGINE_PRINCIPAL);
        let owner = Principal::from_byte(config.portfolio.owner);
        let now_secs = config.simulation.start_secs;

        let tokens: Vec<AssetId> = config
            .assets
            .iter()
            .map(|a| AssetId::new(&a.ticker))
            .collect();
        let targets = enc_column(&engine, config, |a| a.target_bps)?;
        let limits = enc_column(&engine, config, |a| a.trading_limit)?;
        let tolerance = engine
            .with_backend(|b| b.enc_u128(config.portfolio.tolerance_band_bps))
            .map_err(adapter_err)?;

        let id = engine
            .create_portfolio(
                owner,
                tokens,
                targets,
                limits,
                config.portfolio.rebalance_frequency_secs,
                tolerance,
                now_secs,
            )
            .map_err(engine_err)?;
        info!(
            "created portfolio #{id} for owner {:02x}",
            config.portfolio.owner
        );

        let holdings = enc_column(&engine, config, |a| a.holding)?;
        let total = engine
            .with_backend(|b| b.enc_u128(config.total_value()))
            .map_err(adapter_err)?;
        engine
            .update_holdings(owner, owner, holdings, total)
            .map_err(engine_err)?;
        debug!("funded with total value {}", config.total_value());

        if let Some(max_weight) = config.portfolio.max_asset_weight_bps {
            let ct = engine
                .with_backend(|b| b.enc_u128(max_weight))
                .map_err(adapter_err)?;
            engine
                .set_max_asset_weight(owner, owner, ct)
                .map_err(engine_err)?;
            debug!("weight ceiling set to {max_weight} bp");
        }

        Ok(Self {
            engine,
            owner,
            tickers: config.assets.iter().map(|a| a.ticker.clone()).collect(),
            now_secs,
        })
    }

    pub fn advance(&mut self, secs: u64) {
        self.now_secs = self.now_secs.saturating_add(secs);
        debug!("clock advanced to {}", self.now_secs);
    }
}

fn enc_column(
    engine: &RebalanceEngine<ClearBackend>,
    config: &PortfolioConfig,
    f: impl Fn(&AssetSection) -> u128,
) -> Result<Vec<Ct128>> {
    engine
        .with_backend(|b| {
            config
                .assets
                .iter()
                .map(|a| b.enc_u128(f(a)))
                .collect::<core::result::Result<Vec<_>, _>>()
        })
        .map_err(adapter_err)
}

//! Portfolio scenario files (TOML) and their validation

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use cipherfolio::BPS_SCALE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One portfolio scenario: the plaintext inputs the owner would encrypt
/// client-side before calling the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    pub portfolio: PortfolioSection,
    pub assets: Vec<AssetSection>,
    #[serde(default)]
    pub simulation: SimulationSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioSection {
    /// Owner principal, as a single identifying byte.
    pub owner: u8,
    pub rebalance_frequency_secs: u64,
    pub tolerance_band_bps: u128,
    /// Optional per-asset weight ceiling; unset means no ceiling.
    pub max_asset_weight_bps: Option<u128>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetSection {
    pub ticker: String,
    pub target_bps: u128,
    pub trading_limit: u128,
    /// Current holding valuation, same unit as the trading limit.
    pub holding: u128,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    /// Number of rebalance cycles to run.
    pub cycles: u32,
    /// Wall-clock start of the simulation, unix seconds.
    pub start_secs: u64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            cycles: 1,
            start_secs: 1_700_000_000,
        }
    }
}

impl PortfolioConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn total_value(&self) -> u128 {
        self.assets.iter().map(|a| a.holding).sum()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.is_empty() {
            return Err(ConfigError::Invalid("no assets configured".into()));
        }
        if self.portfolio.rebalance_frequency_secs == 0 {
            return Err(ConfigError::Invalid(
                "rebalance_frequency_secs must be positive".into(),
            ));
        }
        let target_sum: u128 = self.assets.iter().map(|a| a.target_bps).sum();
        if target_sum > BPS_SCALE {
            return Err(ConfigError::Invalid(format!(
                "target allocations sum to {target_sum} bp, over the {BPS_SCALE} bp scale"
            )));
        }
        for asset in &self.assets {
            if asset.ticker.is_empty() || asset.ticker.len() > 8 || !asset.ticker.is_ascii() {
                return Err(ConfigError::Invalid(format!(
                    "ticker {:?} must be 1-8 ASCII bytes",
                    asset.ticker
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    const GOOD: &str = r#"
[portfolio]
owner = 161
rebalance_frequency_secs = 86400
tolerance_band_bps = 500

[[assets]]
ticker = "BTC"
target_bps = 6000
trading_limit = 100000
holding = 550000

[[assets]]
ticker = "ETH"
target_bps = 4000
trading_limit = 100000
holding = 450000
"#;

    #[test]
    fn parses_a_valid_scenario() {
        let f = write_config(GOOD);
        let config = PortfolioConfig::load(f.path()).unwrap();
        assert_eq!(config.assets.len(), 2);
        assert_eq!(config.total_value(), 1_000_000);
        assert_eq!(config.simulation.cycles, 1);
        assert!(config.portfolio.max_asset_weight_bps.is_none());
    }

    #[test]
    fn rejects_over_allocated_targets() {
        let f = write_config(&GOOD.replace("target_bps = 4000", "target_bps = 5000"));
        let err = PortfolioConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_oversized_ticker() {
        let f = write_config(&GOOD.replace("\"ETH\"", "\"VERYLONGNAME\""));
        assert!(matches!(
            PortfolioConfig::load(f.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_zero_frequency() {
        let f = write_config(&GOOD.replace(
            "rebalance_frequency_secs = 86400",
            "rebalance_frequency_secs = 0",
        ));
        assert!(matches!(
            PortfolioConfig::load(f.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = PortfolioConfig::load(Path::new("/nonexistent/portfolio.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

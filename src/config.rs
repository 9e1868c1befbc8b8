//! Deployment configuration loaded from TOML
//!
//! Every section and field is optional; missing values fall back to the
//! defaults of the corresponding contract config.
//!
//! ```toml
//! pool_wad = 1000000
//! ledger = "count_links"
//!
//! [amm]
//! price_reveal_threshold = 20000000
//! listen_gate = { mode = "cooldown", secs = 10 }
//!
//! [competition]
//! duration_secs = 604800
//! rebate_flat = 1
//! pot_cut = 1
//!
//! [price_floor]
//! blocks_per_epoch = 7200
//! max_withdrawal_per_epoch = 1000000000
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::amm::AmmConfig;
use crate::chain::ChainLengthPolicy;
use crate::competition::CompetitionConfig;
use crate::price_floor::PriceFloorConfig;

/// Amounts are written as plain TOML integers, which cap at 64 bits
pub(crate) fn u128_from_u64<'de, D>(deserializer: D) -> core::result::Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(u128::from)
}

fn default_pool_wad() -> u128 {
    amm_model::WAD
}

/// Parameters for every contract in a deployment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub amm: AmmConfig,
    /// Fixed-point scale of the price-floor pool
    #[serde(deserialize_with = "u128_from_u64")]
    pub pool_wad: u128,
    /// Chain length policy for a standalone ledger
    pub ledger: ChainLengthPolicy,
    pub competition: CompetitionConfig,
    pub price_floor: PriceFloorConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            amm: AmmConfig::default(),
            pool_wad: default_pool_wad(),
            ledger: ChainLengthPolicy::default(),
            competition: CompetitionConfig::default(),
            price_floor: PriceFloorConfig::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse protocol config")
    }

    /// Read and parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&source).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amm::ListenGate;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ProtocolConfig::from_toml_str("").unwrap();
        assert_eq!(config, ProtocolConfig::default());
        assert_eq!(config.amm.listen_gate, ListenGate::SingleUse);
        assert_eq!(config.competition.chain_length_policy, ChainLengthPolicy::CountLinks);
    }

    #[test]
    fn test_partial_sections() {
        let config = ProtocolConfig::from_toml_str(
            r#"
            ledger = "count_links"

            [amm]
            price_reveal_threshold = 20000000
            listen_gate = { mode = "cooldown" }

            [price_floor]
            blocks_per_epoch = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger, ChainLengthPolicy::CountLinks);
        assert_eq!(config.amm.price_reveal_threshold, 20_000_000);
        assert_eq!(config.amm.wad, amm_model::WAD);
        assert_eq!(config.amm.listen_gate, ListenGate::Cooldown { secs: 10 });
        assert_eq!(config.price_floor.blocks_per_epoch, 10);
        assert_eq!(
            config.price_floor.max_withdrawal_per_epoch,
            PriceFloorConfig::default().max_withdrawal_per_epoch
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool_wad = 1000").unwrap();
        writeln!(file, "[competition]").unwrap();
        writeln!(file, "rebate_flat = 5").unwrap();
        writeln!(file, "reset_when_drained = true").unwrap();

        let config = ProtocolConfig::load(file.path()).unwrap();
        assert_eq!(config.pool_wad, 1_000);
        assert_eq!(config.competition.rebate_flat, 5);
        assert!(config.competition.reset_when_drained);
    }

    #[test]
    fn test_bad_input_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool_wad = \"lots\"").unwrap();

        let err = ProtocolConfig::load(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid config file"));

        let err = ProtocolConfig::load("/nonexistent/shroud.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

//! Configuration loader and application settings.

use std::str::FromStr;
use std::time::Duration;

use crate::asset::Asset;
use crate::controller::ControllerConfig;
use crate::errors::{AppError, Result};
use crate::models::VenueVersion;

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Account whose orders are managed.
    pub lp_account: String,
    /// HTTP endpoint of the state-chain node (`cf_*` methods).
    pub node_rpc_url: String,
    /// HTTP endpoint of the LP API (`lp_*` methods).
    pub lp_api_url: String,
    pub node_ws_url: String,
    pub lp_ws_url: String,
    pub venue_version: VenueVersion,
    pub base_assets: Vec<Asset>,
    pub quote_asset: Asset,
    pub rpc_timeout: Duration,
    pub book_refresh: Duration,
    pub strict_tick_range: bool,
    pub order_sequencing: bool,
}

impl AppConfig {
    /// Load configuration from `.env` and the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; missing keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let lp_account = lookup("LP_ACCOUNT")
            .filter(|account| !account.trim().is_empty())
            .ok_or_else(|| AppError::Config("Set LP_ACCOUNT to your LP account id".into()))?;

        let base_assets = get("BASE_ASSETS", "ETH,BTC")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Asset::from_str)
            .collect::<Result<Vec<_>>>()?;
        if base_assets.is_empty() {
            return Err(AppError::Config("BASE_ASSETS must name at least one asset".into()));
        }

        Ok(Self {
            lp_account,
            node_rpc_url: get("NODE_RPC_URL", "http://localhost:9944"),
            lp_api_url: get("LP_API_URL", "http://localhost:10589"),
            node_ws_url: get("NODE_WS_URL", "ws://localhost:9944"),
            lp_ws_url: get("LP_WS_URL", "ws://localhost:10589"),
            venue_version: get("VENUE_VERSION", "mainnet").parse()?,
            base_assets,
            quote_asset: get("QUOTE_ASSET", "USDC").parse()?,
            rpc_timeout: Duration::from_secs(get("RPC_TIMEOUT_SECS", "10").trim().parse()?),
            book_refresh: Duration::from_secs(get("BOOK_REFRESH_SECS", "5").trim().parse()?),
            strict_tick_range: parse_flag("STRICT_TICK_RANGE", &get("STRICT_TICK_RANGE", "false"))?,
            order_sequencing: parse_flag("ORDER_SEQUENCING", &get("ORDER_SEQUENCING", "true"))?,
        })
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            strict_tick_range: self.strict_tick_range,
            sequencing: self.order_sequencing,
        }
    }

    /// Every configured `(base, quote)` pair.
    pub fn pairs(&self) -> impl Iterator<Item = (Asset, Asset)> + '_ {
        self.base_assets.iter().map(|base| (*base, self.quote_asset))
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_account_is_set() {
        let config = load(&[("LP_ACCOUNT", "cFabc")]).unwrap();
        assert_eq!(config.venue_version, VenueVersion::Mainnet);
        assert_eq!(config.base_assets, vec![Asset::Eth, Asset::Btc]);
        assert_eq!(config.quote_asset, Asset::Usdc);
        assert_eq!(config.rpc_timeout, Duration::from_secs(10));
        assert!(!config.strict_tick_range);
        assert!(config.controller_config().sequencing);
        assert_eq!(config.pairs().count(), 2);
    }

    #[test]
    fn account_is_required() {
        assert!(matches!(load(&[]), Err(AppError::Config(_))));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("LP_ACCOUNT", "cFabc"),
            ("VENUE_VERSION", "perseverance"),
            ("BASE_ASSETS", "dot, flip"),
            ("STRICT_TICK_RANGE", "1"),
            ("ORDER_SEQUENCING", "off"),
        ])
        .unwrap();
        assert_eq!(config.venue_version, VenueVersion::Perseverance);
        assert_eq!(config.base_assets, vec![Asset::Dot, Asset::Flip]);
        let controller = config.controller_config();
        assert!(controller.strict_tick_range);
        assert!(!controller.sequencing);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(load(&[("LP_ACCOUNT", "a"), ("BASE_ASSETS", "ETH,SOL")]).is_err());
        assert!(load(&[("LP_ACCOUNT", "a"), ("ORDER_SEQUENCING", "maybe")]).is_err());
        assert!(load(&[("LP_ACCOUNT", "a"), ("RPC_TIMEOUT_SECS", "ten")]).is_err());
    }
}

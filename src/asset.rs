//! Static registry of the assets traded on the venue.
//!
//! Every amount exchanged with the venue is an integer count of the asset's
//! smallest unit (`10^decimals`). Human-facing floats are converted through
//! this table only.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};
use crate::models::VenueVersion;

/// Block time of the venue's own chain, used as the prewitness drain horizon.
pub const VENUE_BLOCK_TIME: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Asset {
    Usdc,
    Eth,
    Btc,
    Dot,
    Flip,
}

/// Source chain an asset is witnessed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Ethereum,
    Bitcoin,
    Polkadot,
}

impl Asset {
    pub const ALL: [Asset; 5] = [Asset::Usdc, Asset::Eth, Asset::Btc, Asset::Dot, Asset::Flip];

    /// Canonical display symbol, e.g. `ETH`.
    pub fn symbol(self) -> &'static str {
        match self {
            Asset::Usdc => "USDC",
            Asset::Eth => "ETH",
            Asset::Btc => "BTC",
            Asset::Dot => "DOT",
            Asset::Flip => "FLIP",
        }
    }

    /// Decimal exponent of the smallest unit.
    pub fn decimals(self) -> u32 {
        match self {
            Asset::Usdc => 6,
            Asset::Eth => 18,
            Asset::Btc => 8,
            Asset::Dot => 10,
            Asset::Flip => 18,
        }
    }

    /// Unit-conversion factor `10^decimals`.
    pub fn unit(self) -> u128 {
        10u128.pow(self.decimals())
    }

    pub fn unit_f64(self) -> f64 {
        self.unit() as f64
    }

    /// Asset name as the given protocol version spells it.
    pub fn wire_name(self, version: VenueVersion) -> &'static str {
        match version {
            VenueVersion::Mainnet => self.symbol(),
            VenueVersion::Perseverance => match self {
                Asset::Usdc => "Usdc",
                Asset::Eth => "Eth",
                Asset::Btc => "Btc",
                Asset::Dot => "Dot",
                Asset::Flip => "Flip",
            },
        }
    }

    pub fn chain(self) -> Chain {
        match self {
            Asset::Usdc | Asset::Eth | Asset::Flip => Chain::Ethereum,
            Asset::Btc => Chain::Bitcoin,
            Asset::Dot => Chain::Polkadot,
        }
    }

    pub fn block_time(self) -> Duration {
        match self.chain() {
            Chain::Bitcoin => Duration::from_secs(600),
            Chain::Ethereum | Chain::Polkadot => Duration::from_secs(6),
        }
    }

    /// Source-chain blocks the venue waits for before finalising a deposit.
    pub fn confirmations(self) -> u32 {
        match self.chain() {
            Chain::Ethereum => 8,
            Chain::Bitcoin => 3,
            Chain::Polkadot => 1,
        }
    }

    /// Wall-clock delay between a prewitness sighting and its expected finalisation.
    pub fn witness_delay(self) -> Duration {
        self.block_time() * self.confirmations()
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Asset {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USDC" => Ok(Asset::Usdc),
            "ETH" => Ok(Asset::Eth),
            "BTC" => Ok(Asset::Btc),
            "DOT" => Ok(Asset::Dot),
            "FLIP" => Ok(Asset::Flip),
            _ => Err(AppError::UnknownAsset(s.to_string())),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Ethereum => "Ethereum",
            Chain::Bitcoin => "Bitcoin",
            Chain::Polkadot => "Polkadot",
        };
        f.write_str(name)
    }
}

/// Convert a human amount into the asset's smallest unit, truncating any
/// precision beyond the asset's decimals.
pub fn amount_to_smallest_units(asset: Asset, amount: f64) -> Result<u128> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::InvalidAmount(amount));
    }
    Ok((asset.unit_f64() * amount).trunc() as u128)
}

pub fn smallest_units_to_amount(asset: Asset, units: u128) -> f64 {
    units as f64 / asset.unit_f64()
}

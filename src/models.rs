//! Shared data structures used throughout the application.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::{Asset, amount_to_smallest_units};
use crate::dex::calc::price_to_tick;
use crate::errors::{AppError, Result};

/// Venue protocol revision. Revisions differ in parameter encoding and
/// asset spelling, not in semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VenueVersion {
    /// Named-object params, upper-case asset symbols.
    #[default]
    Mainnet,
    /// Positional-array params, capitalised asset names.
    Perseverance,
}

impl FromStr for VenueVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(VenueVersion::Mainnet),
            "perseverance" => Ok(VenueVersion::Perseverance),
            other => Err(AppError::Config(format!("unknown venue version '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// Connection state of a pool or stream as seen by the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkStatus {
    Stopped,
    #[default]
    NotConnected,
    Connected,
}

/// Discriminates limit and range orders where both share an id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKind {
    Limit,
    Range,
}

impl OrderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderKind::Limit => "limit",
            OrderKind::Range => "range",
        }
    }
}

/// One-sided resting order at a single tick.
///
/// `amount` is always expressed in the base asset; a buy order is sent to the
/// venue as `amount * price` of the quote asset.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitOrder {
    pub base: Asset,
    pub quote: Asset,
    pub side: Side,
    pub id: u64,
    pub price: f64,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub lp_account: Option<String>,
}

impl LimitOrder {
    pub fn new(base: Asset, quote: Asset, side: Side, id: u64, price: f64, amount: f64) -> Self {
        Self {
            base,
            quote,
            side,
            id,
            price,
            amount,
            timestamp: None,
            lp_account: None,
        }
    }

    /// Asset the venue debits for this order.
    pub fn denominating_asset(&self) -> Asset {
        match self.side {
            Side::Buy => self.quote,
            Side::Sell => self.base,
        }
    }

    pub fn tick(&self) -> Result<i32> {
        price_to_tick(self.price, self.base, self.quote)
    }

    /// Sell amount in smallest units of [`Self::denominating_asset`].
    pub fn sell_amount(&self) -> Result<u128> {
        match self.side {
            Side::Buy => amount_to_smallest_units(self.quote, self.amount * self.price),
            Side::Sell => amount_to_smallest_units(self.base, self.amount),
        }
    }
}

impl fmt::Display for LimitOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Limit Order - {}{}: price = {}, amount = {}, id = {}, side = {}",
            self.base, self.quote, self.price, self.amount, self.id, self.side
        )
    }
}

/// Size of a range order: raw pool liquidity, or bounds on the asset amounts
/// the venue may consume. Asset amounts are human units of (base, quote).
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOrderSize {
    Liquidity(u128),
    AssetAmounts {
        minimum: (f64, f64),
        maximum: (f64, f64),
    },
}

impl RangeOrderSize {
    pub fn is_zero(&self) -> bool {
        match self {
            RangeOrderSize::Liquidity(l) => *l == 0,
            RangeOrderSize::AssetAmounts { maximum, .. } => maximum.0 == 0.0 && maximum.1 == 0.0,
        }
    }
}

/// Liquidity position active between two prices.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeOrder {
    pub base: Asset,
    pub quote: Asset,
    pub id: u64,
    pub lower_price: f64,
    pub upper_price: f64,
    pub size: RangeOrderSize,
    pub timestamp: Option<DateTime<Utc>>,
    pub lp_account: Option<String>,
}

impl RangeOrder {
    pub fn new(
        base: Asset,
        quote: Asset,
        id: u64,
        lower_price: f64,
        upper_price: f64,
        size: RangeOrderSize,
    ) -> Self {
        Self {
            base,
            quote,
            id,
            lower_price,
            upper_price,
            size,
            timestamp: None,
            lp_account: None,
        }
    }

    /// `(lower, upper)` ticks. Ordering is not checked here.
    pub fn ticks(&self) -> Result<(i32, i32)> {
        Ok((
            price_to_tick(self.lower_price, self.base, self.quote)?,
            price_to_tick(self.upper_price, self.base, self.quote)?,
        ))
    }
}

impl fmt::Display for RangeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Range Order - {}{}: lower_price = {}, upper_price = {}, size = {:?}, id = {}",
            self.base, self.quote, self.lower_price, self.upper_price, self.size, self.id
        )
    }
}

/// An order of either kind belonging to the configured LP account.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnOrder {
    Limit(LimitOrder),
    Range(RangeOrder),
}

impl OwnOrder {
    pub fn id(&self) -> u64 {
        match self {
            OwnOrder::Limit(o) => o.id,
            OwnOrder::Range(o) => o.id,
        }
    }
}

/// Deposit seen in a source-chain mempool but not yet finalised.
#[derive(Debug, Clone, PartialEq)]
pub struct PrewitnessedSwap {
    pub base: Asset,
    pub quote: Asset,
    pub amount: f64,
    pub expiry: DateTime<Utc>,
}

impl fmt::Display for PrewitnessedSwap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Witnessed - {} to {}, amount={}",
            self.base, self.quote, self.amount
        )
    }
}

/// Human-unit balance per asset, replaced wholesale on each query.
pub type Balances = BTreeMap<Asset, f64>;

/// A fill on one of the configured account's orders.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub kind: OrderKind,
    pub lp: String,
    pub id: Option<u64>,
    pub detail: Value,
}

/// Venue block heights reported by the order-fills stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockProgress {
    pub confirmed: u64,
    pub latest: u64,
}

impl BlockProgress {
    pub fn from_confirmed(confirmed: u64) -> Self {
        Self {
            confirmed,
            latest: confirmed.saturating_add(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_orders_are_denominated_in_quote() {
        let order = LimitOrder::new(Asset::Eth, Asset::Usdc, Side::Buy, 1, 2000.0, 0.5);
        assert_eq!(order.denominating_asset(), Asset::Usdc);
        assert_eq!(order.sell_amount().unwrap(), 1_000_000_000);
    }

    #[test]
    fn sell_orders_are_denominated_in_base() {
        let order = LimitOrder::new(Asset::Btc, Asset::Usdc, Side::Sell, 2, 30000.0, 0.25);
        assert_eq!(order.denominating_asset(), Asset::Btc);
        assert_eq!(order.sell_amount().unwrap(), 25_000_000);
        assert_eq!(order.tick().unwrap(), 57040);
    }

    #[test]
    fn latest_block_trails_confirmed_by_two() {
        let progress = BlockProgress::from_confirmed(100);
        assert_eq!(progress.latest, 102);
    }

    #[test]
    fn latest_block_saturates_at_the_top() {
        let progress = BlockProgress::from_confirmed(u64::MAX - 1);
        assert_eq!(progress.latest, u64::MAX);
    }

    #[test]
    fn venue_version_parses() {
        assert_eq!("Perseverance".parse::<VenueVersion>().unwrap(), VenueVersion::Perseverance);
        assert!("testnet".parse::<VenueVersion>().is_err());
    }
}

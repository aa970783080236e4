//! Local record of the LP's open orders and balances.
//!
//! Only the order controller mutates the tracker; it is shared as
//! [`SharedTracker`] so each read or write is a single critical section.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::asset::Asset;
use crate::dex::calc::decode_amount_json;
use crate::errors::{AppError, Result};
use crate::models::{Balances, LimitOrder, OrderKind, RangeOrder};

pub type SharedTracker = Arc<RwLock<OrderTracker>>;

#[derive(Debug, Clone, Default)]
pub struct OrderTracker {
    limit_orders: BTreeMap<u64, LimitOrder>,
    range_orders: BTreeMap<u64, RangeOrder>,
    balances: Balances,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTracker {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert or replace by id. Returns the replaced order, if any.
    pub fn add_limit_order(&mut self, order: LimitOrder) -> Option<LimitOrder> {
        self.limit_orders.insert(order.id, order)
    }

    pub fn add_range_order(&mut self, order: RangeOrder) -> Option<RangeOrder> {
        self.range_orders.insert(order.id, order)
    }

    pub fn remove_limit_order_by_key(&mut self, id: u64) -> Result<LimitOrder> {
        self.limit_orders.remove(&id).ok_or(AppError::NotFound {
            kind: OrderKind::Limit.as_str(),
            id,
        })
    }

    pub fn remove_range_order_by_key(&mut self, id: u64) -> Result<RangeOrder> {
        self.range_orders.remove(&id).ok_or(AppError::NotFound {
            kind: OrderKind::Range.as_str(),
            id,
        })
    }

    pub fn get_limit_order_by_key(&self, id: u64) -> Option<&LimitOrder> {
        self.limit_orders.get(&id)
    }

    pub fn get_range_order_by_key(&self, id: u64) -> Option<&RangeOrder> {
        self.range_orders.get(&id)
    }

    pub fn limit_orders(&self) -> &BTreeMap<u64, LimitOrder> {
        &self.limit_orders
    }

    pub fn range_orders(&self) -> &BTreeMap<u64, RangeOrder> {
        &self.range_orders
    }

    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn balance(&self, asset: Asset) -> f64 {
        self.balances.get(&asset).copied().unwrap_or(0.0)
    }

    /// Number of tracked orders of both kinds.
    pub fn len(&self) -> usize {
        self.limit_orders.len() + self.range_orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace all balances from an `lp_asset_balances` result.
    ///
    /// Accepts the per-chain form `{"Ethereum": [{"asset": "ETH", "balance": "0x.."}]}`,
    /// a flat list of `{asset, balance}` entries, or a flat `{"ETH": "0x.."}` map.
    /// Amounts are smallest units. Nothing is replaced if any amount is malformed.
    pub fn update_balance(&mut self, snapshot: &Value) -> Result<()> {
        let snapshot = snapshot.get("result").unwrap_or(snapshot);
        let mut balances = Balances::new();
        match snapshot {
            Value::Object(entries) => {
                for (key, value) in entries {
                    match value {
                        Value::Array(items) => {
                            for item in items {
                                read_entry(item, &mut balances)?;
                            }
                        }
                        amount => insert_balance(key, amount, &mut balances)?,
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    read_entry(item, &mut balances)?;
                }
            }
            other => {
                return Err(AppError::Other(format!("unexpected balance snapshot: {other}")));
            }
        }
        self.balances = balances;
        Ok(())
    }

    pub fn subtract_balance(&mut self, asset: Asset, amount: f64) {
        *self.balances.entry(asset).or_insert(0.0) -= amount;
    }
}

fn read_entry(item: &Value, balances: &mut Balances) -> Result<()> {
    let asset = item.get("asset").and_then(Value::as_str);
    let amount = item.get("balance").or_else(|| item.get("amount"));
    match (asset, amount) {
        (Some(asset), Some(amount)) => insert_balance(asset, amount, balances),
        _ => {
            warn!(entry = %item, "[OMS] skipping malformed balance entry");
            Ok(())
        }
    }
}

fn insert_balance(symbol: &str, amount: &Value, balances: &mut Balances) -> Result<()> {
    match symbol.parse::<Asset>() {
        Ok(asset) => {
            balances.insert(asset, decode_amount_json(amount, asset)?);
            Ok(())
        }
        Err(_) => {
            warn!(asset = symbol, "[OMS] skipping balance for unknown asset");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::{RangeOrderSize, Side};

    #[test]
    fn add_is_idempotent_by_id() {
        let mut tracker = OrderTracker::new();
        let first = LimitOrder::new(Asset::Eth, Asset::Usdc, Side::Buy, 1, 1800.0, 1.0);
        let second = LimitOrder::new(Asset::Eth, Asset::Usdc, Side::Buy, 1, 1850.0, 2.0);
        tracker.add_limit_order(first);
        let replaced = tracker.add_limit_order(second.clone());
        assert!(replaced.is_some());
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get_limit_order_by_key(1), Some(&second));
    }

    #[test]
    fn removing_unknown_id_fails() {
        let mut tracker = OrderTracker::new();
        let err = tracker.remove_range_order_by_key(9).unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: "range", id: 9 }));

        tracker.add_range_order(RangeOrder::new(
            Asset::Btc,
            Asset::Usdc,
            9,
            29000.0,
            31000.0,
            RangeOrderSize::Liquidity(1_000),
        ));
        assert!(tracker.remove_range_order_by_key(9).is_ok());
        assert!(tracker.is_empty());
    }

    #[test]
    fn per_chain_balances_replace_wholesale() {
        let mut tracker = OrderTracker::new();
        tracker.subtract_balance(Asset::Flip, 1.0);
        tracker
            .update_balance(&json!({
                "result": {
                    "Ethereum": [
                        { "asset": "ETH", "balance": "0xde0b6b3a7640000" },
                        { "asset": "USDC", "balance": "0x3b9aca00" }
                    ],
                    "Bitcoin": [{ "asset": "BTC", "balance": "0x5f5e100" }]
                }
            }))
            .unwrap();
        assert_eq!(tracker.balance(Asset::Eth), 1.0);
        assert_eq!(tracker.balance(Asset::Usdc), 1000.0);
        assert_eq!(tracker.balance(Asset::Btc), 1.0);
        assert!(!tracker.balances().contains_key(&Asset::Flip));
    }

    #[test]
    fn flat_balances_skip_unknown_assets() {
        let mut tracker = OrderTracker::new();
        tracker
            .update_balance(&json!({ "Dot": 25_000_000_000u64, "SOL": "0x10" }))
            .unwrap();
        assert_eq!(tracker.balance(Asset::Dot), 2.5);
        assert_eq!(tracker.balances().len(), 1);
    }

    #[test]
    fn malformed_amount_keeps_previous_balances() {
        let mut tracker = OrderTracker::new();
        tracker.update_balance(&json!({ "USDC": "0xf4240" })).unwrap();
        assert!(tracker.update_balance(&json!({ "USDC": "0xzz" })).is_err());
        assert_eq!(tracker.balance(Asset::Usdc), 1.0);
    }

    #[test]
    fn subtract_balance() {
        let mut tracker = OrderTracker::new();
        tracker.update_balance(&json!({ "USDC": "0x3b9aca00" })).unwrap();
        tracker.subtract_balance(Asset::Usdc, 250.0);
        assert_eq!(tracker.balance(Asset::Usdc), 750.0);
    }
}

//! Typed JSON-RPC requests for the venue's node and LP API.
//!
//! Each method has its own params struct. [`RequestBuilder`] encodes them for
//! the configured [`VenueVersion`]: named objects on mainnet, positional arrays
//! on perseverance.

use serde::Serialize;
use serde_json::{Value, json};

use crate::asset::Asset;
use crate::dex::calc::encode_amount_hex;
use crate::models::{Side, VenueVersion};

/// Which server a method is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// State-chain node (`cf_*`).
    Node,
    /// LP API (`lp_*`).
    LiquidityProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    AccountInfo,
    PoolInfo,
    PoolDepth,
    PoolLiquidity,
    PoolOrders,
    PoolRangeOrdersLiquidityValue,
    RequiredRatioForRangeOrder,
    AssetBalances,
    SetLimitOrder,
    UpdateLimitOrder,
    SetRangeOrder,
    UpdateRangeOrder,
    SubscribePoolPrice,
    SubscribePrewitnessSwaps,
    SubscribeOrderFills,
}

impl RpcMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RpcMethod::AccountInfo => "cf_account_info",
            RpcMethod::PoolInfo => "cf_pool_info",
            RpcMethod::PoolDepth => "cf_pool_depth",
            RpcMethod::PoolLiquidity => "cf_pool_liquidity",
            RpcMethod::PoolOrders => "cf_pool_orders",
            RpcMethod::PoolRangeOrdersLiquidityValue => "cf_pool_range_orders_liquidity_value",
            RpcMethod::RequiredRatioForRangeOrder => "cf_required_asset_ratio_for_range_order",
            RpcMethod::AssetBalances => "lp_asset_balances",
            RpcMethod::SetLimitOrder => "lp_set_limit_order",
            RpcMethod::UpdateLimitOrder => "lp_update_limit_order",
            RpcMethod::SetRangeOrder => "lp_set_range_order",
            RpcMethod::UpdateRangeOrder => "lp_update_range_order",
            RpcMethod::SubscribePoolPrice => "cf_subscribe_pool_price",
            RpcMethod::SubscribePrewitnessSwaps => "cf_subscribe_prewitness_swaps",
            RpcMethod::SubscribeOrderFills => "lp_subscribe_order_fills",
        }
    }

    pub fn endpoint(self) -> Endpoint {
        if self.as_str().starts_with("lp_") {
            Endpoint::LiquidityProvider
        } else {
            Endpoint::Node
        }
    }
}

/// A method plus its encoded params.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: RpcMethod,
    pub params: Value,
}

/// Full JSON-RPC 2.0 envelope, used where the crate writes frames itself
/// (websocket subscriptions).
#[derive(Debug, Serialize)]
pub struct JsonRpcEnvelope<'a> {
    pub id: u64,
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> JsonRpcEnvelope<'a> {
    pub fn new(id: u64, request: &'a RpcRequest) -> Self {
        Self {
            id,
            jsonrpc: "2.0",
            method: request.method.as_str(),
            params: &request.params,
        }
    }
}

/// Direction of an amount change on an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountChange {
    Increase(u128),
    Decrease(u128),
}

impl AmountChange {
    /// Change needed to move from `current` to `target` smallest units.
    pub fn between(current: u128, target: u128) -> Self {
        if target >= current {
            AmountChange::Increase(target - current)
        } else {
            AmountChange::Decrease(current - target)
        }
    }

    fn to_wire(self) -> Value {
        match self {
            AmountChange::Increase(units) => json!({ "Increase": encode_amount_hex(units) }),
            AmountChange::Decrease(units) => json!({ "Decrease": encode_amount_hex(units) }),
        }
    }
}

/// Range order size in smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireRangeSize {
    Liquidity(u128),
    AssetAmounts {
        max_base: u128,
        max_quote: u128,
        min_base: u128,
        min_quote: u128,
    },
}

impl WireRangeSize {
    fn to_wire(self) -> Value {
        match self {
            WireRangeSize::Liquidity(liquidity) => json!({ "Liquidity": { "liquidity": liquidity } }),
            WireRangeSize::AssetAmounts {
                max_base,
                max_quote,
                min_base,
                min_quote,
            } => json!({
                "AssetAmounts": {
                    "maximum": { "base": encode_amount_hex(max_base), "quote": encode_amount_hex(max_quote) },
                    "minimum": { "base": encode_amount_hex(min_base), "quote": encode_amount_hex(min_quote) },
                }
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetLimitOrderParams {
    pub base: Asset,
    pub quote: Asset,
    pub side: Side,
    pub id: u64,
    pub tick: i32,
    pub sell_amount: u128,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateLimitOrderParams {
    pub base: Asset,
    pub quote: Asset,
    pub side: Side,
    pub id: u64,
    pub tick: Option<i32>,
    pub amount_change: AmountChange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetRangeOrderParams {
    pub base: Asset,
    pub quote: Asset,
    pub id: u64,
    pub tick_range: (i32, i32),
    pub size: WireRangeSize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRangeOrderParams {
    pub base: Asset,
    pub quote: Asset,
    pub id: u64,
    pub tick_range: Option<(i32, i32)>,
    pub increase: bool,
    pub size: WireRangeSize,
}

/// Encodes typed params into [`RpcRequest`]s for one protocol version.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestBuilder {
    version: VenueVersion,
}

impl RequestBuilder {
    pub fn new(version: VenueVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> VenueVersion {
        self.version
    }

    fn asset(&self, asset: Asset) -> &'static str {
        asset.wire_name(self.version)
    }

    /// Build a request from `(name, value)` pairs in positional order.
    fn request(&self, method: RpcMethod, fields: Vec<(&'static str, Value)>) -> RpcRequest {
        let params = match self.version {
            VenueVersion::Mainnet => {
                Value::Object(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
            }
            VenueVersion::Perseverance => Value::Array(fields.into_iter().map(|(_, v)| v).collect()),
        };
        RpcRequest { method, params }
    }

    fn pair(&self, base: Asset, quote: Asset) -> Vec<(&'static str, Value)> {
        vec![
            ("base_asset", json!(self.asset(base))),
            ("quote_asset", json!(self.asset(quote))),
        ]
    }

    pub fn account_info(&self, account_id: &str) -> RpcRequest {
        self.request(RpcMethod::AccountInfo, vec![("account_id", json!(account_id))])
    }

    pub fn pool_info(&self, base: Asset, quote: Asset) -> RpcRequest {
        self.request(RpcMethod::PoolInfo, self.pair(base, quote))
    }

    pub fn pool_liquidity(&self, base: Asset, quote: Asset) -> RpcRequest {
        self.request(RpcMethod::PoolLiquidity, self.pair(base, quote))
    }

    pub fn pool_depth(&self, base: Asset, quote: Asset, tick_range: (i32, i32)) -> RpcRequest {
        let mut fields = self.pair(base, quote);
        fields.push(("tick_range", json!([tick_range.0, tick_range.1])));
        self.request(RpcMethod::PoolDepth, fields)
    }

    pub fn pool_orders(&self, base: Asset, quote: Asset, lp: Option<&str>) -> RpcRequest {
        let mut fields = self.pair(base, quote);
        if let Some(lp) = lp {
            fields.push(("lp", json!(lp)));
        }
        self.request(RpcMethod::PoolOrders, fields)
    }

    pub fn pool_range_orders_liquidity_value(
        &self,
        base: Asset,
        quote: Asset,
        tick_range: (i32, i32),
        liquidity: u128,
    ) -> RpcRequest {
        let mut fields = self.pair(base, quote);
        fields.push(("tick_range", json!([tick_range.0, tick_range.1])));
        fields.push(("liquidity", json!(liquidity)));
        self.request(RpcMethod::PoolRangeOrdersLiquidityValue, fields)
    }

    pub fn required_ratio_for_range_order(
        &self,
        base: Asset,
        quote: Asset,
        tick_range: (i32, i32),
    ) -> RpcRequest {
        let mut fields = self.pair(base, quote);
        fields.push(("tick_range", json!([tick_range.0, tick_range.1])));
        self.request(RpcMethod::RequiredRatioForRangeOrder, fields)
    }

    pub fn asset_balances(&self) -> RpcRequest {
        self.request(RpcMethod::AssetBalances, Vec::new())
    }

    pub fn set_limit_order(&self, p: &SetLimitOrderParams) -> RpcRequest {
        let mut fields = self.pair(p.base, p.quote);
        fields.extend([
            ("side", json!(p.side)),
            ("id", json!(p.id)),
            ("tick", json!(p.tick)),
            ("sell_amount", json!(encode_amount_hex(p.sell_amount))),
        ]);
        self.request(RpcMethod::SetLimitOrder, fields)
    }

    pub fn update_limit_order(&self, p: &UpdateLimitOrderParams) -> RpcRequest {
        let mut fields = self.pair(p.base, p.quote);
        fields.extend([
            ("side", json!(p.side)),
            ("id", json!(p.id)),
            ("tick", json!(p.tick)),
            ("amount_change", p.amount_change.to_wire()),
        ]);
        self.request(RpcMethod::UpdateLimitOrder, fields)
    }

    pub fn set_range_order(&self, p: &SetRangeOrderParams) -> RpcRequest {
        let mut fields = self.pair(p.base, p.quote);
        fields.extend([
            ("id", json!(p.id)),
            ("tick_range", json!([p.tick_range.0, p.tick_range.1])),
            ("size", p.size.to_wire()),
        ]);
        self.request(RpcMethod::SetRangeOrder, fields)
    }

    pub fn update_range_order(&self, p: &UpdateRangeOrderParams) -> RpcRequest {
        let change = if p.increase { "Increase" } else { "Decrease" };
        let mut fields = self.pair(p.base, p.quote);
        fields.push(("id", json!(p.id)));
        if let Some((lower, upper)) = p.tick_range {
            fields.push(("tick_range", json!([lower, upper])));
        }
        fields.push(("size_change", json!({ change: p.size.to_wire() })));
        self.request(RpcMethod::UpdateRangeOrder, fields)
    }

    pub fn subscribe_pool_price(&self, base: Asset, quote: Asset) -> RpcRequest {
        self.request(RpcMethod::SubscribePoolPrice, self.pair(base, quote))
    }

    pub fn subscribe_prewitness_swaps(&self, base: Asset, quote: Asset) -> RpcRequest {
        self.request(RpcMethod::SubscribePrewitnessSwaps, self.pair(base, quote))
    }

    pub fn subscribe_order_fills(&self) -> RpcRequest {
        RpcRequest {
            method: RpcMethod::SubscribeOrderFills,
            params: json!([]),
        }
    }
}

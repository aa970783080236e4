use serde_json::Value;
use tracing::info;

use super::{StreamEvent, StreamHandler};
use crate::dex::calc::decode_fixed_point_hex;
use crate::dex::request::{RequestBuilder, RpcRequest};
use crate::dex::state::PoolHandle;
use crate::errors::{AppError, Result};
use crate::models::NetworkStatus;

/// Keeps a pool's price current from `cf_subscribe_pool_price`.
pub struct PoolPriceHandler {
    pool: PoolHandle,
}

impl PoolPriceHandler {
    pub fn new(pool: PoolHandle) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PoolHandle {
        &self.pool
    }
}

impl StreamHandler for PoolPriceHandler {
    fn label(&self) -> String {
        format!("pool price {}", self.pool.snapshot())
    }

    fn request(&self, builder: &RequestBuilder) -> RpcRequest {
        let pool = self.pool.snapshot();
        builder.subscribe_pool_price(pool.base, pool.quote)
    }

    fn on_subscribed(&mut self) {
        self.pool.set_status(NetworkStatus::Connected);
    }

    fn handle(&mut self, result: Value) -> Result<Vec<StreamEvent>> {
        let hex = result
            .get("price")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::HexDecode(format!("missing price in {result}")))?;
        let (base, quote) = self.pool.snapshot().key();
        let price = decode_fixed_point_hex(hex, base, quote)?;
        self.pool.update(|pool| pool.price = Some(price));
        info!(%base, %quote, price, "[POOL] pool price");
        Ok(vec![StreamEvent::PoolPrice { base, quote, price }])
    }

    fn on_closed(&mut self) {
        self.pool.set_status(NetworkStatus::NotConnected);
    }
}

//! Registry of the pools a strategy trades, refreshed over RPC and streams.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info, info_span, warn};

use crate::asset::Asset;
use crate::dex::calc::price_to_tick;
use crate::dex::client::DexClient;
use crate::dex::state::{Pool, PoolFees, PoolHandle};
use crate::errors::Result;
use crate::stream::{PoolPriceHandler, StreamEvent, Subscription};
use crate::utils::every;

#[derive(Clone)]
pub struct PoolRegistry {
    client: DexClient,
    pools: Arc<RwLock<BTreeMap<(Asset, Asset), PoolHandle>>>,
    span: Span,
}

impl PoolRegistry {
    pub fn new(client: DexClient) -> Self {
        Self {
            client,
            pools: Arc::new(RwLock::new(BTreeMap::new())),
            span: info_span!("pools"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Register a pool, returning the existing handle if already present.
    pub fn add_pool(&self, base: Asset, quote: Asset) -> PoolHandle {
        let mut pools = self.pools.write();
        if let Some(handle) = pools.get(&(base, quote)) {
            return handle.clone();
        }
        let handle = PoolHandle::new(Pool::new(base, quote));
        pools.insert((base, quote), handle.clone());
        self.span.in_scope(|| info!(%base, %quote, "[POOL] added pool"));
        handle
    }

    pub fn pool(&self, base: Asset, quote: Asset) -> Option<PoolHandle> {
        self.pools.read().get(&(base, quote)).cloned()
    }

    pub fn pools(&self) -> Vec<PoolHandle> {
        self.pools.read().values().cloned().collect()
    }

    /// Refresh the fee schedule of every pool. Failures keep the old fees.
    pub async fn update_pool_fees(&self) {
        for handle in self.pools() {
            let (base, quote) = handle.snapshot().key();
            let fees = self
                .client
                .pool_info(base, quote)
                .await
                .and_then(|info| serde_json::from_value::<PoolFees>(info).map_err(Into::into));
            match fees {
                Ok(fees) => handle.update(|pool| pool.fees = Some(fees)),
                Err(e) => warn!(error = %e, %base, %quote, "[POOL] failed to refresh pool fees"),
            }
        }
    }

    /// Refresh liquidity of every pool concurrently.
    pub async fn update_all_pools(&self) {
        let updates = self.pools().into_iter().map(|handle| async move {
            let (base, quote) = handle.snapshot().key();
            match self.client.pool_liquidity(base, quote).await {
                Ok(liquidity) => handle.update(|pool| pool.liquidity = Some(liquidity)),
                Err(e) => warn!(error = %e, %base, %quote, "[POOL] failed to refresh pool liquidity"),
            }
        });
        join_all(updates).await;
    }

    /// Liquidity available between two prices.
    pub async fn pool_depth(
        &self,
        base: Asset,
        quote: Asset,
        lower_price: f64,
        upper_price: f64,
    ) -> Result<Value> {
        let ticks = (
            price_to_tick(lower_price, base, quote)?,
            price_to_tick(upper_price, base, quote)?,
        );
        self.client.pool_depth(base, quote, ticks).await
    }

    /// Periodically refresh fees and liquidity until cancelled.
    pub fn spawn_refresher(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let registry = self.clone();
        let span = self.span.clone();
        tokio::spawn(
            async move {
                every(interval, cancel, || async {
                    registry.update_pool_fees().await;
                    registry.update_all_pools().await;
                })
                .await;
                info!("[POOL] refresher stopped");
            }
            .instrument(span),
        )
    }

    /// Subscribe to the price stream of every registered pool.
    pub fn start_price_streams(
        &self,
        url: &str,
        cancel: &CancellationToken,
        events: Option<mpsc::UnboundedSender<StreamEvent>>,
    ) -> Vec<JoinHandle<PoolPriceHandler>> {
        self.pools()
            .into_iter()
            .map(|handle| {
                let pool = handle.snapshot().to_string();
                let span = info_span!(parent: &self.span, "stream", %pool);
                let handler = PoolPriceHandler::new(handle);
                let mut sub =
                    Subscription::new(url, handler, self.client.version()).with_span(span);
                if let Some(tx) = events.clone() {
                    sub = sub.with_events(tx);
                }
                info!("[POOL] starting price stream for pool {pool}");
                sub.spawn(cancel.child_token()).task
            })
            .collect()
    }
}

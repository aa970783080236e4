use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::asset::Asset;
use crate::models::NetworkStatus;

/// Fee schedule reported by `cf_pool_info`, in hundredths of a pip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PoolFees {
    #[serde(default)]
    pub limit_order_fee_hundredth_pips: u32,
    #[serde(default)]
    pub range_order_fee_hundredth_pips: u32,
}

/// Last-seen state of one (base, quote) pool.
#[derive(Clone, Debug, PartialEq)]
pub struct Pool {
    pub base: Asset,
    pub quote: Asset,
    /// Quote per base, `None` until the first price frame arrives.
    pub price: Option<f64>,
    pub fees: Option<PoolFees>,
    /// Raw `cf_pool_liquidity` result.
    pub liquidity: Option<Value>,
    pub status: NetworkStatus,
}

impl Pool {
    pub fn new(base: Asset, quote: Asset) -> Self {
        Self {
            base,
            quote,
            price: None,
            fees: None,
            liquidity: None,
            status: NetworkStatus::NotConnected,
        }
    }

    pub fn key(&self) -> (Asset, Asset) {
        (self.base, self.quote)
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// Shared handle to a pool. Writers mutate through [`PoolHandle::update`];
/// readers take snapshots or subscribe to changes.
#[derive(Clone, Debug)]
pub struct PoolHandle {
    tx: Arc<watch::Sender<Pool>>,
}

impl PoolHandle {
    pub fn new(pool: Pool) -> Self {
        let (tx, _rx) = watch::channel(pool);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Pool {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Pool> {
        self.tx.subscribe()
    }

    pub fn update(&self, f: impl FnOnce(&mut Pool)) {
        self.tx.send_modify(f);
    }

    pub fn set_status(&self, status: NetworkStatus) {
        self.tx.send_if_modified(|pool| {
            let changed = pool.status != status;
            pool.status = status;
            changed
        });
    }

    pub fn price(&self) -> Option<f64> {
        self.tx.borrow().price
    }

    pub fn status(&self) -> NetworkStatus {
        self.tx.borrow().status
    }
}

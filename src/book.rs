//! Mirror of a pool's shared order book.
//!
//! The book is rebuilt from the venue's full order snapshot on every sync:
//! zero-amount limit orders are dropped, bids sorted by descending price, asks
//! by ascending price (stable, so equal prices keep venue order), and every
//! order owned by the configured LP is collected into `open_lp_orders`.

use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info, info_span, warn};

use crate::asset::Asset;
use crate::dex::calc::{decode_amount_json, decode_u128_json, tick_to_price};
use crate::dex::client::DexClient;
use crate::errors::Result;
use crate::models::{LimitOrder, OwnOrder, RangeOrder, RangeOrderSize, Side};

/// `cf_pool_orders` result.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolOrdersSnapshot {
    pub limit_orders: LimitOrdersSnapshot,
    #[serde(default)]
    pub range_orders: Vec<RawRangeOrder>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitOrdersSnapshot {
    #[serde(default)]
    pub asks: Vec<RawLimitOrder>,
    #[serde(default)]
    pub bids: Vec<RawLimitOrder>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLimitOrder {
    pub lp: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub id: u64,
    pub tick: i32,
    /// Smallest units: quote asset for bids, base asset for asks.
    pub sell_amount: Value,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TickRange {
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRangeOrder {
    pub lp: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub id: u64,
    pub range: TickRange,
    #[serde(deserialize_with = "lenient_u128")]
    pub liquidity: u128,
}

fn lenient_u128<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u128, D::Error> {
    let value = Value::deserialize(deserializer)?;
    decode_u128_json(&value).map_err(serde::de::Error::custom)
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    let value = lenient_u128(deserializer)?;
    u64::try_from(value).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    base: Asset,
    quote: Asset,
    account: String,
    bids: Vec<LimitOrder>,
    asks: Vec<LimitOrder>,
    range_orders: Vec<RangeOrder>,
    lp_open_orders: Vec<OwnOrder>,
    span: Span,
}

impl OrderBook {
    pub fn new(base: Asset, quote: Asset, account: impl Into<String>) -> Self {
        let span = info_span!("book", pair = %format!("{base}-{quote}"));
        Self {
            base,
            quote,
            account: account.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            range_orders: Vec::new(),
            lp_open_orders: Vec::new(),
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn base(&self) -> Asset {
        self.base
    }

    pub fn quote(&self) -> Asset {
        self.quote
    }

    pub fn bids(&self) -> &[LimitOrder] {
        &self.bids
    }

    pub fn asks(&self) -> &[LimitOrder] {
        &self.asks
    }

    pub fn range_orders(&self) -> &[RangeOrder] {
        &self.range_orders
    }

    pub fn top_bid(&self) -> Option<&LimitOrder> {
        self.bids.first()
    }

    pub fn top_ask(&self) -> Option<&LimitOrder> {
        self.asks.first()
    }

    /// Orders in the last snapshot owned by the configured account.
    pub fn open_lp_orders(&self) -> &[OwnOrder] {
        &self.lp_open_orders
    }

    /// Fetch the pool's orders and rebuild the book.
    pub async fn sync(&mut self, client: &DexClient) -> Result<()> {
        let raw = client
            .pool_orders(self.base, self.quote)
            .instrument(self.span.clone())
            .await?;
        let snapshot: PoolOrdersSnapshot = serde_json::from_value(raw)?;
        self.apply_snapshot(snapshot);
        Ok(())
    }

    pub fn apply_snapshot(&mut self, snapshot: PoolOrdersSnapshot) {
        let _entered = self.span.clone().entered();
        let (base, quote) = (self.base, self.quote);
        let mut own = Vec::new();

        let mut bids = Vec::with_capacity(snapshot.limit_orders.bids.len());
        for raw in &snapshot.limit_orders.bids {
            let price = tick_to_price(raw.tick, base, quote);
            // bids rest in the quote asset
            let amount = match decode_amount_json(&raw.sell_amount, quote) {
                Ok(quote_amount) => quote_amount / price,
                Err(e) => {
                    warn!(error = %e, id = raw.id, "[BOOK] skipping bid with bad amount");
                    continue;
                }
            };
            if amount == 0.0 {
                continue;
            }
            let order = self.limit_order(raw, Side::Buy, price, amount);
            if order.lp_account.as_deref() == Some(self.account.as_str()) {
                own.push(OwnOrder::Limit(order.clone()));
            }
            bids.push(order);
        }

        let mut asks = Vec::with_capacity(snapshot.limit_orders.asks.len());
        for raw in &snapshot.limit_orders.asks {
            let price = tick_to_price(raw.tick, base, quote);
            let amount = match decode_amount_json(&raw.sell_amount, base) {
                Ok(amount) => amount,
                Err(e) => {
                    warn!(error = %e, id = raw.id, "[BOOK] skipping ask with bad amount");
                    continue;
                }
            };
            if amount == 0.0 {
                continue;
            }
            let order = self.limit_order(raw, Side::Sell, price, amount);
            if order.lp_account.as_deref() == Some(self.account.as_str()) {
                own.push(OwnOrder::Limit(order.clone()));
            }
            asks.push(order);
        }

        let mut range_orders = Vec::with_capacity(snapshot.range_orders.len());
        for raw in snapshot.range_orders {
            let mut order = RangeOrder::new(
                base,
                quote,
                raw.id,
                tick_to_price(raw.range.start, base, quote),
                tick_to_price(raw.range.end, base, quote),
                RangeOrderSize::Liquidity(raw.liquidity),
            );
            order.lp_account = Some(raw.lp);
            if order.lp_account.as_deref() == Some(self.account.as_str()) {
                own.push(OwnOrder::Range(order.clone()));
            }
            range_orders.push(order);
        }

        bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));

        if bids.is_empty() {
            info!("[BOOK] no limit order bids in current order book");
        }
        if asks.is_empty() {
            info!("[BOOK] no limit order asks in current order book");
        }

        self.bids = bids;
        self.asks = asks;
        self.range_orders = range_orders;
        self.lp_open_orders = own;
    }

    fn limit_order(&self, raw: &RawLimitOrder, side: Side, price: f64, amount: f64) -> LimitOrder {
        let mut order = LimitOrder::new(self.base, self.quote, side, raw.id, price, amount);
        order.lp_account = Some(raw.lp.clone());
        order
    }
}

/// Sync once, then keep re-syncing every `interval` and publish each rebuilt
/// book. A failed sync is logged and the previous book stays published.
pub async fn spawn_book_watcher(
    mut book: OrderBook,
    client: DexClient,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<(watch::Receiver<OrderBook>, JoinHandle<()>)> {
    book.sync(&client).await?;
    let (tx, rx) = watch::channel(book.clone());
    let span = book.span.clone();

    let handle = tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick fires immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => match book.sync(&client).await {
                        Ok(()) => {
                            let _ = tx.send(book.clone());
                        }
                        Err(e) => warn!(error = %e, "[BOOK] failed to refresh order book"),
                    },
                }
            }
        }
        .instrument(span),
    );

    Ok((rx, handle))
}

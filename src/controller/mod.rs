//! Order lifecycle: create, update and cancel orders on the venue and keep
//! the [`OrderTracker`](crate::tracker::OrderTracker) in line with what the
//! venue accepted.
//!
//! A venue response carrying an `error` object is a rejection: it is logged
//! and the tracker is left untouched. Cancelling is a `set` with zero size;
//! the order leaves the tracker only once the venue accepts that.

use std::future::Future;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::asset::amount_to_smallest_units;
use crate::dex::calc::validate_tick_range;
use crate::dex::client::{DexClient, RpcResponse};
use crate::dex::request::{
    AmountChange, SetLimitOrderParams, SetRangeOrderParams, UpdateLimitOrderParams,
    UpdateRangeOrderParams, WireRangeSize,
};
use crate::errors::{AppError, Result};
use crate::models::{Balances, LimitOrder, OrderKind, OwnOrder, RangeOrder, RangeOrderSize};
use crate::tracker::SharedTracker;

pub mod bulk;
pub mod sequencer;

pub use bulk::{Batch, BatchReport};
pub use sequencer::OrderSequencer;

use sequencer::Pending;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Refuse range orders whose lower tick is not below the upper tick,
    /// instead of logging and submitting them.
    pub strict_tick_range: bool,
    /// Run lifecycle calls on the same order in dispatch order.
    pub sequencing: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            strict_tick_range: false,
            sequencing: true,
        }
    }
}

/// What the venue made of a lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    Accepted,
    /// The venue answered with an error object; carries its message.
    Rejected(String),
}

impl OrderOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderOutcome::Accepted)
    }
}

type OrderFuture = BoxFuture<'static, Result<OrderOutcome>>;

#[derive(Clone)]
pub struct OrderController {
    client: DexClient,
    tracker: SharedTracker,
    sequencer: OrderSequencer,
    config: ControllerConfig,
    span: Span,
}

impl OrderController {
    pub fn new(client: DexClient, tracker: SharedTracker, config: ControllerConfig) -> Self {
        Self {
            client,
            tracker,
            sequencer: OrderSequencer::new(),
            config,
            span: info_span!("oms"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    pub fn client(&self) -> &DexClient {
        &self.client
    }

    pub fn open_limit_orders(&self) -> Vec<LimitOrder> {
        self.tracker.read().limit_orders().values().cloned().collect()
    }

    pub fn open_range_orders(&self) -> Vec<RangeOrder> {
        self.tracker.read().range_orders().values().cloned().collect()
    }

    pub fn book_balance(&self) -> Balances {
        self.tracker.read().balances().clone()
    }

    /// Refresh balances from the venue into the tracker.
    pub async fn get_asset_balances(&self) -> Result<Balances> {
        let raw = self
            .client
            .asset_balances()
            .instrument(self.span.clone())
            .await?;
        let mut tracker = self.tracker.write();
        tracker.update_balance(&raw)?;
        Ok(tracker.balances().clone())
    }

    // ---- single-order lifecycle -------------------------------------------
    //
    // Each call joins the order's queue when it is made, not when the
    // returned future is first polled.

    pub fn create_limit_order(&self, order: LimitOrder) -> OrderFuture {
        self.dispatch(OrderKind::Limit, order.id, "create_limit_order", move |this| async move {
            this.create_limit(order).await
        })
    }

    /// Move a limit order to a new price and/or amount.
    pub fn update_limit_order(
        &self,
        order: LimitOrder,
        price: Option<f64>,
        amount: Option<f64>,
    ) -> OrderFuture {
        self.dispatch(OrderKind::Limit, order.id, "update_limit_order", move |this| async move {
            this.update_limit(order, price, amount).await
        })
    }

    /// Cancel a tracked limit order. Fails with `NotFound` if the id is not tracked.
    pub fn delete_limit_order(&self, id: u64) -> OrderFuture {
        self.dispatch(OrderKind::Limit, id, "delete_limit_order", move |this| async move {
            let Some(order) = this.tracker.read().get_limit_order_by_key(id).cloned() else {
                return Err(AppError::NotFound {
                    kind: OrderKind::Limit.as_str(),
                    id,
                });
            };
            this.cancel_limit(order, "delete_limit_order").await
        })
    }

    /// Cancel a limit order whether or not it is tracked, e.g. one left over
    /// from an earlier run and found in the venue book.
    pub fn force_cancel_limit_order(&self, order: LimitOrder) -> OrderFuture {
        self.dispatch(OrderKind::Limit, order.id, "force_cancel_limit_order", move |this| async move {
            this.cancel_limit(order, "force_cancel_limit_order").await
        })
    }

    pub fn create_range_order(&self, order: RangeOrder) -> OrderFuture {
        self.dispatch(OrderKind::Range, order.id, "create_range_order", move |this| async move {
            this.create_range(order).await
        })
    }

    /// Change a range order's liquidity and/or price bounds.
    pub fn update_range_order(
        &self,
        order: RangeOrder,
        liquidity: Option<u128>,
        lower_price: Option<f64>,
        upper_price: Option<f64>,
    ) -> OrderFuture {
        self.dispatch(OrderKind::Range, order.id, "update_range_order", move |this| async move {
            this.update_range(order, liquidity, lower_price, upper_price).await
        })
    }

    pub fn delete_range_order(&self, id: u64) -> OrderFuture {
        self.dispatch(OrderKind::Range, id, "delete_range_order", move |this| async move {
            let Some(order) = this.tracker.read().get_range_order_by_key(id).cloned() else {
                return Err(AppError::NotFound {
                    kind: OrderKind::Range.as_str(),
                    id,
                });
            };
            this.cancel_range(order, "delete_range_order").await
        })
    }

    pub fn force_cancel_range_order(&self, order: RangeOrder) -> OrderFuture {
        self.dispatch(OrderKind::Range, order.id, "force_cancel_range_order", move |this| async move {
            this.cancel_range(order, "force_cancel_range_order").await
        })
    }

    // ---- bulk -------------------------------------------------------------

    /// Create every candidate with a non-zero amount, one task each.
    pub fn send_limit_orders(&self, orders: impl IntoIterator<Item = LimitOrder>) -> Batch {
        let mut batch = Batch::new("send_limit_orders");
        for order in orders {
            if order.amount == 0.0 {
                info!("[OMS] limit order {} has amount = 0, will not place order", order.id);
                batch.skip();
                continue;
            }
            batch.tasks_mut().spawn(self.create_limit_order(order));
        }
        batch
    }

    pub fn send_range_orders(&self, orders: impl IntoIterator<Item = RangeOrder>) -> Batch {
        let mut batch = Batch::new("send_range_orders");
        for order in orders {
            if order.size.is_zero() {
                info!("[OMS] range order {} has size = 0, will not place order", order.id);
                batch.skip();
                continue;
            }
            batch.tasks_mut().spawn(self.create_range_order(order));
        }
        batch
    }

    pub fn cancel_limit_orders(&self, ids: impl IntoIterator<Item = u64>) -> Batch {
        let mut batch = Batch::new("cancel_limit_orders");
        for id in ids {
            batch.tasks_mut().spawn(self.delete_limit_order(id));
        }
        batch
    }

    pub fn cancel_range_orders(&self, ids: impl IntoIterator<Item = u64>) -> Batch {
        let mut batch = Batch::new("cancel_range_orders");
        for id in ids {
            batch.tasks_mut().spawn(self.delete_range_order(id));
        }
        batch
    }

    /// Cancel every given order found in the venue book, tracked or not.
    pub fn check_order_book_and_cancel(&self, orders: &[OwnOrder]) -> Batch {
        let mut batch = Batch::new("check_order_book_and_cancel");
        for order in orders {
            let call = match order {
                OwnOrder::Limit(o) => {
                    info!("[OMS] open limit order in order book: {}. Deleting.", o.id);
                    self.force_cancel_limit_order(o.clone())
                }
                OwnOrder::Range(o) => {
                    info!("[OMS] open range order in order book: {}. Deleting.", o.id);
                    self.force_cancel_range_order(o.clone())
                }
            };
            batch.tasks_mut().spawn(call);
        }
        batch
    }

    // ---- internals --------------------------------------------------------

    fn dispatch<F, Fut>(&self, kind: OrderKind, id: u64, operation: &'static str, call: F) -> OrderFuture
    where
        F: FnOnce(OrderController) -> Fut + Send + 'static,
        Fut: Future<Output = Result<OrderOutcome>> + Send + 'static,
    {
        let pending: Option<Pending> = self
            .config
            .sequencing
            .then(|| self.sequencer.enqueue(kind, id));
        let this = self.clone();
        async move {
            let _ticket = match pending {
                Some(pending) => Some(pending.ready().await),
                None => None,
            };
            call(this)
                .await
                .inspect_err(|e| error!(error = %e, id, "[OMS] {operation} failed"))
        }
        .instrument(self.span.clone())
        .boxed()
    }

    /// Log and return the venue's error message, if any.
    fn rejection(&self, operation: &str, response: &RpcResponse) -> Option<String> {
        let message = response.error.as_ref()?.message.clone();
        error!("[OMS] {operation}: {message}");
        Some(message)
    }

    async fn create_limit(&self, mut order: LimitOrder) -> Result<OrderOutcome> {
        info!("[OMS] creating limit order - {order}");
        let params = SetLimitOrderParams {
            base: order.base,
            quote: order.quote,
            side: order.side,
            id: order.id,
            tick: order.tick()?,
            sell_amount: order.sell_amount()?,
        };
        let response = self.client.set_limit_order(&params).await?;
        if let Some(message) = self.rejection("create_limit_order", &response) {
            return Ok(OrderOutcome::Rejected(message));
        }

        order.timestamp = Some(Utc::now());
        order.lp_account = Some(self.client.account().to_string());
        let id = order.id;
        self.tracker.write().add_limit_order(order);
        info!("[OMS] created new limit order: id={id}");
        Ok(OrderOutcome::Accepted)
    }

    async fn update_limit(
        &self,
        mut order: LimitOrder,
        price: Option<f64>,
        amount: Option<f64>,
    ) -> Result<OrderOutcome> {
        info!("[OMS] updating limit order - {}", order.id);
        if let Some(price) = price {
            order.price = price;
        }
        if let Some(amount) = amount {
            order.amount = amount;
        }

        let target = order.sell_amount()?;
        let tracked = self.tracker.read().get_limit_order_by_key(order.id).cloned();
        let amount_change = match tracked {
            Some(current) => AmountChange::between(current.sell_amount()?, target),
            None => AmountChange::Increase(target),
        };
        let params = UpdateLimitOrderParams {
            base: order.base,
            quote: order.quote,
            side: order.side,
            id: order.id,
            tick: Some(order.tick()?),
            amount_change,
        };
        let response = self.client.update_limit_order(&params).await?;
        if let Some(message) = self.rejection("update_limit_order", &response) {
            return Ok(OrderOutcome::Rejected(message));
        }

        order.timestamp = Some(Utc::now());
        order.lp_account = Some(self.client.account().to_string());
        let id = order.id;
        self.tracker.write().add_limit_order(order);
        info!("[OMS] updated limit order: id={id}");
        Ok(OrderOutcome::Accepted)
    }

    async fn cancel_limit(&self, mut order: LimitOrder, operation: &str) -> Result<OrderOutcome> {
        info!("[OMS] {operation} - {}", order.id);
        order.amount = 0.0;
        let params = SetLimitOrderParams {
            base: order.base,
            quote: order.quote,
            side: order.side,
            id: order.id,
            tick: order.tick()?,
            sell_amount: 0,
        };
        let response = self.client.set_limit_order(&params).await?;
        if let Some(message) = self.rejection(operation, &response) {
            return Ok(OrderOutcome::Rejected(message));
        }

        if let Err(e) = self.tracker.write().remove_limit_order_by_key(order.id) {
            debug!(error = %e, "[OMS] {operation}: order was not tracked");
        }
        info!("[OMS] limit order deleted: {}", order.id);
        Ok(OrderOutcome::Accepted)
    }

    /// Range size in smallest units; asset-amount bounds are (base, quote).
    fn wire_size(order: &RangeOrder) -> Result<WireRangeSize> {
        Ok(match order.size {
            RangeOrderSize::Liquidity(liquidity) => WireRangeSize::Liquidity(liquidity),
            RangeOrderSize::AssetAmounts { minimum, maximum } => WireRangeSize::AssetAmounts {
                max_base: amount_to_smallest_units(order.base, maximum.0)?,
                max_quote: amount_to_smallest_units(order.quote, maximum.1)?,
                min_base: amount_to_smallest_units(order.base, minimum.0)?,
                min_quote: amount_to_smallest_units(order.quote, minimum.1)?,
            },
        })
    }

    async fn create_range(&self, mut order: RangeOrder) -> Result<OrderOutcome> {
        info!("[OMS] creating range order - {order}");
        let (lower, upper) = order.ticks()?;
        validate_tick_range(lower, upper, self.config.strict_tick_range)?;
        let params = SetRangeOrderParams {
            base: order.base,
            quote: order.quote,
            id: order.id,
            tick_range: (lower, upper),
            size: Self::wire_size(&order)?,
        };
        let response = self.client.set_range_order(&params).await?;
        if let Some(message) = self.rejection("create_range_order", &response) {
            return Ok(OrderOutcome::Rejected(message));
        }

        order.timestamp = Some(Utc::now());
        order.lp_account = Some(self.client.account().to_string());
        let id = order.id;
        self.tracker.write().add_range_order(order);
        info!("[OMS] created new range order: id={id}");
        Ok(OrderOutcome::Accepted)
    }

    async fn update_range(
        &self,
        mut order: RangeOrder,
        liquidity: Option<u128>,
        lower_price: Option<f64>,
        upper_price: Option<f64>,
    ) -> Result<OrderOutcome> {
        info!("[OMS] updating range order - {}", order.id);
        if let Some(liquidity) = liquidity {
            order.size = RangeOrderSize::Liquidity(liquidity);
        }
        if let Some(price) = lower_price {
            order.lower_price = price;
        }
        if let Some(price) = upper_price {
            order.upper_price = price;
        }

        let (lower, upper) = order.ticks()?;
        validate_tick_range(lower, upper, self.config.strict_tick_range)?;
        let tracked = self.tracker.read().get_range_order_by_key(order.id).cloned();
        let (increase, size) = match (tracked.map(|t| t.size), &order.size) {
            (Some(RangeOrderSize::Liquidity(current)), RangeOrderSize::Liquidity(target)) => {
                match AmountChange::between(current, *target) {
                    AmountChange::Increase(delta) => (true, WireRangeSize::Liquidity(delta)),
                    AmountChange::Decrease(delta) => (false, WireRangeSize::Liquidity(delta)),
                }
            }
            _ => (true, Self::wire_size(&order)?),
        };
        let params = UpdateRangeOrderParams {
            base: order.base,
            quote: order.quote,
            id: order.id,
            tick_range: Some((lower, upper)),
            increase,
            size,
        };
        let response = self.client.update_range_order(&params).await?;
        if let Some(message) = self.rejection("update_range_order", &response) {
            return Ok(OrderOutcome::Rejected(message));
        }

        order.timestamp = Some(Utc::now());
        order.lp_account = Some(self.client.account().to_string());
        let id = order.id;
        self.tracker.write().add_range_order(order);
        info!("[OMS] updated range order: id={id}");
        Ok(OrderOutcome::Accepted)
    }

    async fn cancel_range(&self, mut order: RangeOrder, operation: &str) -> Result<OrderOutcome> {
        info!("[OMS] {operation} - {}", order.id);
        order.size = RangeOrderSize::Liquidity(0);
        let params = SetRangeOrderParams {
            base: order.base,
            quote: order.quote,
            id: order.id,
            tick_range: order.ticks()?,
            size: WireRangeSize::Liquidity(0),
        };
        let response = self.client.set_range_order(&params).await?;
        if let Some(message) = self.rejection(operation, &response) {
            return Ok(OrderOutcome::Rejected(message));
        }

        if let Err(e) = self.tracker.write().remove_range_order_by_key(order.id) {
            debug!(error = %e, "[OMS] {operation}: order was not tracked");
        }
        info!("[OMS] deleted range order: id={}", order.id);
        Ok(OrderOutcome::Accepted)
    }
}

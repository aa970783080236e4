//! Websocket subscriptions to venue push streams.
//!
//! Every stream runs the same state machine:
//! `Disconnected -> Connecting -> Subscribed -> Closed`. After the subscribe
//! request the first reply (the subscription id) is discarded, then each
//! `{"params":{"result":..}}` frame is handed to a [`StreamHandler`].
//! Transport errors, remote close and cancellation all end in `Closed`;
//! restarting is left to the caller.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::asset::Asset;
use crate::dex::request::{JsonRpcEnvelope, RequestBuilder, RpcRequest};
use crate::errors::{AppError, Result};
use crate::models::{BlockProgress, OrderFill, PrewitnessedSwap, VenueVersion};

pub mod fills;
pub mod pool_price;
pub mod prewitness;

pub use fills::OrderFillsHandler;
pub use pool_price::PoolPriceHandler;
pub use prewitness::PrewitnessHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Disconnected,
    Connecting,
    Subscribed,
    Closed,
}

/// Typed projection of a push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    PoolPrice {
        base: Asset,
        quote: Asset,
        price: f64,
    },
    PrewitnessedSwap(PrewitnessedSwap),
    OrderFills {
        progress: BlockProgress,
        fills: Vec<OrderFill>,
    },
}

/// Per-stream behaviour plugged into a [`Subscription`].
pub trait StreamHandler: Send + 'static {
    /// Short name used in logs, e.g. `pool price ETH-USDC`.
    fn label(&self) -> String;

    fn request(&self, builder: &RequestBuilder) -> RpcRequest;

    fn on_subscribed(&mut self) {}

    /// Project one push `result` into local state. An `Err` drops the frame
    /// but keeps the stream alive.
    fn handle(&mut self, result: Value) -> Result<Vec<StreamEvent>>;

    fn on_closed(&mut self) {}
}

#[derive(Debug, Deserialize)]
struct PushFrame {
    params: PushParams,
}

#[derive(Debug, Deserialize)]
struct PushParams {
    result: Value,
}

pub struct Subscription<H> {
    url: String,
    handler: H,
    builder: RequestBuilder,
    state: watch::Sender<StreamState>,
    events: Option<mpsc::UnboundedSender<StreamEvent>>,
    span: Span,
}

/// A running subscription.
pub struct SubscriptionHandle<H> {
    pub state: watch::Receiver<StreamState>,
    pub task: JoinHandle<H>,
}

impl<H: StreamHandler> Subscription<H> {
    pub fn new(url: impl Into<String>, handler: H, version: VenueVersion) -> Self {
        let span = info_span!("stream", name = %handler.label());
        let (state, _) = watch::channel(StreamState::Disconnected);
        Self {
            url: url.into(),
            handler,
            builder: RequestBuilder::new(version),
            state,
            events: None,
            span,
        }
    }

    /// Forward every projected event to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    pub fn spawn(self, cancel: CancellationToken) -> SubscriptionHandle<H> {
        let state = self.state();
        let task = tokio::spawn(self.run(cancel));
        SubscriptionHandle { state, task }
    }

    /// Drive the subscription until it closes; returns the handler so callers
    /// can inspect its final state.
    pub async fn run(mut self, cancel: CancellationToken) -> H {
        let span = self.span.clone();
        async move {
            self.state.send_replace(StreamState::Connecting);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(AppError::Cancelled),
                res = self.session() => res,
            };
            match outcome {
                Err(AppError::Cancelled) => info!("[STREAM] {} cancelled", self.handler.label()),
                Err(e) => error!(error = %e, "[STREAM] {} closed", self.handler.label()),
                Ok(()) => info!("[STREAM] {} ended", self.handler.label()),
            }
            self.handler.on_closed();
            self.state.send_replace(StreamState::Closed);
            self.handler
        }
        .instrument(span)
        .await
    }

    async fn session(&mut self) -> Result<()> {
        let (mut ws, _resp) = connect_async(self.url.as_str()).await?;

        let request = self.handler.request(&self.builder);
        let text = serde_json::to_string(&JsonRpcEnvelope::new(1, &request))?;
        ws.send(Message::Text(text)).await?;

        // subscription id; control frames do not count
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(_)) => break,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(AppError::StreamClosed(
                        "closed before acknowledgement".to_string(),
                    ));
                }
            }
        }

        self.handler.on_subscribed();
        self.state.send_replace(StreamState::Subscribed);
        info!("[STREAM] subscribed to {}", self.handler.label());

        while let Some(msg) = ws.next().await {
            match msg? {
                Message::Text(text) => self.dispatch(&text),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("{}: {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".to_string());
                    return Err(AppError::StreamClosed(reason));
                }
                _ => {}
            }
        }
        Err(AppError::StreamClosed("connection dropped".to_string()))
    }

    fn dispatch(&mut self, text: &str) {
        let frame: PushFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "[STREAM] push frame parse failed");
                return;
            }
        };
        match self.handler.handle(frame.params.result) {
            Ok(events) => {
                if let Some(tx) = &self.events {
                    for event in events {
                        let _ = tx.send(event);
                    }
                }
            }
            Err(e) => warn!(error = %e, "[STREAM] push frame dropped"),
        }
    }
}

//! Swaps the venue has seen in a source-chain mempool, held until the venue
//! would be expected to finalise them.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Span, info, info_span};

use crate::asset::{Asset, VENUE_BLOCK_TIME};
use crate::models::{NetworkStatus, PrewitnessedSwap, VenueVersion};
use crate::stream::{PrewitnessHandler, StreamEvent, Subscription};

pub const PREWITNESS_CAPACITY: usize = 200;

/// Bounded FIFO of prewitnessed swaps; the oldest entry is dropped on overflow.
#[derive(Debug, Clone)]
pub struct PrewitnessQueue {
    swaps: VecDeque<PrewitnessedSwap>,
    capacity: usize,
}

impl Default for PrewitnessQueue {
    fn default() -> Self {
        Self::with_capacity(PREWITNESS_CAPACITY)
    }
}

impl PrewitnessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            swaps: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, swap: PrewitnessedSwap) {
        if self.swaps.len() == self.capacity {
            self.swaps.pop_front();
        }
        self.swaps.push_back(swap);
    }

    /// Swaps due before the next venue block.
    pub fn drain_ready(&mut self) -> Vec<PrewitnessedSwap> {
        self.drain_ready_until(next_block())
    }

    /// How many swaps [`Self::drain_ready_until`] would return, without
    /// removing them.
    pub fn ready_count_until(&self, horizon: DateTime<Utc>) -> usize {
        self.swaps.iter().take_while(|s| s.expiry <= horizon).count()
    }

    /// Pop from the front every swap expiring at or before `horizon`,
    /// stopping at the first one that does not.
    pub fn drain_ready_until(&mut self, horizon: DateTime<Utc>) -> Vec<PrewitnessedSwap> {
        let mut ready = Vec::new();
        while self.swaps.front().is_some_and(|s| s.expiry <= horizon) {
            if let Some(swap) = self.swaps.pop_front() {
                ready.push(swap);
            }
        }
        ready
    }

    pub fn evict_expired(&mut self) -> usize {
        self.evict_expired_at(Utc::now())
    }

    /// Drop expired swaps from the back. Returns how many were dropped.
    pub fn evict_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.swaps.len();
        while self.swaps.back().is_some_and(|s| s.expiry <= now) {
            self.swaps.pop_back();
        }
        before - self.swaps.len()
    }

    pub fn len(&self) -> usize {
        self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrewitnessedSwap> {
        self.swaps.iter()
    }
}

fn next_block() -> DateTime<Utc> {
    let block =
        chrono::Duration::from_std(VENUE_BLOCK_TIME).unwrap_or_else(|_| chrono::Duration::zero());
    Utc::now() + block
}

pub type SharedPrewitnessQueue = Arc<Mutex<PrewitnessQueue>>;

/// Queue and connection status for one pair's prewitness stream.
#[derive(Debug, Clone)]
pub struct PrewitnessStream {
    pub base: Asset,
    pub quote: Asset,
    pub queue: SharedPrewitnessQueue,
    status: Arc<watch::Sender<NetworkStatus>>,
}

impl PrewitnessStream {
    pub fn new(base: Asset, quote: Asset) -> Self {
        let (status, _) = watch::channel(NetworkStatus::NotConnected);
        Self {
            base,
            quote,
            queue: Arc::new(Mutex::new(PrewitnessQueue::new())),
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn set_status(&self, status: NetworkStatus) {
        self.status.send_replace(status);
    }

    pub fn watch_status(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }
}

/// Prewitness streams keyed by (base, quote).
pub struct Prewitnesser {
    streams: BTreeMap<(Asset, Asset), PrewitnessStream>,
    version: VenueVersion,
    span: Span,
}

impl Prewitnesser {
    pub fn new(version: VenueVersion) -> Self {
        Self {
            streams: BTreeMap::new(),
            version,
            span: info_span!("prewitness"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn add_stream(&mut self, base: Asset, quote: Asset) -> PrewitnessStream {
        let stream = self
            .streams
            .entry((base, quote))
            .or_insert_with(|| PrewitnessStream::new(base, quote))
            .clone();
        self.span.in_scope(|| info!(%base, %quote, "[PREWITNESS] added stream"));
        stream
    }

    pub fn stream(&self, base: Asset, quote: Asset) -> Option<&PrewitnessStream> {
        self.streams.get(&(base, quote))
    }

    /// Subscribe every registered pair.
    pub fn start(
        &self,
        url: &str,
        cancel: &CancellationToken,
        events: Option<mpsc::UnboundedSender<StreamEvent>>,
    ) -> Vec<JoinHandle<PrewitnessHandler>> {
        self.streams
            .values()
            .map(|stream| {
                let pair = format!("{}-{}", stream.base, stream.quote);
                let span = info_span!(parent: &self.span, "stream", %pair);
                let handler = PrewitnessHandler::new(stream.clone());
                let mut sub = Subscription::new(url, handler, self.version).with_span(span);
                if let Some(tx) = events.clone() {
                    sub = sub.with_events(tx);
                }
                sub.spawn(cancel.child_token()).task
            })
            .collect()
    }

    /// Swaps due within the next venue block for a pair. Empty for unknown pairs.
    pub fn get_swaps(&self, base: Asset, quote: Asset) -> Vec<PrewitnessedSwap> {
        self.streams
            .get(&(base, quote))
            .map(|s| s.queue.lock().drain_ready())
            .unwrap_or_default()
    }

    /// Swaps [`Self::get_swaps`] would return right now, left in the queue.
    pub fn ready_count(&self, base: Asset, quote: Asset) -> usize {
        self.streams
            .get(&(base, quote))
            .map(|s| s.queue.lock().ready_count_until(next_block()))
            .unwrap_or(0)
    }

    /// Evict expired swaps on every pair.
    pub fn evict_expired(&self) -> usize {
        self.streams
            .values()
            .map(|s| s.queue.lock().evict_expired())
            .sum()
    }

    pub fn connection_status(&self, base: Asset, quote: Asset) -> Option<NetworkStatus> {
        self.streams.get(&(base, quote)).map(PrewitnessStream::status)
    }
}

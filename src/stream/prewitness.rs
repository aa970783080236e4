use chrono::Utc;
use serde_json::Value;
use tracing::info;

use super::{StreamEvent, StreamHandler};
use crate::dex::calc::decode_amount_json;
use crate::dex::request::{RequestBuilder, RpcRequest};
use crate::errors::{AppError, Result};
use crate::models::{NetworkStatus, PrewitnessedSwap};
use crate::prewitness::PrewitnessStream;

/// Feeds `cf_subscribe_prewitness_swaps` sightings into a pair's queue.
///
/// Each frame carries one or more smallest-unit amounts of the base asset.
/// The expiry is the time the venue needs to finalise a deposit on the base
/// asset's chain.
pub struct PrewitnessHandler {
    stream: PrewitnessStream,
}

impl PrewitnessHandler {
    pub fn new(stream: PrewitnessStream) -> Self {
        Self { stream }
    }
}

impl StreamHandler for PrewitnessHandler {
    fn label(&self) -> String {
        format!("prewitness swaps {}-{}", self.stream.base, self.stream.quote)
    }

    fn request(&self, builder: &RequestBuilder) -> RpcRequest {
        builder.subscribe_prewitness_swaps(self.stream.base, self.stream.quote)
    }

    fn on_subscribed(&mut self) {
        self.stream.set_status(NetworkStatus::Connected);
    }

    fn handle(&mut self, result: Value) -> Result<Vec<StreamEvent>> {
        let (base, quote) = (self.stream.base, self.stream.quote);
        let amounts = match &result {
            Value::Array(items) => items
                .iter()
                .map(|v| decode_amount_json(v, base))
                .collect::<Result<Vec<_>>>()?,
            other => vec![decode_amount_json(other, base)?],
        };

        let delay = chrono::Duration::from_std(base.witness_delay())
            .map_err(|e| AppError::Other(e.to_string()))?;
        let expiry = Utc::now() + delay;

        let mut queue = self.stream.queue.lock();
        let events = amounts
            .into_iter()
            .map(|amount| {
                let swap = PrewitnessedSwap {
                    base,
                    quote,
                    amount,
                    expiry,
                };
                info!("[PREWITNESS] witnessed swap {amount} {base} for {quote}");
                queue.push(swap.clone());
                StreamEvent::PrewitnessedSwap(swap)
            })
            .collect();
        Ok(events)
    }

    fn on_closed(&mut self) {
        self.stream.set_status(NetworkStatus::NotConnected);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::asset::Asset;

    #[test]
    fn amounts_are_queued_with_chain_delay() {
        let stream = PrewitnessStream::new(Asset::Btc, Asset::Usdc);
        let mut handler = PrewitnessHandler::new(stream.clone());
        let before = Utc::now();
        let events = handler.handle(json!([150_000_000u64])).unwrap();
        assert_eq!(events.len(), 1);

        let queue = stream.queue.lock();
        let swap = queue.iter().next().unwrap();
        assert_eq!(swap.amount, 1.5);
        // three bitcoin blocks
        assert!(swap.expiry >= before + Duration::seconds(1800));
        assert!(swap.expiry <= Utc::now() + Duration::seconds(1800));
    }

    #[test]
    fn hex_scalar_amount_is_accepted() {
        let stream = PrewitnessStream::new(Asset::Eth, Asset::Usdc);
        let mut handler = PrewitnessHandler::new(stream.clone());
        handler.handle(json!("0xde0b6b3a7640000")).unwrap();
        assert_eq!(stream.queue.lock().iter().next().map(|s| s.amount), Some(1.0));
    }

    #[test]
    fn malformed_amount_leaves_queue_untouched() {
        let stream = PrewitnessStream::new(Asset::Eth, Asset::Usdc);
        let mut handler = PrewitnessHandler::new(stream.clone());
        assert!(handler.handle(json!([{ "amount": 1 }])).is_err());
        assert!(stream.queue.lock().is_empty());
    }
}

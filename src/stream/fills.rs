use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::info;

use super::{StreamEvent, StreamHandler};
use crate::dex::calc::decode_u128_json;
use crate::dex::request::{RequestBuilder, RpcRequest};
use crate::errors::{AppError, Result};
use crate::models::{BlockProgress, OrderFill, OrderKind};

/// Follows `lp_subscribe_order_fills`, keeping fills for one LP account and
/// the venue's block progress.
pub struct OrderFillsHandler {
    account: String,
    progress: Arc<watch::Sender<BlockProgress>>,
    fills: Vec<OrderFill>,
}

impl OrderFillsHandler {
    pub fn new(account: impl Into<String>) -> Self {
        let (progress, _) = watch::channel(BlockProgress::default());
        Self {
            account: account.into(),
            progress: Arc::new(progress),
            fills: Vec::new(),
        }
    }

    pub fn progress(&self) -> watch::Receiver<BlockProgress> {
        self.progress.subscribe()
    }

    /// Fills for the account from the most recent block.
    pub fn last_fills(&self) -> &[OrderFill] {
        &self.fills
    }

    fn own_fill(&self, entry: &Value) -> Option<OrderFill> {
        let (kind, detail) = if let Some(d) = entry.get("limit_order") {
            (OrderKind::Limit, d)
        } else if let Some(d) = entry.get("range_order") {
            (OrderKind::Range, d)
        } else {
            return None;
        };
        let lp = detail.get("lp").and_then(Value::as_str)?;
        if lp != self.account {
            return None;
        }
        let id = detail
            .get("id")
            .and_then(|v| decode_u128_json(v).ok())
            .and_then(|id| u64::try_from(id).ok());
        Some(OrderFill {
            kind,
            lp: lp.to_string(),
            id,
            detail: detail.clone(),
        })
    }
}

impl StreamHandler for OrderFillsHandler {
    fn label(&self) -> String {
        "order fills".to_string()
    }

    fn request(&self, builder: &RequestBuilder) -> RpcRequest {
        builder.subscribe_order_fills()
    }

    fn handle(&mut self, result: Value) -> Result<Vec<StreamEvent>> {
        let block = result
            .get("block_number")
            .ok_or_else(|| AppError::Other("order fills frame without block_number".to_string()))
            .and_then(decode_u128_json)?;
        let confirmed = u64::try_from(block)
            .map_err(|_| AppError::Other(format!("block number {block} out of range")))?;
        let progress = BlockProgress::from_confirmed(confirmed);
        self.progress.send_replace(progress);

        self.fills = result
            .get("fills")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(|e| self.own_fill(e)).collect())
            .unwrap_or_default();

        info!(
            confirmed = progress.confirmed,
            latest = progress.latest,
            "[STREAM] confirmed venue block"
        );
        info!("[STREAM] number of fills in last block: {}", self.fills.len());

        Ok(vec![StreamEvent::OrderFills {
            progress,
            fills: self.fills.clone(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keeps_only_own_fills() {
        let mut handler = OrderFillsHandler::new("cFme");
        let events = handler
            .handle(json!({
                "block_number": 120,
                "fills": [
                    { "limit_order": { "lp": "cFme", "id": "0x7", "side": "buy" } },
                    { "limit_order": { "lp": "cFother", "id": 8 } },
                    { "range_order": { "lp": "cFme", "id": 3 } },
                    { "unknown": {} }
                ]
            }))
            .unwrap();

        let fills = handler.last_fills();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].kind, OrderKind::Limit);
        assert_eq!(fills[0].id, Some(7));
        assert_eq!(fills[1].kind, OrderKind::Range);
        assert!(matches!(
            &events[0],
            StreamEvent::OrderFills { progress, .. } if progress.latest == 122
        ));
        assert_eq!(handler.progress().borrow().confirmed, 120);
    }

    #[test]
    fn frame_without_block_is_rejected() {
        let mut handler = OrderFillsHandler::new("cFme");
        assert!(handler.handle(json!({ "fills": [] })).is_err());
        assert_eq!(*handler.progress().borrow(), BlockProgress::default());
    }
}

//! Streaming ingestors against a local WebSocket venue.

use std::time::Duration;

use chainflip_lp::asset::Asset;
use chainflip_lp::dex::{Pool, PoolHandle};
use chainflip_lp::models::{NetworkStatus, OrderKind, VenueVersion};
use chainflip_lp::prewitness::Prewitnesser;
use chainflip_lp::stream::{
    OrderFillsHandler, PoolPriceHandler, StreamEvent, StreamState, Subscription,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

/// BTC-USDC price of 10000: integer part 0x64 above 128 fractional bits.
const BTC_10K: &str = "0x6400000000000000000000000000000000";

enum AfterFrames {
    Close,
    HoldOpen,
}

/// Accept one client, record its subscription request, then send `frames`
/// verbatim. The first frame plays the part of the subscription ack.
async fn venue(frames: Vec<Message>, after: AfterFrames) -> (String, JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let task = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let request = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).unwrap(),
            other => panic!("expected a subscription request, got {other:?}"),
        };
        for frame in frames {
            ws.send(frame).await.unwrap();
        }
        match after {
            AfterFrames::Close => {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: "maintenance".into(),
                    }))
                    .await;
            }
            AfterFrames::HoldOpen => while let Some(Ok(_)) = ws.next().await {},
        }
        request
    });
    (url, task)
}

fn ack() -> Message {
    Message::Text(json!({ "jsonrpc": "2.0", "id": 1, "result": "0x7375622d31" }).to_string())
}

fn push(result: Value) -> Message {
    Message::Text(
        json!({
            "jsonrpc": "2.0",
            "method": "subscription",
            "params": { "subscription": "0x7375622d31", "result": result }
        })
        .to_string(),
    )
}

fn btc_pool() -> PoolHandle {
    PoolHandle::new(Pool::new(Asset::Btc, Asset::Usdc))
}

#[tokio::test]
async fn price_stream_applies_frames_until_remote_close() {
    let frames = vec![
        ack(),
        Message::Text("not json".to_string()),
        push(json!({ "sqrt_price": "0x1" })),
        push(json!({ "price": BTC_10K })),
    ];
    let (url, server) = venue(frames, AfterFrames::Close).await;
    let pool = btc_pool();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = Subscription::new(url, PoolPriceHandler::new(pool.clone()), VenueVersion::Mainnet)
        .with_events(tx)
        .spawn(CancellationToken::new());
    let state = handle.state.clone();
    handle.task.await.unwrap();

    assert_eq!(pool.price(), Some(10000.0));
    assert_eq!(pool.status(), NetworkStatus::NotConnected);
    assert_eq!(*state.borrow(), StreamState::Closed);
    assert_eq!(
        rx.try_recv().unwrap(),
        StreamEvent::PoolPrice {
            base: Asset::Btc,
            quote: Asset::Usdc,
            price: 10000.0
        }
    );
    assert!(rx.try_recv().is_err());

    let request = server.await.unwrap();
    assert_eq!(request["jsonrpc"], json!("2.0"));
    assert_eq!(request["id"], json!(1));
    assert_eq!(request["method"], json!("cf_subscribe_pool_price"));
    assert_eq!(request["params"], json!({ "base_asset": "BTC", "quote_asset": "USDC" }));
}

#[tokio::test]
async fn first_frame_is_taken_as_acknowledgement() {
    let (url, _server) = venue(vec![push(json!({ "price": BTC_10K }))], AfterFrames::Close).await;
    let pool = btc_pool();
    Subscription::new(url, PoolPriceHandler::new(pool.clone()), VenueVersion::Mainnet)
        .spawn(CancellationToken::new())
        .task
        .await
        .unwrap();
    assert_eq!(pool.price(), None);
}

#[tokio::test]
async fn ping_before_acknowledgement_is_not_the_acknowledgement() {
    let frames = vec![
        Message::Ping(b"keepalive".to_vec()),
        push(json!({ "price": BTC_10K })),
    ];
    let (url, _server) = venue(frames, AfterFrames::Close).await;
    let pool = btc_pool();
    Subscription::new(url, PoolPriceHandler::new(pool.clone()), VenueVersion::Mainnet)
        .spawn(CancellationToken::new())
        .task
        .await
        .unwrap();
    assert_eq!(pool.price(), None);
}

#[tokio::test]
async fn ping_then_acknowledgement_then_price() {
    let frames = vec![
        Message::Ping(b"keepalive".to_vec()),
        ack(),
        push(json!({ "price": BTC_10K })),
    ];
    let (url, _server) = venue(frames, AfterFrames::Close).await;
    let pool = btc_pool();
    Subscription::new(url, PoolPriceHandler::new(pool.clone()), VenueVersion::Mainnet)
        .spawn(CancellationToken::new())
        .task
        .await
        .unwrap();
    assert_eq!(pool.price(), Some(10000.0));
}

#[tokio::test]
async fn cancellation_closes_a_live_subscription() {
    let (url, server) = venue(vec![ack(), push(json!({ "price": BTC_10K }))], AfterFrames::HoldOpen).await;
    let pool = btc_pool();
    let cancel = CancellationToken::new();
    let handle = Subscription::new(url, PoolPriceHandler::new(pool.clone()), VenueVersion::Mainnet)
        .spawn(cancel.clone());

    let mut state = handle.state.clone();
    state.wait_for(|s| *s == StreamState::Subscribed).await.unwrap();
    let mut updates = pool.subscribe();
    tokio::time::timeout(Duration::from_secs(5), updates.wait_for(|p| p.price.is_some()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pool.status(), NetworkStatus::Connected);

    cancel.cancel();
    handle.task.await.unwrap();
    assert_eq!(*state.borrow(), StreamState::Closed);
    assert_eq!(pool.status(), NetworkStatus::NotConnected);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn refused_connection_ends_closed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let pool = btc_pool();
    let handle = Subscription::new(url, PoolPriceHandler::new(pool.clone()), VenueVersion::Mainnet)
        .spawn(CancellationToken::new());
    let state = handle.state.clone();
    handle.task.await.unwrap();
    assert_eq!(*state.borrow(), StreamState::Closed);
    assert_eq!(pool.status(), NetworkStatus::NotConnected);
}

#[tokio::test]
async fn order_fills_track_block_progress_and_own_fills() {
    let frame = push(json!({
        "block_number": 100,
        "fills": [
            { "limit_order": { "lp": "cFme", "id": "0x5", "side": "buy", "bought": "0x10" } },
            { "range_order": { "lp": "cFother", "id": 1 } },
            { "range_order": { "lp": "cFme", "id": 9 } }
        ]
    }));
    let (url, server) = venue(vec![ack(), frame], AfterFrames::Close).await;
    let handler = OrderFillsHandler::new("cFme");
    let progress = handler.progress();

    let handler = Subscription::new(url, handler, VenueVersion::Mainnet)
        .spawn(CancellationToken::new())
        .task
        .await
        .unwrap();

    assert_eq!(progress.borrow().confirmed, 100);
    assert_eq!(progress.borrow().latest, 102);
    let fills = handler.last_fills();
    assert_eq!(fills.len(), 2);
    assert_eq!((fills[0].kind, fills[0].id), (OrderKind::Limit, Some(5)));
    assert_eq!((fills[1].kind, fills[1].id), (OrderKind::Range, Some(9)));

    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("lp_subscribe_order_fills"));
    assert_eq!(request["params"], json!([]));
}

#[tokio::test]
async fn prewitnessed_swaps_are_queued_per_pair() {
    let (url, server) = venue(
        vec![ack(), push(json!(["0x5f5e100", 50_000_000]))],
        AfterFrames::Close,
    )
    .await;
    let mut prewitnesser = Prewitnesser::new(VenueVersion::Perseverance);
    prewitnesser.add_stream(Asset::Btc, Asset::Usdc);

    let cancel = CancellationToken::new();
    for task in prewitnesser.start(&url, &cancel, None) {
        task.await.unwrap();
    }

    let stream = prewitnesser.stream(Asset::Btc, Asset::Usdc).unwrap();
    let amounts: Vec<f64> = stream.queue.lock().iter().map(|s| s.amount).collect();
    assert_eq!(amounts, vec![1.0, 0.5]);
    assert_eq!(
        prewitnesser.connection_status(Asset::Btc, Asset::Usdc),
        Some(NetworkStatus::NotConnected)
    );
    // a bitcoin deposit is far from final within one venue block
    assert!(prewitnesser.get_swaps(Asset::Btc, Asset::Usdc).is_empty());

    let request = server.await.unwrap();
    assert_eq!(request["method"], json!("cf_subscribe_prewitness_swaps"));
    assert_eq!(request["params"], json!(["Btc", "Usdc"]));
}

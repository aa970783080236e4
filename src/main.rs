use std::sync::Arc;

use anyhow::Result;
use chainflip_lp::{
    asset::Asset,
    book::{OrderBook, spawn_book_watcher},
    config::AppConfig,
    controller::OrderController,
    dex::{DexClient, HttpRpcClient, PoolRegistry},
    models::BlockProgress,
    prewitness::Prewitnesser,
    stream::{OrderFillsHandler, StreamEvent, Subscription},
    tracker::OrderTracker,
    utils,
};
use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Books = Vec<((Asset, Asset), watch::Receiver<OrderBook>)>;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    utils::init_logging();
    info!(
        account = %config.lp_account,
        version = ?config.venue_version,
        pairs = config.base_assets.len(),
        "[INIT] chainflip-lp starting"
    );

    let rpc = Arc::new(HttpRpcClient::new(&config.node_rpc_url, &config.lp_api_url)?);
    let client = DexClient::new(
        rpc,
        config.venue_version,
        config.lp_account.clone(),
        config.rpc_timeout,
    );
    let cancel = CancellationToken::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<StreamEvent>();

    // Pools and prewitness queues ------------------------------------------
    let registry = PoolRegistry::new(client.clone());
    let mut prewitnesser = Prewitnesser::new(config.venue_version);
    for (base, quote) in config.pairs() {
        registry.add_pool(base, quote);
        prewitnesser.add_stream(base, quote);
    }
    registry.update_pool_fees().await;
    registry.update_all_pools().await;
    let refresher = registry.spawn_refresher(config.book_refresh, cancel.child_token());

    // Streams --------------------------------------------------------------
    let price_streams =
        registry.start_price_streams(&config.node_ws_url, &cancel, Some(events_tx.clone()));
    let prewitness_streams =
        prewitnesser.start(&config.node_ws_url, &cancel, Some(events_tx.clone()));
    let fills_handler = OrderFillsHandler::new(config.lp_account.clone());
    let progress = fills_handler.progress();
    let fills_stream = Subscription::new(&config.lp_ws_url, fills_handler, config.venue_version)
        .with_events(events_tx)
        .spawn(cancel.child_token());
    info!(
        price = price_streams.len(),
        prewitness = prewitness_streams.len(),
        "[INIT] streams started"
    );

    let events = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                StreamEvent::PoolPrice { base, quote, price } => {
                    debug!(%base, %quote, price, "[STREAM] pool price")
                }
                StreamEvent::PrewitnessedSwap(swap) => info!("[PREWITNESS] {swap}"),
                StreamEvent::OrderFills { progress, fills } if !fills.is_empty() => {
                    info!(block = progress.confirmed, fills = fills.len(), "[STREAM] own orders filled")
                }
                StreamEvent::OrderFills { .. } => {}
            }
        }
    });

    // Order book mirrors and controller -------------------------------------
    let controller = OrderController::new(
        client.clone(),
        OrderTracker::shared(),
        config.controller_config(),
    );
    if let Err(e) = controller.get_asset_balances().await {
        warn!(error = %e, "[INIT] failed to fetch balances");
    }

    let mut books: Books = Vec::new();
    let mut watchers = Vec::new();
    for (base, quote) in config.pairs() {
        let book = OrderBook::new(base, quote, config.lp_account.clone());
        let (rx, handle) =
            spawn_book_watcher(book, client.clone(), config.book_refresh, cancel.child_token())
                .await?;

        let stale = rx.borrow().open_lp_orders().to_vec();
        if !stale.is_empty() {
            let report = controller.check_order_book_and_cancel(&stale).join().await;
            info!(
                pair = %format!("{base}-{quote}"),
                cancelled = report.accepted,
                failed = report.failed + report.rejected,
                "[INIT] cancelled orders left from a previous run"
            );
        }
        books.push(((base, quote), rx));
        watchers.push(handle);
    }

    // Refresh loop ---------------------------------------------------------
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("[SHUTDOWN] ctrl-c received"),
        _ = utils::every(config.book_refresh, cancel.child_token(), || async {
            heartbeat(&controller, &registry, &prewitnesser, &books, &progress).await
        }) => {}
    }

    cancel.cancel();
    let _ = refresher.await;
    join_all(watchers).await;
    join_all(price_streams).await;
    join_all(prewitness_streams).await;
    let _ = fills_stream.task.await;
    let _ = events.await;
    info!("[SHUTDOWN] all tasks stopped");
    Ok(())
}

async fn heartbeat(
    controller: &OrderController,
    registry: &PoolRegistry,
    prewitnesser: &Prewitnesser,
    books: &Books,
    progress: &watch::Receiver<BlockProgress>,
) {
    match controller.get_asset_balances().await {
        Ok(balances) => info!(?balances, "[HEARTBEAT] balances"),
        Err(e) => warn!(error = %e, "[HEARTBEAT] failed to refresh balances"),
    }

    let evicted = prewitnesser.evict_expired();
    for ((base, quote), rx) in books {
        let (bid, ask) = {
            let book = rx.borrow();
            (
                book.top_bid().map(|o| o.price),
                book.top_ask().map(|o| o.price),
            )
        };
        let pool_price = registry.pool(*base, *quote).and_then(|p| p.price());
        let due = prewitnesser.ready_count(*base, *quote);
        info!(
            pair = %format!("{base}-{quote}"),
            ?bid,
            ?ask,
            ?pool_price,
            prewitnessed_due = due,
            "[HEARTBEAT] top of book"
        );
    }

    let progress = *progress.borrow();
    info!(
        confirmed = progress.confirmed,
        latest = progress.latest,
        open_limit = controller.open_limit_orders().len(),
        open_range = controller.open_range_orders().len(),
        evicted,
        "[HEARTBEAT] status"
    );
}

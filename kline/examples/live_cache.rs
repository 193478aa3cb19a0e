use std::sync::Arc;

use kline::{BackfillDirection, Interval, KlineFeed, KlineService, RateLimitConfig};
use kline_mock::{MemoryStore, MockFeed, MockProvider};
use tracing_subscriber::fmt::format::FmtSpan;

const MINUTE: u64 = 60_000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Suggested: RUST_LOG=info,kline=debug (build with --features tracing)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();

    // One day of synthetic history, clock half-way through a minute.
    let listing = 28_000_000 * MINUTE;
    let now = listing + 1_440 * MINUTE + 30_000;
    let provider = Arc::new(MockProvider::new(listing, now).with_page_size(500));
    let store = Arc::new(MemoryStore::new());

    let svc = KlineService::builder()
        .with_provider(provider.clone())
        .with_store(store.clone())
        .track_symbol("BTCUSDT")
        .rate_limit(RateLimitConfig {
            requests_per_second: 50.0,
            burst: 5,
        })
        .build()?;

    let report = svc
        .backfill("BTCUSDT", Interval::ONE_MINUTE, BackfillDirection::Latest, 2_000)
        .await?;
    println!("backfill: {report:?}");

    let hourly = svc.get_last_klines("BTCUSDT", "1h".parse()?, 6).await?;
    for k in &hourly {
        println!(
            "{:?} open={} close={} closed={}",
            k.open_datetime(),
            k.open,
            k.close,
            k.closed
        );
    }

    let (feed, ticks) = MockFeed::new();
    let handle = svc.attach_feed(Arc::new(feed) as Arc<dyn KlineFeed>).await?;
    if let Some(bar) = provider.bar("BTCUSDT", Interval::ONE_MINUTE, now - 30_000) {
        ticks.push(Interval::ONE_MINUTE, bar).await;
    }
    tokio::task::yield_now().await;

    if let Some(bars) = svc.get_latest_klines("BTCUSDT", "15m".parse()?).await? {
        println!("live 15m bars: {}, newest open={:?}", bars.len(), bars.last().map(|k| k.open_time));
    }
    handle.stop().await;
    Ok(())
}

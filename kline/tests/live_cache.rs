mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use kline::{
    FeedEvent, Interval, KLine, KlineError, KlineFeed, KlineProvider, KlineService, SymbolCache,
    check_chain,
};
use futures::future::join_all;
use kline_mock::{MockFeed, MockProvider};
use rust_decimal::Decimal;

fn cache(provider: &Arc<MockProvider>, archive_length: usize) -> Arc<SymbolCache> {
    let provider: Arc<dyn KlineProvider> = provider.clone();
    Arc::new(SymbolCache::new(
        SYMBOL,
        Interval::ONE_MINUTE,
        archive_length,
        provider,
        fast_backoff(),
    ))
}

fn tracking(provider: &Arc<MockProvider>, archive_length: usize) -> KlineService {
    KlineService::builder()
        .with_provider(provider.clone())
        .track_symbol(SYMBOL)
        .live_config(live_config(archive_length))
        .backoff(fast_backoff())
        .build()
        .unwrap()
}

fn tick(provider: &MockProvider, open_time: u64) -> KLine {
    provider.bar(SYMBOL, Interval::ONE_MINUTE, open_time).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_reads_share_one_load() {
    let provider = Arc::new(
        MockProvider::new(LISTING, NOW).with_delay(Duration::from_millis(50)),
    );
    let cache = cache(&provider, 50);

    let readers = (0..8).map(|_| {
        let c = Arc::clone(&cache);
        tokio::spawn(async move { c.get_data().await })
    });
    let results: Vec<_> = join_all(readers)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(provider.recent_calls(), 1);
    assert_eq!(provider.range_calls(), 0);
    for r in &results {
        assert_eq!(r, &results[0]);
    }
    let data = &results[0];
    assert_eq!(data.len(), 51);
    assert!(check_chain(data));
}

#[tokio::test]
async fn loaded_history_splices_onto_the_live_bar() {
    let provider = provider();
    let cache = cache(&provider, 150);
    cache.set_active_kline(tick(&provider, LIVE_OPEN));

    let data = cache.get_data().await.unwrap();
    assert_eq!(data.len(), 151);
    let (live, archive) = data.split_last().unwrap();
    let newest = archive.last().unwrap();
    assert_eq!(newest.close_time + 1, live.open_time);
    assert!(live.follows(newest));
    assert!(!live.closed);
    assert!(archive.iter().all(|k| k.closed));
    assert!(check_chain(&data));
    // The archive needed one extra backward page beyond the first 100 bars.
    assert_eq!(provider.range_calls(), 1);
}

#[tokio::test]
async fn refinement_only_touches_the_active_bar() {
    let provider = provider();
    let cache = cache(&provider, 5);
    cache.get_data().await.unwrap();
    assert_eq!(cache.archived_len(), 5);

    let mut refined = tick(&provider, LIVE_OPEN);
    refined.close = Decimal::new(4242, 2);
    refined.prev_close_time = 0;
    cache.set_active_kline(refined.clone());

    assert_eq!(cache.archived_len(), 5);
    let active = cache.active().unwrap();
    assert_eq!(active.close, refined.close);
    assert_eq!(active.prev_close_time, LIVE_OPEN - 1);
}

#[tokio::test]
async fn rollover_archives_the_closed_bar() {
    let provider = provider();
    let cache = cache(&provider, 5);
    let before = cache.get_data().await.unwrap();

    let mut fin = tick(&provider, LIVE_OPEN);
    fin.closed = true;
    cache.set_active_kline(fin.clone());
    provider.set_now(NOW + MINUTE);
    cache.set_active_kline(tick(&provider, LIVE_OPEN + MINUTE));

    assert!(cache.is_filled());
    assert_eq!(cache.archived_len(), 5);
    let data = cache.get_data().await.unwrap();
    assert_eq!(provider.recent_calls(), 1);
    assert_eq!(data.len(), 6);
    assert_eq!(data[0], before[1]);
    assert_eq!(data[4].open_time, LIVE_OPEN);
    assert!(data[4].closed);
    assert_eq!(data[5].prev_close_time, fin.close_time);
    assert!(check_chain(&data));
}

#[tokio::test]
async fn skipped_bar_invalidates_the_archive() {
    let provider = provider();
    let cache = cache(&provider, 5);
    cache.get_data().await.unwrap();

    provider.set_now(NOW + 2 * MINUTE);
    cache.set_active_kline(tick(&provider, LIVE_OPEN + 2 * MINUTE));

    assert!(!cache.is_filled());
    assert_eq!(cache.archived_len(), 0);
    let active = cache.active().unwrap();
    assert_eq!(active.open_time, LIVE_OPEN + 2 * MINUTE);
    assert_eq!(active.prev_close_time, 0);

    // The next read reloads and re-splices.
    let data = cache.get_data().await.unwrap();
    assert_eq!(provider.recent_calls(), 2);
    assert_eq!(data.len(), 6);
    assert_eq!(data[5].open_time, LIVE_OPEN + 2 * MINUTE);
    assert!(check_chain(&data));
}

#[tokio::test]
async fn stale_ticks_are_ignored() {
    let provider = provider();
    let cache = cache(&provider, 5);
    cache.get_data().await.unwrap();
    let active = cache.active().unwrap();

    cache.set_active_kline(tick(&provider, LIVE_OPEN - 3 * MINUTE));
    assert_eq!(cache.active().unwrap(), active);
    assert!(cache.is_filled());
}

#[tokio::test(start_paused = true)]
async fn load_that_never_splices_fails_after_the_budget() {
    let provider = provider();
    let cache = cache(&provider, 5);
    // The feed is a bar ahead of what the provider reports.
    cache.set_active_kline(KLine {
        open_time: LIVE_OPEN + MINUTE,
        close_time: LIVE_OPEN + 2 * MINUTE - 1,
        symbol: SYMBOL.into(),
        ..KLine::default()
    });

    let err = cache.get_data().await.unwrap_err();
    assert!(matches!(err, KlineError::LoadFailed { .. }), "{err:?}");
    assert_eq!(provider.recent_calls(), 3);
    assert!(!cache.is_filled());
}

#[tokio::test(start_paused = true)]
async fn provider_outage_fails_the_load() {
    let provider = provider();
    let svc = tracking(&provider, 5);
    provider.fail_next(100);

    let err = svc
        .get_latest_klines(SYMBOL, Interval::ONE_MINUTE)
        .await
        .unwrap_err();
    assert!(matches!(err, KlineError::LoadFailed { .. }), "{err:?}");

    // A later read starts a fresh load.
    provider.fail_next(0);
    let bars = svc
        .get_latest_klines(SYMBOL, Interval::ONE_MINUTE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bars.len(), 6);
}

#[tokio::test]
async fn latest_klines_resample_the_tracked_base() {
    let provider = provider();
    let svc = tracking(&provider, 60);

    let bars = svc
        .get_latest_klines(SYMBOL, minutes(5))
        .await
        .unwrap()
        .unwrap();
    assert_contiguous(&bars, 5 * MINUTE);
    assert_eq!(bars.len(), 13);
    assert!(!bars.last().unwrap().closed);

    assert_eq!(svc.get_latest_klines("ETHUSDT", minutes(5)).await.unwrap(), None);
    assert_eq!(
        svc.get_latest_klines(SYMBOL, Interval::ONE_MONTH).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn reads_prefer_the_live_cache() {
    let provider = provider();
    let svc = tracking(&provider, 200);

    let bars = svc
        .get_last_klines(SYMBOL, Interval::ONE_MINUTE, 20)
        .await
        .unwrap();
    assert_eq!(bars.len(), 20);
    assert_contiguous(&bars, MINUTE);
    assert_eq!(bars.last().unwrap().open_time, LIVE_OPEN);
    let calls = provider.recent_calls() + provider.range_calls();

    svc.get_last_klines(SYMBOL, Interval::ONE_MINUTE, 20)
        .await
        .unwrap();
    assert_eq!(provider.recent_calls() + provider.range_calls(), calls);
}

#[tokio::test]
async fn unknown_streams_are_dropped() {
    let provider = provider();
    let svc = tracking(&provider, 5);
    let live = svc.live_cache();

    let known = FeedEvent {
        symbol: SYMBOL.into(),
        interval: Interval::ONE_MINUTE,
        kline: tick(&provider, LIVE_OPEN),
    };
    let mut unknown = known.clone();
    unknown.symbol = "ETHUSDT".into();

    assert!(live.apply(known));
    assert!(!live.apply(unknown));
    assert_eq!(
        live.tracked(),
        vec![
            (SYMBOL.to_string(), Interval::ONE_MINUTE),
            (SYMBOL.to_string(), Interval::ONE_HOUR),
        ]
    );
}

#[tokio::test]
async fn feed_pump_applies_ticks_until_stopped() {
    let provider = provider();
    let svc = tracking(&provider, 5);
    let (feed, sender) = MockFeed::new();
    let feed = Arc::new(feed);

    let handle = svc
        .attach_feed(feed.clone() as Arc<dyn KlineFeed>)
        .await
        .unwrap();
    assert_eq!(feed.subscriptions(), svc.live_cache().tracked());

    let cache = svc
        .live_cache()
        .symbol_cache(SYMBOL, Interval::ONE_MINUTE)
        .unwrap()
        .clone();
    assert!(sender.push(Interval::ONE_MINUTE, tick(&provider, LIVE_OPEN)).await);
    for _ in 0..200 {
        if cache.active().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(cache.active().map(|k| k.open_time), Some(LIVE_OPEN));

    handle.stop().await;
    assert!(!sender.push(Interval::ONE_MINUTE, tick(&provider, LIVE_OPEN)).await);
}

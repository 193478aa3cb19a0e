mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use kline::{Interval, KlineError, KlineService, RateLimitConfig};
use kline_mock::MockProvider;

static MINUTES_ONLY: &[Interval] = &[Interval::ONE_MINUTE];

#[tokio::test]
async fn provider_only_reads_resample_the_optimal_timeframe() {
    let provider = provider();
    let svc = provider_only(&provider);

    // 45m is built from the provider's native 15m bars.
    let bars = svc.get_last_klines(SYMBOL, minutes(45), 4).await.unwrap();
    assert_eq!(bars.len(), 4);
    assert_contiguous(&bars, 45 * MINUTE);
    let last = bars.last().unwrap();
    assert!(!last.closed);
    assert!(last.open_time <= NOW && NOW <= last.close_time);
}

#[tokio::test]
async fn provider_only_reads_honour_the_cursor() {
    let provider = provider();
    let svc = provider_only(&provider);

    let cursor = LISTING + 100 * MINUTE + 5;
    let bars = svc
        .get_last_klines_from_timestamp(SYMBOL, Interval::ONE_MINUTE, cursor, 20)
        .await
        .unwrap();
    assert_eq!(bars.len(), 20);
    assert_eq!(bars.last().unwrap().open_time, LISTING + 100 * MINUTE);
    assert!(bars.iter().all(|k| k.closed));
    assert_contiguous(&bars, MINUTE);
    assert_eq!(provider.recent_calls(), 0);
}

#[tokio::test]
async fn short_history_returns_what_exists() {
    let provider = provider();
    let svc = provider_only(&provider);

    let bars = svc
        .get_last_klines_from_timestamp(SYMBOL, Interval::ONE_MINUTE, LISTING + 4 * MINUTE, 50)
        .await
        .unwrap();
    assert_eq!(bars.len(), 5);
    assert_eq!(bars[0].open_time, LISTING);
    assert_eq!(bars[0].prev_close_time, 0);
    assert!(kline::check_chain(&bars));
}

#[tokio::test]
async fn unsupported_intervals_are_rejected() {
    let provider = Arc::new(MockProvider::new(LISTING, NOW).with_intervals(MINUTES_ONLY));
    let svc = provider_only(&provider);

    let err = svc
        .get_last_klines(SYMBOL, Interval::ONE_DAY, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, KlineError::UnsupportedInterval { .. }), "{err:?}");
    assert_eq!(provider.recent_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let provider = provider();
    let svc = provider_only(&provider);

    provider.fail_next(2);
    let bars = svc
        .get_last_klines(SYMBOL, Interval::ONE_MINUTE, 5)
        .await
        .unwrap();
    assert_eq!(bars.len(), 5);
    assert_eq!(provider.recent_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_bounded() {
    let provider = provider();
    let svc = provider_only(&provider);

    provider.fail_next(10);
    let err = svc
        .get_last_klines(SYMBOL, Interval::ONE_MINUTE, 5)
        .await
        .unwrap_err();
    match err {
        KlineError::RetriesExhausted {
            operation,
            attempts,
            last,
        } => {
            assert_eq!(operation, "fetch_recent");
            assert_eq!(attempts, 3);
            assert!(last.is_transient());
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(provider.recent_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn request_deadline_bounds_the_whole_call() {
    let provider = Arc::new(
        MockProvider::new(LISTING, NOW)
            .with_page_size(100)
            .with_delay(Duration::from_secs(10)),
    );
    let svc = KlineService::builder()
        .with_provider(provider.clone())
        .request_timeout(Duration::from_secs(1))
        .build()
        .unwrap();

    let err = svc
        .get_last_klines(SYMBOL, Interval::ONE_MINUTE, 5)
        .await
        .unwrap_err();
    assert_eq!(err, KlineError::request_timeout("get_last_klines"));
    assert!(!err.is_transient());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_provider_spaces_out_requests() {
    let provider = provider();
    let svc = KlineService::builder()
        .with_provider(provider.clone())
        .rate_limit(RateLimitConfig {
            requests_per_second: 1.0,
            burst: 1,
        })
        .build()
        .unwrap();

    // 1 recent page + 3 backward pages at one request per second.
    let start = tokio::time::Instant::now();
    let bars = svc
        .get_last_klines(SYMBOL, Interval::ONE_MINUTE, 350)
        .await
        .unwrap();
    assert_eq!(bars.len(), 301);
    assert_eq!(provider.recent_calls() + provider.range_calls(), 4);
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[test]
fn builder_requires_a_provider() {
    let err = KlineService::builder().build().err().unwrap();
    assert!(matches!(err, KlineError::InvalidArg(_)));
}

use std::time::Duration;

use kline_types::{BackoffConfig, Interval, KLine, KlineConfig, KlineError, LiveCacheConfig};

#[test]
fn config_roundtrips_through_json() {
    let cfg = KlineConfig {
        request_timeout: Some(Duration::from_secs(3)),
        live: LiveCacheConfig {
            archive_lengths: vec![(Interval::minutes(5).unwrap(), 10)],
        },
        ..KlineConfig::default()
    };
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("\"5m\""), "intervals serialize in display form: {json}");
    let back: KlineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn interval_rejects_bad_json() {
    let res: Result<Interval, _> = serde_json::from_str("\"0m\"");
    assert!(res.is_err());
}

#[test]
fn kline_uses_camel_case_and_string_decimals() {
    let k = KLine {
        symbol: "ETHUSDT".into(),
        open_time: 60_000,
        close_time: 119_999,
        close: "1.25".parse().unwrap(),
        prev_close_time: 59_999,
        closed: true,
        ..KLine::default()
    };
    let v = serde_json::to_value(&k).unwrap();
    assert_eq!(v["prevCloseTime"], 59_999);
    assert_eq!(v["close"], "1.25");
    let back: KLine = serde_json::from_value(v).unwrap();
    assert_eq!(back, k);
}

#[test]
fn backoff_delay_grows_and_caps() {
    let b = BackoffConfig {
        min_backoff_ms: 100,
        max_backoff_ms: 1000,
        factor: 3,
        jitter_percent: 0,
        max_attempts: 5,
    };
    assert_eq!(b.delay_ms(1), 100);
    assert_eq!(b.delay_ms(2), 300);
    assert_eq!(b.delay_ms(3), 900);
    assert_eq!(b.delay_ms(4), 1000);
    assert_eq!(b.delay_ms(40), 1000);
}

#[test]
fn only_provider_failures_are_transient() {
    assert!(KlineError::provider("mock", "503").is_transient());
    assert!(!KlineError::chain_break("X", "1m", 0, 60_000).is_transient());
    assert!(!KlineError::store_write("disk full").is_transient());
}

use std::future::Future;
use std::time::Duration;

use kline_core::{BackoffConfig, KlineError};
use rand::Rng;

/// `base_ms` plus up to `jitter_percent` percent of random extra delay.
pub fn jitter_wait(base_ms: u64, jitter_percent: u8) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, base_ms.saturating_mul(u64::from(jitter_percent)) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Jittered delay after `failures` consecutive failures under `cfg`.
pub fn backoff_delay(cfg: &BackoffConfig, failures: u32) -> Duration {
    Duration::from_millis(jitter_wait(cfg.delay_ms(failures), cfg.jitter_percent))
}

/// Run `call` until it succeeds, fails with a non-transient error, or the attempt budget
/// in `cfg` is spent.
///
/// # Errors
/// Non-transient errors are returned as-is; a spent budget yields
/// `KlineError::RetriesExhausted` wrapping the last failure.
pub async fn retry<T, F, Fut>(
    cfg: &BackoffConfig,
    operation: &'static str,
    mut call: F,
) -> Result<T, KlineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KlineError>>,
{
    let attempts = cfg.max_attempts.max(1);
    let mut failures = 0u32;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() => {
                failures += 1;
                if failures >= attempts {
                    return Err(KlineError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: failures,
                        last: Box::new(e),
                    });
                }
                let delay = backoff_delay(cfg, failures);
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    operation,
                    failures,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn jitter_stays_within_percent() {
        for _ in 0..100 {
            let w = jitter_wait(1000, 20);
            assert!((1000..1200).contains(&w));
        }
        assert_eq!(jitter_wait(1000, 0), 1000);
    }

    fn fast() -> BackoffConfig {
        BackoffConfig {
            min_backoff_ms: 10,
            max_backoff_ms: 40,
            factor: 2,
            jitter_percent: 0,
            max_attempts: 3,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let out = retry(&fast(), "fetch", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(KlineError::provider("p", "503"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(out, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let calls = &AtomicU32::new(0);
        let err = retry(&fast(), "fetch", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(KlineError::provider("p", "down"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            KlineError::RetriesExhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(last.is_transient());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = retry(&fast(), "insert", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(KlineError::store_write("disk full"))
        })
        .await
        .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, KlineError::StoreWrite { .. }));
    }
}

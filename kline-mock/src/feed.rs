use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use kline_core::{FeedEvent, FeedHandle, Interval, KLine, KlineError, KlineFeed};
use tokio::sync::{mpsc, oneshot};

const CHANNEL_CAPACITY: usize = 1024;

/// Push-driven feed. Ticks sent through the paired [`MockFeedSender`] are relayed to the
/// single subscriber unfiltered, like a raw websocket that may carry unexpected streams.
pub struct MockFeed {
    inbound: Mutex<Option<mpsc::Receiver<FeedEvent>>>,
    subscriptions: Mutex<Vec<(String, Interval)>>,
}

/// Test-side handle for injecting ticks into a [`MockFeed`].
#[derive(Clone)]
pub struct MockFeedSender {
    tx: mpsc::Sender<FeedEvent>,
}

impl MockFeed {
    /// Create a feed and the sender that drives it.
    #[must_use]
    pub fn new() -> (Self, MockFeedSender) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                inbound: Mutex::new(Some(rx)),
                subscriptions: Mutex::new(Vec::new()),
            },
            MockFeedSender { tx },
        )
    }

    /// Streams requested by the subscriber.
    pub fn subscriptions(&self) -> Vec<(String, Interval)> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MockFeedSender {
    /// Deliver one tick. Returns `false` once the feed session has ended.
    pub async fn push(&self, interval: Interval, kline: KLine) -> bool {
        let event = FeedEvent {
            symbol: kline.symbol.clone(),
            interval,
            kline,
        };
        self.tx.send(event).await.is_ok()
    }
}

#[async_trait]
impl KlineFeed for MockFeed {
    fn name(&self) -> &'static str {
        "kline-mock-feed"
    }

    async fn subscribe(
        &self,
        streams: &[(String, Interval)],
    ) -> Result<(FeedHandle, mpsc::Receiver<FeedEvent>), KlineError> {
        let mut inbound = self
            .inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| KlineError::InvalidArg("mock feed already subscribed".into()))?;
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(streams.iter().cloned());

        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    ev = inbound.recv() => match ev {
                        Some(ev) => {
                            if out_tx.send(ev).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        Ok((FeedHandle::new(task, stop_tx), out_rx))
    }
}

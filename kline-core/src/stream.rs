use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running pump or transport task behind a [`FeedHandle`].
pub trait PumpTask {
    /// Cancel the task at its next suspension point.
    fn abort(&mut self);
    /// Whether the task has already exited.
    fn is_finished(&self) -> bool;
}

impl PumpTask for JoinHandle<()> {
    fn abort(&mut self) {
        Self::abort(self);
    }

    fn is_finished(&self) -> bool {
        Self::is_finished(self)
    }
}

/// Sender half of a feed's stop request.
pub trait StopSignal {
    /// Ask the task to wind down. Delivery is best effort.
    fn fire(self);
}

impl StopSignal for oneshot::Sender<()> {
    fn fire(self) {
        let _ = self.send(());
    }
}

/// How [`shut_down`] left a feed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// No task was held any more.
    Released,
    /// The task had exited on its own; only the stop request went out.
    Exited,
    /// The task was still running and has been aborted.
    Aborted,
}

/// Fire the stop request if still held, then abort the task unless it already exited.
pub fn shut_down<T, S>(task: &mut Option<T>, signal: &mut Option<S>) -> Shutdown
where
    T: PumpTask,
    S: StopSignal,
{
    if let Some(s) = signal.take() {
        s.fire();
    }
    match task.take() {
        None => Shutdown::Released,
        Some(t) if t.is_finished() => Shutdown::Exited,
        Some(mut t) => {
            t.abort();
            Shutdown::Aborted
        }
    }
}

/// Owner of a running feed task (a transport session or a tick pump).
///
/// Dropping the handle stops the task; [`FeedHandle::stop`] does so gracefully and
/// waits for it to finish.
#[derive(Debug)]
pub struct FeedHandle {
    inner: Option<JoinHandle<()>>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl FeedHandle {
    /// Wrap a spawned task and the sender half of its stop signal.
    #[must_use]
    pub const fn new(inner: JoinHandle<()>, stop_tx: oneshot::Sender<()>) -> Self {
        Self {
            inner: Some(inner),
            stop_tx: Some(stop_tx),
        }
    }

    /// Whether the task has already completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the task to stop and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            tx.fire();
        }
        if let Some(h) = self.inner.take() {
            let _ = h.await;
        }
    }

    /// Abort the task without waiting.
    pub fn abort(mut self) {
        if let Some(h) = self.inner.take() {
            h.abort();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        let _outcome = shut_down(&mut self.inner, &mut self.stop_tx);
        #[cfg(feature = "tracing")]
        if _outcome == Shutdown::Aborted {
            tracing::debug!("feed task still running on drop; aborted");
        }
    }
}

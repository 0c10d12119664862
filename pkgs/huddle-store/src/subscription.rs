//! Live query subscriptions
//!
//! A subscription re-runs its query whenever a relevant [`StoreEvent`] is
//! published and pushes the *entire* refreshed result. Consumers must treat
//! every item as a full replacement of what they showed before.
//!
//! The backing task lives exactly as long as the [`Subscription`] handle:
//! dropping it (or calling [`Subscription::unsubscribe`]) aborts the task and
//! releases its change-feed receiver.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::StoreError;
use crate::events::{ChangeFeed, StoreEvent};

/// Handle to a running live query
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> Subscription<T> {
    /// Start a live query.
    ///
    /// The feed receiver is taken before the first query runs, so a write that
    /// lands between the initial snapshot and the first `recv` is not lost.
    pub(crate) fn spawn<R, Q, Fut>(
        label: String,
        feed: &ChangeFeed,
        buffer: usize,
        relevant: R,
        query: Q,
    ) -> Self
    where
        R: Fn(&StoreEvent) -> bool + Send + 'static,
        Q: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut events = feed.subscribe();

        let task = tokio::spawn(async move {
            debug!("Subscription {} started", label);

            if !push_snapshot(&label, &tx, &query).await {
                return;
            }

            loop {
                match events.recv().await {
                    Ok(event) if relevant(&event) => {
                        if !push_snapshot(&label, &tx, &query).await {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "Subscription {} lagged by {} events, refreshing",
                            label, skipped
                        );
                        if !push_snapshot(&label, &tx, &query).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            debug!("Subscription {} stopped", label);
        });

        Self { rx, task }
    }
}

impl<T> Subscription<T> {
    /// Wait for the next full snapshot. `None` once the subscription ended.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Most recent snapshot already delivered, skipping older queued ones
    pub fn latest(&mut self) -> Option<T> {
        let mut latest = None;
        while let Ok(item) = self.rx.try_recv() {
            latest = Some(item);
        }
        latest
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the live query and release its resources
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Run the query and forward the result. Returns false once the consumer is gone.
async fn push_snapshot<T, Q, Fut>(label: &str, tx: &mpsc::Sender<T>, query: &Q) -> bool
where
    Q: Fn() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match query().await {
        Ok(snapshot) => tx.send(snapshot).await.is_ok(),
        Err(e) => {
            // Keep the previous snapshot on screen rather than emitting a bogus empty one
            error!("Subscription {} query failed: {}", label, e);
            !tx.is_closed()
        }
    }
}

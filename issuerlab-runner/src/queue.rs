//! Bounded work queue: runs async tasks under a concurrency cap.
//!
//! Results come back in submission order regardless of completion order.
//! A failing task yields its error in place; siblings keep running. Cancelling
//! the queue's token stops admitting new tasks and aborts the ones in flight,
//! which then report [`QueueError::Cancelled`].

use futures::stream::{self, StreamExt};
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError<E> {
    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Task(E),
}

/// Runs task producers with at most `concurrency` executing at once.
#[derive(Debug, Clone)]
pub struct BoundedQueue {
    concurrency: usize,
    cancel: CancellationToken,
}

impl BoundedQueue {
    /// A queue with its own cancellation token. Zero is treated as one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Tie the queue to an outer cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run every task and collect the outcomes in submission order.
    ///
    /// A producer is only invoked once a slot is free and the run has not
    /// been cancelled.
    pub async fn run<T, E, F, Fut>(&self, tasks: Vec<F>) -> Vec<Result<T, QueueError<E>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total = tasks.len();
        let mut slots: Vec<Option<Result<T, QueueError<E>>>> = (0..total).map(|_| None).collect();

        let mut outcomes = stream::iter(tasks.into_iter().enumerate())
            .map(|(index, task)| {
                let cancel = self.cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return (index, Err(QueueError::Cancelled));
                    }
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(QueueError::Cancelled),
                        result = task() => result.map_err(QueueError::Task),
                    };
                    (index, outcome)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((index, outcome)) = outcomes.next().await {
            slots[index] = Some(outcome);
        }

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(QueueError::Cancelled)))
            .collect()
    }
}

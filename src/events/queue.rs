// Async pull queue
//
// Bridges push-based event delivery to sequential `next().await` consumers.
// `end()` lets consumers drain what is already queued and then see `None`;
// `abort()` discards queued items and fails every current and future
// `next()` with the abort error.

use crate::error::SttError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

enum QueueStatus {
    Open,
    Ended,
    Aborted(SttError),
}

struct QueueInner<T> {
    items: VecDeque<T>,
    status: QueueStatus,
}

pub struct AsyncQueue<T> {
    inner: Mutex<QueueInner<T>>,
    notify: Notify,
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                status: QueueStatus::Open,
            }),
            notify: Notify::new(),
        }
    }

    /// Queue an item. Returns false once the queue has ended or been aborted.
    pub fn push(&self, item: T) -> bool {
        {
            let mut inner = self.lock();
            if !matches!(inner.status, QueueStatus::Open) {
                return false;
            }
            inner.items.push_back(item);
        }
        self.notify.notify_one();
        true
    }

    /// Mark the end of input. Already queued items stay consumable.
    pub fn end(&self) {
        {
            let mut inner = self.lock();
            if !matches!(inner.status, QueueStatus::Open) {
                return;
            }
            inner.status = QueueStatus::Ended;
        }
        self.notify.notify_waiters();
    }

    /// Fail the queue. Pending items are discarded.
    pub fn abort(&self, error: SttError) {
        {
            let mut inner = self.lock();
            if matches!(inner.status, QueueStatus::Aborted(_)) {
                return;
            }
            inner.items.clear();
            inner.status = QueueStatus::Aborted(error);
        }
        self.notify.notify_waiters();
    }

    /// Wait for the next item.
    ///
    /// Returns `Ok(None)` after `end()` once the backlog is drained.
    pub async fn next(&self) -> Result<Option<T>, SttError> {
        loop {
            let notified = self.notify.notified();
            if let Some(outcome) = self.poll_item() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`next`](Self::next); `None` means nothing is ready yet.
    pub fn try_next(&self) -> Option<Result<Option<T>, SttError>> {
        self.poll_item()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self.lock().status, QueueStatus::Open)
    }

    fn poll_item(&self) -> Option<Result<Option<T>, SttError>> {
        let mut inner = self.lock();
        if let QueueStatus::Aborted(err) = &inner.status {
            return Some(Err(err.clone()));
        }
        if let Some(item) = inner.items.pop_front() {
            return Some(Ok(Some(item)));
        }
        match inner.status {
            QueueStatus::Ended => Some(Ok(None)),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

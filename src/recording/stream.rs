use super::events::RecordingEvent;
use crate::error::SttError;
use crate::events::{AsyncQueue, EventChannel, ListenerId};
use futures::Stream;
use std::sync::{Arc, Weak};

/// Pull-based view over a recording's events, created by
/// [`Recording::events`](super::Recording::events).
///
/// Dropping the stream unregisters its listeners.
pub struct EventStream {
    queue: Arc<AsyncQueue<RecordingEvent>>,
    channel: Weak<EventChannel<RecordingEvent>>,
    listeners: Vec<ListenerId>,
}

impl EventStream {
    pub(crate) fn new(
        queue: Arc<AsyncQueue<RecordingEvent>>,
        channel: Weak<EventChannel<RecordingEvent>>,
        listeners: Vec<ListenerId>,
    ) -> Self {
        Self {
            queue,
            channel,
            listeners,
        }
    }

    /// Next event, `Ok(None)` after `finished`, or the error that ended the recording.
    pub async fn next(&mut self) -> Result<Option<RecordingEvent>, SttError> {
        self.queue.next().await
    }

    /// Adapt into a [`Stream`]. An error is yielded once and ends the stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<RecordingEvent, SttError>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut events = state?;
            match events.next().await {
                Ok(Some(event)) => Some((Ok(event), Some(events))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.upgrade() {
            for id in self.listeners.drain(..) {
                channel.off(id);
            }
        }
    }
}

//! A producer backed by an owned stream.

use crate::stream::{MessageStream, Producer, Subscription};
use crate::types::{Message, MessagingError, MessagingResult};
use futures::stream;
use parking_lot::Mutex;

/// Wraps an already-built stream as a [`Producer`].
///
/// The stream is handed out exactly once. Whichever consumer subscribes
/// first takes it; later subscribers get a state error.
pub struct StreamProducer {
    label: String,
    stream: Mutex<Option<MessageStream>>,
}

impl StreamProducer {
    /// Wrap a stream under a diagnostic label.
    pub fn new(label: impl Into<String>, stream: MessageStream) -> Self {
        Self {
            label: label.into(),
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Convenience constructor over a fixed item sequence.
    pub fn from_items(label: impl Into<String>, items: impl IntoIterator<Item = Message>) -> Self {
        let items: Vec<Message> = items.into_iter().collect();
        Self::new(label, Box::pin(stream::iter(items)))
    }

    /// Whether the stream is still available to a subscriber.
    pub fn is_available(&self) -> bool {
        self.stream.lock().is_some()
    }
}

impl Producer for StreamProducer {
    fn subscribe(&self) -> MessagingResult<Subscription> {
        match self.stream.lock().take() {
            Some(stream) => Ok(Subscription::new(stream)),
            None => Err(MessagingError::IllegalState(format!(
                "stream '{}' has already been consumed",
                self.label
            ))),
        }
    }
}

//! Stream, demand, and capability abstractions.
//!
//! A [`Producer`] hands out a [`Subscription`]: a boxed message stream
//! paired with a [`Demand`] handle the consumer uses to signal
//! readiness and cancellation. A [`Consumer`] receives items pushed by
//! the wiring layer.

use crate::types::{Message, MessagingError, MessagingResult};
use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// The data path between wired components.
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

struct DemandInner {
    credits: AtomicU64,
    cancelled: AtomicBool,
    // Downstream demand on a merged subscription forwards to the
    // demands of every member producer.
    links: Mutex<Vec<Demand>>,
}

/// A cloneable credit counter shared between a producer and its consumer.
///
/// Consumers call [`request`](Demand::request) to grant credits;
/// push-based producers claim one credit per item sent. Cancellation is
/// sticky.
#[derive(Clone)]
pub struct Demand {
    inner: Arc<DemandInner>,
}

impl Default for Demand {
    fn default() -> Self {
        Self::new()
    }
}

impl Demand {
    /// Create a demand handle with zero credits.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DemandInner {
                credits: AtomicU64::new(0),
                cancelled: AtomicBool::new(false),
                links: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Grant `n` credits, forwarding to any linked demands.
    pub fn request(&self, n: u64) {
        if n == 0 || self.is_cancelled() {
            return;
        }
        // Saturate rather than wrap on pathological request totals.
        let mut current = self.inner.credits.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(n);
            match self.inner.credits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        for link in self.inner.links.lock().iter() {
            link.request(n);
        }
    }

    /// Claim one credit. Returns false when no credits are available.
    pub fn try_claim(&self) -> bool {
        let mut current = self.inner.credits.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.inner.credits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Current credit balance.
    pub fn credits(&self) -> u64 {
        self.inner.credits.load(Ordering::Acquire)
    }

    /// Cancel the subscription. Cancellation propagates to linked
    /// demands and cannot be undone.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        for link in self.inner.links.lock().iter() {
            link.cancel();
        }
    }

    /// Whether the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Forward requests and cancellation to `other` as well. Credits
    /// already granted here are replayed onto `other` so a link made
    /// late does not strand earlier requests.
    pub fn link(&self, other: Demand) {
        if self.is_cancelled() {
            other.cancel();
        }
        let outstanding = self.credits();
        if outstanding > 0 {
            other.request(outstanding);
        }
        self.inner.links.lock().push(other);
    }
}

impl std::fmt::Debug for Demand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demand")
            .field("credits", &self.credits())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A live connection to a producer.
pub struct Subscription {
    /// The item stream.
    pub stream: MessageStream,
    /// The demand handle governing the stream.
    pub demand: Demand,
}

impl Subscription {
    /// Pair a stream with a fresh demand handle.
    pub fn new(stream: MessageStream) -> Self {
        Self {
            stream,
            demand: Demand::new(),
        }
    }

    /// Pair a stream with an existing demand handle.
    pub fn with_demand(stream: MessageStream, demand: Demand) -> Self {
        Self { stream, demand }
    }
}

/// A component that can be subscribed to for messages.
pub trait Producer: Send + Sync {
    /// Take the producer's stream. Stream-backed producers are
    /// consume-once; a second call is a state error.
    fn subscribe(&self) -> MessagingResult<Subscription>;
}

/// A component that receives messages pushed by the wiring layer.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Handle one message.
    async fn accept(&self, message: Message) -> MessagingResult<()>;

    /// Observe the end of the upstream. Default is a no-op.
    async fn complete(&self) {}
}

/// A consumer that delegates each message to a closure.
pub struct FunctionConsumer<F>
where
    F: Fn(Message) -> MessagingResult<()> + Send + Sync,
{
    func: F,
}

impl<F> FunctionConsumer<F>
where
    F: Fn(Message) -> MessagingResult<()> + Send + Sync,
{
    /// Create a consumer from the given closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Consumer for FunctionConsumer<F>
where
    F: Fn(Message) -> MessagingResult<()> + Send + Sync,
{
    async fn accept(&self, message: Message) -> MessagingResult<()> {
        (self.func)(message)
    }
}

/// A consumer that buffers everything it receives. Intended for tests
/// and diagnostics.
#[derive(Default)]
pub struct CollectingConsumer {
    received: Mutex<Vec<Message>>,
    completed: AtomicBool,
}

impl CollectingConsumer {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy out everything received so far.
    pub fn snapshot(&self) -> Vec<Message> {
        self.received.lock().clone()
    }

    /// Number of messages received so far.
    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    /// Whether nothing has been received yet.
    pub fn is_empty(&self) -> bool {
        self.received.lock().is_empty()
    }

    /// Whether the upstream has signalled completion.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Consumer for CollectingConsumer {
    async fn accept(&self, message: Message) -> MessagingResult<()> {
        self.received.lock().push(message);
        Ok(())
    }

    async fn complete(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

/// Helper for rejecting a null payload at a producer boundary.
pub(crate) fn reject_null(message: &Message) -> MessagingResult<()> {
    if message.payload.is_null() {
        Err(MessagingError::InvalidInput(
            "null payload is not a valid item".to_string(),
        ))
    } else {
        Ok(())
    }
}

//! Mediator lifecycle and stream plumbing.

use crate::configuration::{Component, MediatorConfiguration};
use crate::stream::{Consumer, Subscription};
use crate::stream_producer::StreamProducer;
use crate::types::{ChannelName, MergePolicy, Message, MessagingError, MessagingResult, Shape};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One wired unit of application logic.
///
/// Built 1:1 from a [`MediatorConfiguration`]. The lifecycle is
/// `new` then `initialize` (binds the live component), then
/// `connect_to_upstream` when the incoming channel resolves, then
/// `run` for subscriber shapes. A mediator with no incoming channel is
/// connected from creation.
pub struct Mediator {
    configuration: MediatorConfiguration,
    component: Mutex<Option<Arc<dyn Component>>>,
    connected: AtomicBool,
    started: AtomicBool,
    output: Mutex<Option<Arc<StreamProducer>>>,
    upstream: Mutex<Option<Subscription>>,
}

impl Mediator {
    /// Build a mediator from its configuration.
    pub fn new(configuration: MediatorConfiguration) -> Self {
        let connected = configuration.incoming.is_none();
        Self {
            configuration,
            component: Mutex::new(None),
            connected: AtomicBool::new(connected),
            started: AtomicBool::new(false),
            output: Mutex::new(None),
            upstream: Mutex::new(None),
        }
    }

    /// The mediator's diagnostic identifier.
    pub fn id(&self) -> &str {
        &self.configuration.id
    }

    /// The mediator's shape.
    pub fn shape(&self) -> Shape {
        self.configuration.shape
    }

    /// The declared incoming channel, if any.
    pub fn incoming(&self) -> Option<&ChannelName> {
        self.configuration.incoming.as_ref()
    }

    /// The declared outgoing channel, if any.
    pub fn outgoing(&self) -> Option<&ChannelName> {
        self.configuration.outgoing.as_ref()
    }

    /// The declared merge policy, if any.
    pub fn merge_policy(&self) -> Option<MergePolicy> {
        self.configuration.merge_policy
    }

    /// Whether the upstream side is satisfied.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether `run` has been invoked.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Bind the live component instance. For publisher shapes this also
    /// materializes the output stream, since there is no input to wait
    /// for.
    pub async fn initialize(&self) -> MessagingResult<()> {
        let component = self
            .configuration
            .provider
            .component()
            .await
            .map_err(|e| {
                MessagingError::ComponentUnavailable(format!(
                    "mediator '{}': {e}",
                    self.configuration.id
                ))
            })?;

        if self.configuration.shape == Shape::Publisher {
            let stream = component.produce().await?;
            self.output
                .lock()
                .replace(Arc::new(StreamProducer::new(self.id(), stream)));
        }
        self.component.lock().replace(component);
        debug!(mediator = self.id(), shape = %self.shape(), "mediator initialized");
        Ok(())
    }

    fn component(&self) -> MessagingResult<Arc<dyn Component>> {
        self.component.lock().clone().ok_or_else(|| {
            MessagingError::IllegalState(format!(
                "mediator '{}' is not initialized",
                self.configuration.id
            ))
        })
    }

    /// Bind this mediator's upstream subscription.
    ///
    /// Calling again on a connected mediator is a logged no-op; the new
    /// subscription is dropped. For processor shapes the output stream
    /// becomes available after this call.
    pub fn connect_to_upstream(&self, subscription: Subscription) -> MessagingResult<()> {
        if self.configuration.incoming.is_none() {
            return Err(MessagingError::InvalidInput(format!(
                "mediator '{}' declares no incoming channel",
                self.configuration.id
            )));
        }
        if self
            .connected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(mediator = self.id(), "already connected, ignoring upstream");
            return Ok(());
        }

        match self.configuration.shape {
            Shape::Processor => {
                let component = self.component()?;
                let id = self.configuration.id.clone();
                let demand = subscription.demand.clone();
                let stream = stream::unfold(
                    (subscription.stream, component, demand, id),
                    |(mut upstream, component, demand, id)| async move {
                        loop {
                            if demand.is_cancelled() {
                                return None;
                            }
                            demand.request(1);
                            match upstream.next().await {
                                Some(message) => match component.transform(message).await {
                                    Ok(out) => {
                                        return Some((out, (upstream, component, demand, id)))
                                    }
                                    Err(e) => {
                                        warn!(
                                            mediator = %id,
                                            error = %e,
                                            "transform failed, dropping message"
                                        );
                                    }
                                },
                                None => return None,
                            }
                        }
                    },
                );
                self.output
                    .lock()
                    .replace(Arc::new(StreamProducer::new(self.id(), Box::pin(stream))));
            }
            Shape::Subscriber => {
                self.upstream.lock().replace(subscription);
            }
            Shape::Publisher => {
                // Unreachable for validated configurations.
                return Err(MessagingError::IllegalState(format!(
                    "publisher mediator '{}' cannot take an upstream",
                    self.configuration.id
                )));
            }
        }
        debug!(mediator = self.id(), "mediator connected");
        Ok(())
    }

    /// This mediator's output as a producer, for registration under its
    /// outgoing channel. Valid once the output stream exists: from
    /// `initialize` for publishers, from `connect_to_upstream` for
    /// processors.
    pub fn producer(&self) -> MessagingResult<Arc<StreamProducer>> {
        self.output.lock().clone().ok_or_else(|| {
            MessagingError::IllegalState(format!(
                "mediator '{}' has no output stream yet",
                self.configuration.id
            ))
        })
    }

    /// This mediator's input side as a pushable consumer, for callers
    /// that deliver items directly rather than through a stream.
    pub fn consumer(&self) -> MessagingResult<Arc<dyn Consumer>> {
        if self.configuration.shape != Shape::Subscriber {
            return Err(MessagingError::IllegalState(format!(
                "mediator '{}' is not subscriber-shaped",
                self.configuration.id
            )));
        }
        Ok(Arc::new(ComponentConsumer {
            id: self.configuration.id.clone(),
            component: self.component()?,
        }))
    }

    /// Start consuming on a spawned task. Subscriber shapes only; the
    /// mediator must be connected, and a second start is a state error.
    pub fn run(&self) -> MessagingResult<()> {
        if self.configuration.shape != Shape::Subscriber {
            return Err(MessagingError::IllegalState(format!(
                "mediator '{}' is not subscriber-shaped",
                self.configuration.id
            )));
        }
        if !self.is_connected() {
            return Err(MessagingError::IllegalState(format!(
                "mediator '{}' is not connected",
                self.configuration.id
            )));
        }
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                MessagingError::IllegalState(format!(
                    "mediator '{}' is already running",
                    self.configuration.id
                ))
            })?;

        let subscription = self.upstream.lock().take().ok_or_else(|| {
            MessagingError::IllegalState(format!(
                "mediator '{}' has no upstream subscription",
                self.configuration.id
            ))
        })?;
        let component = self.component()?;
        let id = self.configuration.id.clone();

        tokio::spawn(async move {
            let mut upstream = subscription.stream;
            let demand = subscription.demand;
            loop {
                if demand.is_cancelled() {
                    break;
                }
                demand.request(1);
                match upstream.next().await {
                    Some(message) => {
                        if let Err(e) = component.accept(message).await {
                            warn!(mediator = %id, error = %e, "consumer failed, dropping message");
                        }
                    }
                    None => {
                        debug!(mediator = %id, "upstream completed");
                        break;
                    }
                }
            }
        });
        Ok(())
    }
}

struct ComponentConsumer {
    id: String,
    component: Arc<dyn Component>,
}

#[async_trait]
impl Consumer for ComponentConsumer {
    async fn accept(&self, message: Message) -> MessagingResult<()> {
        self.component.accept(message).await
    }

    async fn complete(&self) {
        debug!(mediator = %self.id, "input completed");
    }
}

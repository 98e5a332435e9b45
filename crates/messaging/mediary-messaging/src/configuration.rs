//! Mediator configuration, component seams, and discovery.
//!
//! Discovery is a collaborator, not part of this crate's core: whatever
//! scans an application for mediating methods hands the manager a plain
//! list of [`MediatorConfiguration`]s plus the channel names that want
//! emitters. The engine never inspects application metadata itself.

use crate::stream::MessageStream;
use crate::types::{ChannelName, MergePolicy, Message, MessagingError, MessagingResult, Shape};
use async_trait::async_trait;
use mediary_core::{MediaryError, MediaryResult, Validatable};
use std::sync::Arc;

/// The application logic behind one mediator.
///
/// Exactly one of the three methods is exercised, chosen by the
/// configuration's shape. The defaults reject the call so a shape
/// mismatch surfaces as an error rather than silence.
#[async_trait]
pub trait Component: Send + Sync {
    /// Build the outbound stream. Publisher shape.
    async fn produce(&self) -> MessagingResult<MessageStream> {
        Err(MessagingError::IllegalState(
            "component does not produce".to_string(),
        ))
    }

    /// Map one inbound item to one outbound item. Processor shape.
    async fn transform(&self, message: Message) -> MessagingResult<Message> {
        let _ = message;
        Err(MessagingError::IllegalState(
            "component does not transform".to_string(),
        ))
    }

    /// Handle one inbound item. Subscriber shape.
    async fn accept(&self, message: Message) -> MessagingResult<()> {
        let _ = message;
        Err(MessagingError::IllegalState(
            "component does not accept".to_string(),
        ))
    }
}

/// Obtains the live component instance backing a configuration.
///
/// In a container this is where scoped-instance lookup happens; a
/// failure here skips the one mediator rather than the deployment.
#[async_trait]
pub trait ComponentProvider: Send + Sync {
    /// Get the component instance.
    async fn component(&self) -> MessagingResult<Arc<dyn Component>>;
}

/// A provider that always hands out the same instance.
pub struct StaticProvider {
    component: Arc<dyn Component>,
}

impl StaticProvider {
    /// Wrap an existing component instance.
    pub fn new(component: Arc<dyn Component>) -> Self {
        Self { component }
    }
}

#[async_trait]
impl ComponentProvider for StaticProvider {
    async fn component(&self) -> MessagingResult<Arc<dyn Component>> {
        Ok(Arc::clone(&self.component))
    }
}

/// Static metadata for one mediator, immutable once built.
#[derive(Clone)]
pub struct MediatorConfiguration {
    /// Identifier used in logs and diagnostics, typically the method name.
    pub id: String,
    /// The mediator's shape.
    pub shape: Shape,
    /// Declared input channel, if any.
    pub incoming: Option<ChannelName>,
    /// Declared output channel, if any.
    pub outgoing: Option<ChannelName>,
    /// How multiple producers on the incoming channel are combined.
    pub merge_policy: Option<MergePolicy>,
    /// Access to the backing component instance.
    pub provider: Arc<dyn ComponentProvider>,
}

impl MediatorConfiguration {
    /// Configuration for a publisher-shaped mediator.
    pub fn publisher(
        id: impl Into<String>,
        outgoing: ChannelName,
        provider: Arc<dyn ComponentProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            shape: Shape::Publisher,
            incoming: None,
            outgoing: Some(outgoing),
            merge_policy: None,
            provider,
        }
    }

    /// Configuration for a processor-shaped mediator.
    pub fn processor(
        id: impl Into<String>,
        incoming: ChannelName,
        outgoing: ChannelName,
        provider: Arc<dyn ComponentProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            shape: Shape::Processor,
            incoming: Some(incoming),
            outgoing: Some(outgoing),
            merge_policy: None,
            provider,
        }
    }

    /// Configuration for a subscriber-shaped mediator.
    pub fn subscriber(
        id: impl Into<String>,
        incoming: ChannelName,
        provider: Arc<dyn ComponentProvider>,
    ) -> Self {
        Self {
            id: id.into(),
            shape: Shape::Subscriber,
            incoming: Some(incoming),
            outgoing: None,
            merge_policy: None,
            provider,
        }
    }

    /// Set the merge policy for the incoming channel.
    #[must_use]
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = Some(policy);
        self
    }
}

impl std::fmt::Debug for MediatorConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediatorConfiguration")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("incoming", &self.incoming)
            .field("outgoing", &self.outgoing)
            .field("merge_policy", &self.merge_policy)
            .finish()
    }
}

impl Validatable for MediatorConfiguration {
    fn validate(&self) -> MediaryResult<()> {
        let fail = |detail: &str| {
            Err(MediaryError::config(format!(
                "mediator '{}': {detail}",
                self.id
            )))
        };
        match self.shape {
            Shape::Publisher => {
                if self.outgoing.is_none() {
                    return fail("publisher shape requires an outgoing channel");
                }
                if self.incoming.is_some() {
                    return fail("publisher shape cannot declare an incoming channel");
                }
            }
            Shape::Processor => {
                if self.incoming.is_none() || self.outgoing.is_none() {
                    return fail("processor shape requires incoming and outgoing channels");
                }
            }
            Shape::Subscriber => {
                if self.incoming.is_none() {
                    return fail("subscriber shape requires an incoming channel");
                }
                if self.outgoing.is_some() {
                    return fail("subscriber shape cannot declare an outgoing channel");
                }
            }
        }
        if self.merge_policy.is_some() && self.incoming.is_none() {
            return fail("merge policy requires an incoming channel");
        }
        Ok(())
    }
}

/// The discovery collaborator: produces configurations and emitter
/// injection points for one deployment.
pub trait MediatorDiscovery: Send + Sync {
    /// Every discovered mediator configuration.
    fn configurations(&self) -> Vec<MediatorConfiguration>;

    /// Every channel name for which an emitter was requested.
    fn emitter_channels(&self) -> Vec<ChannelName>;
}

/// Discovery backed by plain lists, for embedding and tests.
#[derive(Default)]
pub struct StaticDiscovery {
    configurations: Vec<MediatorConfiguration>,
    emitters: Vec<ChannelName>,
}

impl StaticDiscovery {
    /// Create an empty discovery.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mediator configuration.
    #[must_use]
    pub fn with_configuration(mut self, configuration: MediatorConfiguration) -> Self {
        self.configurations.push(configuration);
        self
    }

    /// Request an emitter for a channel.
    #[must_use]
    pub fn with_emitter(mut self, channel: ChannelName) -> Self {
        self.emitters.push(channel);
        self
    }
}

impl MediatorDiscovery for StaticDiscovery {
    fn configurations(&self) -> Vec<MediatorConfiguration> {
        self.configurations.clone()
    }

    fn emitter_channels(&self) -> Vec<ChannelName> {
        self.emitters.clone()
    }
}

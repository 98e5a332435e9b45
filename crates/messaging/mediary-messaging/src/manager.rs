//! Deployment-level wiring orchestration.
//!
//! [`MediatorManager`] drives the whole lifecycle: emitter setup,
//! mediator construction, the fixed-point connection loop, lazy-source
//! configuration, subscriber start, injected-consumer hookup, and the
//! strict/lenient unresolved-wiring policy.

use crate::configuration::MediatorDiscovery;
use crate::emitter::EmitterImpl;
use crate::lazy_source::LazySource;
use crate::mediator::Mediator;
use crate::registry::ChannelRegistry;
use crate::stream::{Consumer, Producer, Subscription};
use crate::types::{ChannelName, MergePolicy, MessagingError, MessagingResult, Shape};
use futures::StreamExt;
use mediary_core::config::{ConfigManager, EnvConfigSource};
use mediary_core::Validatable;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do when wiring leaves components unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WiringMode {
    /// Unresolved wiring fails the deployment.
    #[default]
    Strict,
    /// Unresolved wiring is logged; the graph runs partially connected.
    Lenient,
}

impl FromStr for WiringMode {
    type Err = MessagingError;

    fn from_str(s: &str) -> MessagingResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(WiringMode::Strict),
            "lenient" => Ok(WiringMode::Lenient),
            other => Err(MessagingError::Configuration(format!(
                "unknown wiring mode '{other}'"
            ))),
        }
    }
}

/// Knobs for the resolution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WiringConfig {
    /// Unresolved-wiring policy.
    pub mode: WiringMode,
    /// Safety bound on fixed-point passes. The loop normally stops by
    /// lack of progress well before this.
    pub max_passes: usize,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self {
            mode: WiringMode::default(),
            max_passes: 64,
        }
    }
}

impl WiringConfig {
    /// Build a strict configuration.
    pub fn strict() -> Self {
        Self {
            mode: WiringMode::Strict,
            ..Self::default()
        }
    }

    /// Build a lenient configuration.
    pub fn lenient() -> Self {
        Self {
            mode: WiringMode::Lenient,
            ..Self::default()
        }
    }

    /// Read `MEDIARY_WIRING_MODE` and `MEDIARY_WIRING_MAX_PASSES` from
    /// the environment, keeping defaults for anything unset.
    pub fn from_env() -> MessagingResult<Self> {
        let sources = ConfigManager::new().with_source(EnvConfigSource::new("MEDIARY"));
        Self::from_config(&sources)
    }

    /// Load from a layered configuration stack under the `wiring.*` keys.
    pub fn from_config(sources: &ConfigManager) -> MessagingResult<Self> {
        let mut config = Self::default();
        if let Some(mode) = sources.get_string("wiring.mode") {
            config.mode = mode.parse()?;
        }
        if let Some(max_passes) = sources
            .get_usize("wiring.max_passes")
            .map_err(|e| MessagingError::Configuration(e.to_string()))?
        {
            if max_passes == 0 {
                return Err(MessagingError::Configuration(
                    "wiring.max_passes must be at least 1".to_string(),
                ));
            }
            config.max_passes = max_passes;
        }
        Ok(config)
    }
}

/// Builds and wires the mediator graph for one deployment.
pub struct MediatorManager {
    registry: Arc<ChannelRegistry>,
    config: WiringConfig,
    mediators: Vec<Arc<Mediator>>,
    lazy_sources: HashMap<(ChannelName, MergePolicy), Arc<LazySource>>,
    emitter_channels: Vec<ChannelName>,
    initialized: bool,
}

impl MediatorManager {
    /// Create a manager over an injected registry.
    pub fn new(registry: Arc<ChannelRegistry>, config: WiringConfig) -> Self {
        Self {
            registry,
            config,
            mediators: Vec::new(),
            lazy_sources: HashMap::new(),
            emitter_channels: Vec::new(),
            initialized: false,
        }
    }

    /// The registry this manager wires against.
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Look up a built mediator by identifier.
    pub fn mediator(&self, id: &str) -> Option<&Arc<Mediator>> {
        self.mediators.iter().find(|m| m.id() == id)
    }

    /// Resolve and start the whole graph.
    ///
    /// Runs once per manager. The initialized flag is set on entry, so
    /// a failed strict resolution also pins this instance; retrying a
    /// deployment means building a new manager.
    pub async fn initialize_and_run(
        &mut self,
        discovery: &dyn MediatorDiscovery,
    ) -> MessagingResult<()> {
        if self.initialized {
            return Err(MessagingError::IllegalState(
                "manager is already initialized".to_string(),
            ));
        }
        self.initialized = true;

        self.install_emitters(discovery);
        self.build_mediators(discovery).await?;
        self.resolve_connections()?;

        for lazy in self.lazy_sources.values() {
            lazy.configure(&self.registry)?;
        }

        for mediator in &self.mediators {
            if mediator.shape() == Shape::Subscriber && mediator.is_connected() {
                mediator.run()?;
            }
        }

        let orphaned = self.wire_injected_consumers();
        self.enforce_unresolved_policy(orphaned)
    }

    /// Step 1: one emitter per declared injection point, registered
    /// both as the channel's emitter and as a producer under the name.
    /// The channel names are kept so the unresolved-wiring policy can
    /// report emitters nothing ended up consuming.
    fn install_emitters(&mut self, discovery: &dyn MediatorDiscovery) {
        for channel in discovery.emitter_channels() {
            let emitter = self
                .registry
                .register_emitter(Arc::new(EmitterImpl::new(channel.clone())));
            self.registry.register_producer(channel.clone(), emitter);
            if !self.emitter_channels.contains(&channel) {
                self.emitter_channels.push(channel);
            }
        }
    }

    /// Step 2: validate configurations, build and initialize mediators.
    /// Publishers register their output immediately; a mediator whose
    /// component cannot be obtained is excluded, not fatal.
    async fn build_mediators(&mut self, discovery: &dyn MediatorDiscovery) -> MessagingResult<()> {
        for configuration in discovery.configurations() {
            configuration
                .validate()
                .map_err(|e| MessagingError::Configuration(e.to_string()))?;
            let mediator = Arc::new(Mediator::new(configuration));
            if let Err(e) = mediator.initialize().await {
                warn!(
                    mediator = mediator.id(),
                    error = %e,
                    "initialization failed, excluding mediator from wiring"
                );
                continue;
            }
            if mediator.shape() == Shape::Publisher {
                if let Some(outgoing) = mediator.outgoing() {
                    self.registry
                        .register_producer(outgoing.clone(), mediator.producer()?);
                }
            }
            self.mediators.push(mediator);
        }
        Ok(())
    }

    /// Step 3: the fixed-point connection loop. Each pass connects what
    /// it can; a newly connected mediator registers its output, which
    /// may unblock others in a later pass. Stops when a pass makes no
    /// progress or the pass bound is hit.
    fn resolve_connections(&mut self) -> MessagingResult<()> {
        let mut passes = 0usize;
        loop {
            let unsatisfied: Vec<_> = self
                .mediators
                .iter()
                .filter(|m| !m.is_connected())
                .cloned()
                .collect();
            if unsatisfied.is_empty() {
                break;
            }

            let mut connected_this_pass = 0usize;
            for mediator in unsatisfied {
                let incoming = match mediator.incoming() {
                    Some(channel) => channel.clone(),
                    None => continue,
                };
                let candidates = self.registry.producer_count(&incoming);
                if candidates == 0 {
                    continue;
                }

                let subscription = match mediator.merge_policy() {
                    None if candidates == 1 => {
                        let producer = self
                            .registry
                            .producers(&incoming)
                            .into_iter()
                            .next()
                            .ok_or_else(|| {
                                MessagingError::IllegalState(format!(
                                    "producer list for '{incoming}' changed during resolution"
                                ))
                            })?;
                        match producer.subscribe() {
                            Ok(subscription) => subscription,
                            Err(e) => {
                                warn!(
                                    mediator = mediator.id(),
                                    channel = %incoming,
                                    error = %e,
                                    "producer already taken, leaving mediator unsatisfied"
                                );
                                continue;
                            }
                        }
                    }
                    None => {
                        return Err(MessagingError::AmbiguousWiring {
                            channel: incoming,
                            candidates,
                        });
                    }
                    Some(policy) => {
                        let lazy = Arc::clone(
                            self.lazy_sources
                                .entry((incoming.clone(), policy))
                                .or_insert_with(|| {
                                    Arc::new(LazySource::new(incoming.clone(), policy))
                                }),
                        );
                        match lazy.subscribe() {
                            Ok(subscription) => subscription,
                            Err(e) => {
                                warn!(
                                    mediator = mediator.id(),
                                    channel = %incoming,
                                    error = %e,
                                    "lazy source already taken, leaving mediator unsatisfied"
                                );
                                continue;
                            }
                        }
                    }
                };

                mediator.connect_to_upstream(subscription)?;
                if let Some(outgoing) = mediator.outgoing() {
                    self.registry
                        .register_producer(outgoing.clone(), mediator.producer()?);
                }
                debug!(mediator = mediator.id(), channel = %incoming, "mediator wired");
                connected_this_pass += 1;
            }

            if connected_this_pass == 0 {
                break;
            }
            passes += 1;
            if passes >= self.config.max_passes {
                warn!(passes, "stopping resolution at the configured pass bound");
                break;
            }
        }
        Ok(())
    }

    /// Step 6: hook externally injected consumers to whatever produces
    /// their channel, fanning out by cloning when more than one
    /// consumer registered. A mediator stream wins over the channel's
    /// emitter view; the emitter is only the fallback when nothing else
    /// produces the name. Returns the channels left without any
    /// producer.
    fn wire_injected_consumers(&self) -> Vec<ChannelName> {
        let mut orphaned = Vec::new();
        let mut channels = self.registry.consumer_channels();
        channels.sort();

        for channel in channels {
            let consumers = self.registry.consumers(&channel);
            if consumers.is_empty() {
                continue;
            }
            let producers = self.registry.producers(&channel);
            let emitter = self.registry.emitter(&channel);
            let is_emitter_view = |producer: &Arc<dyn Producer>| {
                emitter.as_ref().is_some_and(|e| {
                    std::ptr::eq(
                        Arc::as_ptr(producer) as *const u8,
                        Arc::as_ptr(e) as *const u8,
                    )
                })
            };
            let Some(producer) = producers
                .iter()
                .find(|p| !is_emitter_view(p))
                .or_else(|| producers.first())
            else {
                orphaned.push(channel);
                continue;
            };
            if producers.len() > 1 {
                warn!(
                    channel = %channel,
                    count = producers.len(),
                    "multiple producers for injected consumers, taking the first non-emitter"
                );
            }
            match producer.subscribe() {
                Ok(subscription) => {
                    debug!(channel = %channel, consumers = consumers.len(), "injected consumers wired");
                    Self::pump(channel.clone(), subscription, consumers);
                }
                Err(e) => {
                    warn!(
                        channel = %channel,
                        error = %e,
                        "producer unavailable for injected consumers"
                    );
                    orphaned.push(channel);
                }
            }
        }
        orphaned
    }

    /// Drive one channel's producer into its injected consumers on a
    /// spawned task, one credit per item.
    fn pump(channel: ChannelName, subscription: Subscription, consumers: Vec<Arc<dyn Consumer>>) {
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
                        if let Some((last, rest)) = consumers.split_last() {
                            for consumer in rest {
                                if let Err(e) = consumer.accept(message.clone()).await {
                                    warn!(channel = %channel, error = %e, "consumer failed, dropping message");
                                }
                            }
                            if let Err(e) = last.accept(message).await {
                                warn!(channel = %channel, error = %e, "consumer failed, dropping message");
                            }
                        }
                    }
                    None => {
                        for consumer in &consumers {
                            consumer.complete().await;
                        }
                        debug!(channel = %channel, "channel completed");
                        break;
                    }
                }
            }
        });
    }

    /// Step 7: report anything still unresolved, fatally or not
    /// depending on the configured mode. Each unresolved mediator is
    /// listed with the channel it wanted; orphaned injected consumers
    /// and emitters nothing attached to count as unresolved too.
    fn enforce_unresolved_policy(&self, orphaned: Vec<ChannelName>) -> MessagingResult<()> {
        let mut unresolved: Vec<String> = self
            .mediators
            .iter()
            .filter(|m| !m.is_connected())
            .map(|m| match m.incoming() {
                Some(channel) => format!("{} -> {channel}", m.id()),
                None => m.id().to_string(),
            })
            .collect();
        unresolved.extend(orphaned.iter().map(|c| format!("injected-consumer:{c}")));
        for channel in &self.emitter_channels {
            let unattached = self
                .registry
                .emitter(channel)
                .map_or(true, |e| !e.is_attached());
            if unattached {
                unresolved.push(format!("emitter:{channel}"));
            }
        }
        if unresolved.is_empty() {
            return Ok(());
        }

        // Fold the mediator-declared incoming channels into the
        // inventory; the registry only knows about injected consumers.
        let mut inventory = self.registry.inventory();
        for mediator in &self.mediators {
            if let Some(channel) = mediator.incoming() {
                if !inventory.subscribers.contains(channel) {
                    inventory.subscribers.push(channel.clone());
                }
            }
        }
        inventory.subscribers.sort();
        match self.config.mode {
            WiringMode::Strict => Err(MessagingError::UnresolvedWiring {
                mediators: unresolved,
                inventory,
            }),
            WiringMode::Lenient => {
                warn!(
                    unresolved = ?unresolved,
                    inventory = %inventory,
                    "continuing with a partially wired graph"
                );
                Ok(())
            }
        }
    }
}

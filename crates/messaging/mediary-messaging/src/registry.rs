//! The per-deployment channel directory.

use crate::emitter::EmitterImpl;
use crate::stream::{Consumer, Producer};
use crate::types::{ChannelInventory, ChannelName};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps channel names to the producers, injected consumers, and
/// emitters registered under them.
///
/// One registry is scoped to one deployment and handed to the manager
/// at construction. All methods take `&self`; interior locking keeps
/// registration safe from any task.
#[derive(Default)]
pub struct ChannelRegistry {
    producers: RwLock<HashMap<ChannelName, Vec<Arc<dyn Producer>>>>,
    consumers: RwLock<HashMap<ChannelName, Vec<Arc<dyn Consumer>>>>,
    emitters: RwLock<HashMap<ChannelName, Arc<EmitterImpl>>>,
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer for a channel. Multiple producers may stack
    /// under one name; the consumer's merge policy decides what that
    /// means at resolution time.
    pub fn register_producer(&self, channel: ChannelName, producer: Arc<dyn Producer>) {
        debug!(channel = %channel, "registering producer");
        self.producers.write().entry(channel).or_default().push(producer);
    }

    /// Register an externally injected consumer for a channel.
    pub fn register_consumer(&self, channel: ChannelName, consumer: Arc<dyn Consumer>) {
        debug!(channel = %channel, "registering consumer");
        self.consumers.write().entry(channel).or_default().push(consumer);
    }

    /// Register an emitter for a channel. The first registration wins;
    /// a duplicate is dropped with a warning.
    pub fn register_emitter(&self, emitter: Arc<EmitterImpl>) -> Arc<EmitterImpl> {
        let mut emitters = self.emitters.write();
        match emitters.get(emitter.channel()) {
            Some(existing) => {
                warn!(
                    channel = %emitter.channel(),
                    "duplicate emitter registration ignored, keeping the first"
                );
                Arc::clone(existing)
            }
            None => {
                debug!(channel = %emitter.channel(), "registering emitter");
                emitters.insert(emitter.channel().clone(), Arc::clone(&emitter));
                emitter
            }
        }
    }

    /// All producers registered for a channel, in registration order.
    pub fn producers(&self, channel: &ChannelName) -> Vec<Arc<dyn Producer>> {
        self.producers.read().get(channel).cloned().unwrap_or_default()
    }

    /// How many producers a channel has.
    pub fn producer_count(&self, channel: &ChannelName) -> usize {
        self.producers.read().get(channel).map_or(0, Vec::len)
    }

    /// All injected consumers for a channel, in registration order.
    pub fn consumers(&self, channel: &ChannelName) -> Vec<Arc<dyn Consumer>> {
        self.consumers.read().get(channel).cloned().unwrap_or_default()
    }

    /// Every channel that has at least one injected consumer.
    pub fn consumer_channels(&self) -> Vec<ChannelName> {
        self.consumers.read().keys().cloned().collect()
    }

    /// The emitter registered for a channel, if any.
    pub fn emitter(&self, channel: &ChannelName) -> Option<Arc<EmitterImpl>> {
        self.emitters.read().get(channel).cloned()
    }

    /// Snapshot every known channel name, grouped by role and sorted
    /// for stable diagnostics.
    pub fn inventory(&self) -> ChannelInventory {
        let mut publishers: Vec<_> = self.producers.read().keys().cloned().collect();
        let mut subscribers: Vec<_> = self.consumers.read().keys().cloned().collect();
        let mut emitters: Vec<_> = self.emitters.read().keys().cloned().collect();
        publishers.sort();
        subscribers.sort();
        emitters.sort();
        ChannelInventory {
            publishers,
            subscribers,
            emitters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::CollectingConsumer;
    use crate::stream_producer::StreamProducer;
    use crate::types::Message;
    use serde_json::json;

    fn name(s: &str) -> ChannelName {
        ChannelName::new(s).unwrap()
    }

    #[test]
    fn test_producers_stack_in_order() {
        let registry = ChannelRegistry::new();
        let channel = name("orders");
        registry.register_producer(
            channel.clone(),
            Arc::new(StreamProducer::from_items("p1", vec![Message::new(json!(1))])),
        );
        registry.register_producer(
            channel.clone(),
            Arc::new(StreamProducer::from_items("p2", vec![Message::new(json!(2))])),
        );
        assert_eq!(registry.producer_count(&channel), 2);
        assert_eq!(registry.producers(&channel).len(), 2);
        assert_eq!(registry.producer_count(&name("other")), 0);
    }

    #[test]
    fn test_first_emitter_registration_wins() {
        let registry = ChannelRegistry::new();
        let first = registry.register_emitter(Arc::new(EmitterImpl::new(name("events"))));
        let second = registry.register_emitter(Arc::new(EmitterImpl::new(name("events"))));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(
            &first,
            &registry.emitter(&name("events")).unwrap()
        ));
    }

    #[test]
    fn test_inventory_sorted() {
        let registry = ChannelRegistry::new();
        registry.register_producer(
            name("zeta"),
            Arc::new(StreamProducer::from_items("z", Vec::<Message>::new())),
        );
        registry.register_producer(
            name("alpha"),
            Arc::new(StreamProducer::from_items("a", Vec::<Message>::new())),
        );
        registry.register_consumer(name("mid"), Arc::new(CollectingConsumer::new()));

        let inventory = registry.inventory();
        assert_eq!(inventory.publishers, vec![name("alpha"), name("zeta")]);
        assert_eq!(inventory.subscribers, vec![name("mid")]);
        assert!(inventory.emitters.is_empty());
    }
}

//! # Mediary Messaging
//!
//! A reactive channel-wiring engine. Application components declare
//! the channels they consume and produce; this crate discovers those
//! declarations through a pluggable collaborator, builds a mediator per
//! declaration, and iteratively connects the whole graph to a fixed
//! point, applying merge policies where several producers feed one
//! channel.
//!
//! ## Features
//!
//! - **Channel registry**: a per-deployment directory of producers,
//!   injected consumers, and emitters by channel name
//! - **Fixed-point resolution**: repeated connection passes until no
//!   further progress, so discovery order never matters
//! - **Merge policies**: ONE, MERGE, and CONCAT fan-in over multiple
//!   producers of one channel
//! - **Emitters**: demand-gated manual publishers for programmatic
//!   injection into a channel
//! - **Strict/lenient wiring**: unresolved graphs either fail the
//!   deployment or run partially wired, by configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediary_messaging::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> MessagingResult<()> {
//! let registry = Arc::new(ChannelRegistry::new());
//! let mut manager = MediatorManager::new(Arc::clone(&registry), WiringConfig::strict());
//! let discovery = StaticDiscovery::new();
//! manager.initialize_and_run(&discovery).await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod configuration;
pub mod emitter;
pub mod lazy_source;
pub mod manager;
pub mod mediator;
pub mod registry;
pub mod stream;
pub mod stream_producer;
pub mod types;

// Re-export commonly used items
pub use configuration::{
    Component, ComponentProvider, MediatorConfiguration, MediatorDiscovery, StaticDiscovery,
    StaticProvider,
};
pub use emitter::EmitterImpl;
pub use lazy_source::LazySource;
pub use manager::{MediatorManager, WiringConfig, WiringMode};
pub use mediator::Mediator;
pub use registry::ChannelRegistry;
pub use stream::{
    CollectingConsumer, Consumer, Demand, FunctionConsumer, MessageStream, Producer, Subscription,
};
pub use stream_producer::StreamProducer;
pub use types::{
    ChannelInventory, ChannelName, Message, MergePolicy, MessagingError, MessagingResult, Shape,
};

// Re-export for implementing the async traits
pub use async_trait::async_trait;

/// Convenient imports for embedding the engine.
pub mod prelude {
    pub use crate::configuration::{
        Component, ComponentProvider, MediatorConfiguration, MediatorDiscovery, StaticDiscovery,
        StaticProvider,
    };
    pub use crate::emitter::EmitterImpl;
    pub use crate::manager::{MediatorManager, WiringConfig, WiringMode};
    pub use crate::registry::ChannelRegistry;
    pub use crate::stream::{CollectingConsumer, Consumer, FunctionConsumer, Producer};
    pub use crate::types::{
        ChannelName, Message, MergePolicy, MessagingError, MessagingResult, Shape,
    };
    pub use async_trait::async_trait;
}

/// Version information for the Mediary Messaging library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the Mediary Messaging library
pub const NAME: &str = env!("CARGO_PKG_NAME");

impl From<types::MessagingError> for mediary_core::MediaryError {
    fn from(err: types::MessagingError) -> Self {
        use mediary_core::MediaryError;
        use types::MessagingError as E;
        match err {
            E::AmbiguousWiring { .. } | E::UnresolvedWiring { .. } => {
                MediaryError::application(err.to_string(), "channel wiring")
            }
            E::IllegalState(msg) => MediaryError::IllegalState(msg),
            E::InvalidInput(msg) => MediaryError::InvalidInput(msg),
            E::Configuration(msg) => MediaryError::Configuration(msg),
            E::ComponentUnavailable(msg) => MediaryError::NotFound(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediary_core::MediaryError;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "mediary-messaging");
    }

    #[test]
    fn test_error_bridge() {
        let err: MediaryError = types::MessagingError::IllegalState("stopped".to_string()).into();
        assert!(matches!(err, MediaryError::IllegalState(_)));

        let err: MediaryError = types::MessagingError::AmbiguousWiring {
            channel: ChannelName::new("b").unwrap(),
            candidates: 2,
        }
        .into();
        assert!(matches!(err, MediaryError::Application { .. }));
    }
}

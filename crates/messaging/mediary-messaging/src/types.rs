//! Core types for the Mediary messaging crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The name of a logical channel.
///
/// Channel names tie producers to consumers. Two components naming the
/// same channel are wired together during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a channel name. The empty string is rejected.
    pub fn new(name: impl Into<String>) -> MessagingResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(MessagingError::InvalidInput(
                "channel name cannot be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for ChannelName {
    type Error = MessagingError;

    fn try_from(value: &str) -> MessagingResult<Self> {
        Self::new(value)
    }
}

/// The shape of a mediator, derived from which channels it declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// Produces an outgoing channel, consumes nothing.
    Publisher,
    /// Consumes incoming channels and produces an outgoing channel.
    Processor,
    /// Consumes incoming channels, produces nothing.
    Subscriber,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Publisher => write!(f, "publisher"),
            Shape::Processor => write!(f, "processor"),
            Shape::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// How multiple producers feeding one mediator are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Take the first producer, warn if more are present.
    #[default]
    One,
    /// Interleave all producers as items arrive. Per-source order is
    /// kept; no order holds across sources.
    Merge,
    /// Drain each producer to completion in registration order.
    Concat,
}

impl FromStr for MergePolicy {
    type Err = MessagingError;

    fn from_str(s: &str) -> MessagingResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "one" => Ok(MergePolicy::One),
            "merge" => Ok(MergePolicy::Merge),
            "concat" => Ok(MergePolicy::Concat),
            other => Err(MessagingError::Configuration(format!(
                "unknown merge policy '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::One => write!(f, "one"),
            MergePolicy::Merge => write!(f, "merge"),
            MergePolicy::Concat => write!(f, "concat"),
        }
    }
}

/// The item flowing through channels: a JSON payload plus string metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The payload body.
    pub payload: serde_json::Value,
    /// Free-form metadata attached by producers or mediators.
    pub metadata: HashMap<String, String>,
}

impl Message {
    /// Create a message with no metadata.
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry, consuming and returning the message.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl From<serde_json::Value> for Message {
    fn from(payload: serde_json::Value) -> Self {
        Self::new(payload)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::new(serde_json::Value::String(s.to_string()))
    }
}

impl From<i64> for Message {
    fn from(n: i64) -> Self {
        Self::new(serde_json::Value::from(n))
    }
}

/// A snapshot of every channel name the registry knows about, grouped
/// by role. Attached to unresolved-wiring errors so operators can see
/// what was available when wiring failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInventory {
    /// Channels with at least one registered producer.
    pub publishers: Vec<ChannelName>,
    /// Channels with at least one injected consumer.
    pub subscribers: Vec<ChannelName>,
    /// Channels backed by a registered emitter.
    pub emitters: Vec<ChannelName>,
}

impl fmt::Display for ChannelInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(names: &[ChannelName]) -> String {
            names
                .iter()
                .map(ChannelName::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        }
        write!(
            f,
            "publishers=[{}] subscribers=[{}] emitters=[{}]",
            join(&self.publishers),
            join(&self.subscribers),
            join(&self.emitters)
        )
    }
}

/// Errors raised by the messaging crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessagingError {
    /// More than one producer feeds a channel whose consumer expects
    /// exactly one upstream.
    #[error("ambiguous wiring for channel '{channel}': {candidates} producers found")]
    AmbiguousWiring {
        /// The contested channel.
        channel: ChannelName,
        /// How many producers were registered for it.
        candidates: usize,
    },

    /// Resolution finished without satisfying every component.
    #[error("unresolved wiring for mediators [{}]; known channels: {inventory}", .mediators.join(", "))]
    UnresolvedWiring {
        /// Identifiers of the mediators left unsatisfied.
        mediators: Vec<String>,
        /// Everything the registry knew when resolution stopped.
        inventory: ChannelInventory,
    },

    /// An operation was attempted in a state that does not permit it.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Invalid input parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A component provider failed to produce its component.
    #[error("component unavailable: {0}")]
    ComponentUnavailable(String),
}

/// Result type alias for messaging operations.
pub type MessagingResult<T> = Result<T, MessagingError>;

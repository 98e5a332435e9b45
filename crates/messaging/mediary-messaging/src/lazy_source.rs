//! Deferred, merging channel sources.
//!
//! A [`LazySource`] stands in for a channel whose producer list is not
//! final yet. Consumers connect to it during the resolution loop; once
//! the loop stabilizes, [`configure`](LazySource::configure) queries the
//! registry for the final producer list and installs the real merged
//! stream. A subscription taken earlier resolves on its first poll.

use crate::registry::ChannelRegistry;
use crate::stream::{Demand, MessageStream, Producer, Subscription};
use crate::types::{ChannelName, MergePolicy, MessagingError, MessagingResult};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A placeholder producer for a channel, resolved after the fixed-point
/// loop by applying a merge policy to the final producer list.
pub struct LazySource {
    channel: ChannelName,
    policy: MergePolicy,
    sender: Mutex<Option<oneshot::Sender<MessageStream>>>,
    receiver: Mutex<Option<oneshot::Receiver<MessageStream>>>,
    configured: AtomicBool,
    demand: Demand,
}

impl LazySource {
    /// Create an unconfigured source for a channel and policy.
    pub fn new(channel: ChannelName, policy: MergePolicy) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            channel,
            policy,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            configured: AtomicBool::new(false),
            demand: Demand::new(),
        }
    }

    /// The channel this source stands in for.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// The declared merge policy.
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Whether the real stream has been installed.
    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    /// Resolve against the registry's final producer list and install
    /// the merged stream. Called exactly once, after the resolution
    /// loop; a second call is a state error.
    pub fn configure(&self, registry: &ChannelRegistry) -> MessagingResult<()> {
        self.configured
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                MessagingError::IllegalState(format!(
                    "lazy source for '{}' is already configured",
                    self.channel
                ))
            })?;

        let producers = registry.producers(&self.channel);
        debug!(
            channel = %self.channel,
            policy = %self.policy,
            count = producers.len(),
            "configuring lazy source"
        );

        let mut subscriptions = Vec::with_capacity(producers.len());
        match self.policy {
            MergePolicy::One => {
                if producers.len() > 1 {
                    warn!(
                        channel = %self.channel,
                        count = producers.len(),
                        "merge policy ONE with multiple producers, taking the first in registration order"
                    );
                }
                if let Some(first) = producers.first() {
                    subscriptions.push(first.subscribe()?);
                }
            }
            MergePolicy::Merge | MergePolicy::Concat => {
                for producer in &producers {
                    subscriptions.push(producer.subscribe()?);
                }
            }
        }

        if subscriptions.is_empty() {
            warn!(channel = %self.channel, "lazy source configured with no producers");
        }
        for subscription in &subscriptions {
            self.demand.link(subscription.demand.clone());
        }

        let merged: MessageStream = match self.policy {
            MergePolicy::One => subscriptions
                .pop()
                .map(|s| s.stream)
                .unwrap_or_else(|| Box::pin(stream::empty())),
            MergePolicy::Merge => Box::pin(stream::select_all(
                subscriptions.into_iter().map(|s| s.stream),
            )),
            MergePolicy::Concat => subscriptions.into_iter().fold(
                Box::pin(stream::empty()) as MessageStream,
                |acc, s| Box::pin(acc.chain(s.stream)),
            ),
        };

        // A dropped receiver just means nobody subscribed; fine.
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(merged);
        }
        Ok(())
    }
}

impl Producer for LazySource {
    /// Take the source's stream. Valid before `configure`; the stream's
    /// first poll waits until configuration installs the delegate.
    fn subscribe(&self) -> MessagingResult<Subscription> {
        let rx = self.receiver.lock().take().ok_or_else(|| {
            MessagingError::IllegalState(format!(
                "lazy source for '{}' has already been consumed",
                self.channel
            ))
        })?;

        let channel = self.channel.clone();
        let stream = stream::once(async move {
            match rx.await {
                Ok(delegate) => delegate,
                // Source dropped unconfigured; nothing will ever flow.
                Err(_) => {
                    warn!(channel = %channel, "lazy source dropped before configuration");
                    Box::pin(stream::empty()) as MessageStream
                }
            }
        })
        .flatten();

        Ok(Subscription::with_demand(
            Box::pin(stream),
            self.demand.clone(),
        ))
    }
}

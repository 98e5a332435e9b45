//! Manual, demand-gated message emission.

use crate::stream::{reject_null, Demand, Producer, Subscription};
use crate::types::{ChannelName, Message, MessagingError, MessagingResult};
use futures::stream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error};

const STATE_ACTIVE: u8 = 0;
const STATE_COMPLETED: u8 = 1;
const STATE_FAILED: u8 = 2;

/// A push-based producer driven by imperative `send` calls.
///
/// An emitter accepts at most one subscriber, enforced with an atomic
/// compare-and-swap so concurrent subscribe races have exactly one
/// winner. Each `send` claims one credit of downstream demand; the
/// caller sees an error when the subscriber has not requested capacity.
pub struct EmitterImpl {
    channel: ChannelName,
    sender: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    attached: AtomicBool,
    state: AtomicU8,
    demand: Demand,
}

impl EmitterImpl {
    /// Create an emitter for the named channel.
    pub fn new(channel: ChannelName) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            channel,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            attached: AtomicBool::new(false),
            state: AtomicU8::new(STATE_ACTIVE),
            demand: Demand::new(),
        }
    }

    /// The channel this emitter feeds.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Whether a subscriber has attached.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Whether `complete` or `fail` has been called.
    pub fn is_terminated(&self) -> bool {
        self.state.load(Ordering::Acquire) != STATE_ACTIVE
    }

    /// Whether a `send` would currently be accepted: attached, not
    /// cancelled, and demand outstanding. Not atomic with `send`, which
    /// re-validates; a race between the two is expected and tolerated.
    pub fn is_requested(&self) -> bool {
        self.is_attached() && !self.demand.is_cancelled() && self.demand.credits() > 0
    }

    /// Emit one item downstream.
    ///
    /// Fails when the payload is null, no subscriber is attached, the
    /// subscriber cancelled, the emitter is terminated, or no demand
    /// credits are outstanding.
    pub fn send(&self, item: impl Into<Message>) -> MessagingResult<()> {
        let message = item.into();
        reject_null(&message)?;

        if self.is_terminated() {
            return Err(MessagingError::IllegalState(format!(
                "emitter '{}' is terminated",
                self.channel
            )));
        }
        if !self.is_attached() {
            return Err(MessagingError::IllegalState(format!(
                "emitter '{}' has no subscriber",
                self.channel
            )));
        }
        if self.demand.is_cancelled() {
            return Err(MessagingError::IllegalState(format!(
                "subscription on emitter '{}' was cancelled",
                self.channel
            )));
        }
        if !self.demand.try_claim() {
            return Err(MessagingError::IllegalState(format!(
                "emitter '{}' has no outstanding demand",
                self.channel
            )));
        }

        let guard = self.sender.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(message).map_err(|_| {
                MessagingError::IllegalState(format!(
                    "subscriber on emitter '{}' is gone",
                    self.channel
                ))
            }),
            None => Err(MessagingError::IllegalState(format!(
                "emitter '{}' is closed",
                self.channel
            ))),
        }
    }

    /// Signal normal completion. The downstream stream ends once the
    /// buffered items drain. Fails while no subscriber is attached; a
    /// second terminal call is a state error.
    pub fn complete(&self) -> MessagingResult<()> {
        self.require_attached()?;
        self.transition(STATE_COMPLETED)?;
        debug!(channel = %self.channel, "emitter completed");
        self.sender.lock().take();
        Ok(())
    }

    /// Signal abnormal termination. The error is logged and the
    /// downstream stream ends. Fails while no subscriber is attached; a
    /// second terminal call is a state error.
    pub fn fail(&self, cause: impl std::fmt::Display) -> MessagingResult<()> {
        self.require_attached()?;
        self.transition(STATE_FAILED)?;
        error!(channel = %self.channel, cause = %cause, "emitter failed");
        self.sender.lock().take();
        Ok(())
    }

    fn require_attached(&self) -> MessagingResult<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(MessagingError::IllegalState(format!(
                "emitter '{}' has no subscriber",
                self.channel
            )))
        }
    }

    fn transition(&self, target: u8) -> MessagingResult<()> {
        self.state
            .compare_exchange(STATE_ACTIVE, target, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| {
                MessagingError::IllegalState(format!(
                    "emitter '{}' is already terminated",
                    self.channel
                ))
            })
    }
}

impl Producer for EmitterImpl {
    fn subscribe(&self) -> MessagingResult<Subscription> {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                MessagingError::IllegalState(format!(
                    "emitter '{}' already has a subscriber",
                    self.channel
                ))
            })?;

        // The CAS above guarantees the slot is still populated here.
        let rx = self.receiver.lock().take().ok_or_else(|| {
            MessagingError::IllegalState(format!(
                "emitter '{}' lost its receiver",
                self.channel
            ))
        })?;

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        debug!(channel = %self.channel, "subscriber attached to emitter");
        Ok(Subscription::with_demand(
            Box::pin(stream),
            self.demand.clone(),
        ))
    }
}

//! Event source: the channel feeding a transducer.
//!
//! A [`Proxy`] owns the channel and can stop the run. An [`Input`] is the
//! send-only view of the same channel. Hand out `Input`s to code that must
//! not be able to end the transducer.
//!
//! Two send flavours exist on both handles:
//!
//! - [`send`](Input::send) enqueues without waiting. It fails with
//!   [`SendError::BufferOverflow`] when the buffer is full.
//! - [`send_await`](Input::send_await) waits for buffer space and then for
//!   the loop to finish processing the event, including every output it
//!   produced. It never overflows.
//!
//! Both fail with [`SendError::Terminated`] once the loop has exited. A
//! send never drops an event silently.

use crate::config::{Config, DEFAULT_BUFFER_CAPACITY};
use crate::error::{ConfigError, SendError};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// An event travelling through the channel, with an optional
/// acknowledgement for suspending senders.
pub(crate) struct Envelope<E> {
    pub(crate) event: E,
    pub(crate) ack: Option<oneshot::Sender<()>>,
}

/// Tell a suspending sender its event has been processed.
pub(crate) fn acknowledge(ack: Option<oneshot::Sender<()>>) {
    if let Some(ack) = ack {
        // The sender may have given up waiting.
        let _ = ack.send(());
    }
}

/// Send-only capability for a transducer's channel.
pub struct Input<E> {
    tx: mpsc::Sender<Envelope<E>>,
}

impl<E> Clone for Input<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> std::fmt::Debug for Input<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("terminated", &self.tx.is_closed())
            .field("capacity", &self.tx.capacity())
            .finish()
    }
}

impl<E> Input<E> {
    /// Whether the owning loop has exited.
    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<E: Send> Input<E> {
    /// Enqueue an event without waiting.
    pub fn send(&self, event: E) -> Result<(), SendError> {
        self.tx
            .try_send(Envelope { event, ack: None })
            .map_err(|err| match err {
                TrySendError::Full(_) => SendError::BufferOverflow,
                TrySendError::Closed(_) => SendError::Terminated,
            })
    }

    /// Enqueue an event and wait until the loop has processed it.
    pub async fn send_await(&self, event: E) -> Result<(), SendError> {
        let (ack, processed) = oneshot::channel();
        self.tx
            .send(Envelope {
                event,
                ack: Some(ack),
            })
            .await
            .map_err(|_| SendError::Terminated)?;
        processed.await.map_err(|_| SendError::Terminated)
    }
}

/// How a run was asked to stop from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    Cancelled,
    Terminated,
}

/// Stop request shared between a proxy and the loop draining it.
#[derive(Default)]
pub(crate) struct Control {
    token: CancellationToken,
    reason: OnceLock<StopReason>,
}

impl Control {
    fn stop(&self, reason: StopReason) {
        // First request wins.
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub(crate) async fn stopped(&self) -> StopReason {
        self.token.cancelled().await;
        self.reason.get().copied().unwrap_or(StopReason::Cancelled)
    }
}

/// Full-capability handle to a transducer's channel.
///
/// Clones share the same channel. A proxy serves exactly one run; after
/// that run exits every send fails with [`SendError::Terminated`].
pub struct Proxy<E> {
    input: Input<E>,
    inbox: Arc<Mutex<Option<mpsc::Receiver<Envelope<E>>>>>,
    control: Arc<Control>,
}

impl<E> Clone for Proxy<E> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            inbox: self.inbox.clone(),
            control: self.control.clone(),
        }
    }
}

impl<E> std::fmt::Debug for Proxy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("input", &self.input)
            .field("stop_requested", &self.control.token.is_cancelled())
            .finish()
    }
}

impl<E> Default for Proxy<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Proxy<E> {
    /// A proxy buffering up to [`DEFAULT_BUFFER_CAPACITY`] events.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// A proxy buffering up to `capacity` events. Zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            input: Input { tx },
            inbox: Arc::new(Mutex::new(Some(rx))),
            control: Arc::new(Control::default()),
        }
    }

    pub fn with_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_capacity(config.buffer_capacity))
    }

    /// The send-only view of this proxy.
    pub fn input(&self) -> Input<E> {
        self.input.clone()
    }

    /// Ask the running loop to stop. The run reports
    /// [`RunError::Cancelled`](crate::RunError::Cancelled).
    pub fn cancel(&self) {
        self.control.stop(StopReason::Cancelled);
    }

    /// End the run without a terminal state. The run reports its last
    /// output as a normal result.
    pub fn terminate(&self) {
        self.control.stop(StopReason::Terminated);
    }

    pub fn is_terminated(&self) -> bool {
        self.input.is_terminated()
    }

    pub(crate) fn take_inbox(&self) -> Option<mpsc::Receiver<Envelope<E>>> {
        match self.inbox.lock() {
            Ok(mut inbox) => inbox.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub(crate) fn control(&self) -> Arc<Control> {
        self.control.clone()
    }
}

impl<E: Send> Proxy<E> {
    pub fn send(&self, event: E) -> Result<(), SendError> {
        self.input.send(event)
    }

    pub async fn send_await(&self, event: E) -> Result<(), SendError> {
        self.input.send_await(event).await
    }
}

//! Generic retry engine.
//!
//! A [`MessageProcessor`] hands one [`Attempt`] to its subscribed handlers
//! and turns their verdicts into an outcome for the transport: done,
//! redeliver later, or dropped. Dropped messages are reported on the error
//! channel as a `ControlMessage` of type `Error`.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use tracing::{debug, error, trace, warn};

use crate::{
    Result, ShareLock,
    events::{ControlMessage, Message},
    runtime::MessageSender,
};

/// What a handler decided about a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerVerdict {
    /// Handled; no other handler should see this message.
    Complete,
    /// Handled; pass the message on to the remaining handlers.
    Continue,
    /// Can not make progress now; redeliver later.
    Yield,
}

/// Handles one message type. Must be idempotent: the transport may deliver
/// the same message more than once.
///
/// Returning `Err` is equivalent to [`HandlerVerdict::Yield`], with the
/// error kept as the reason if the message is eventually dropped.
#[async_trait]
pub trait MessageHandler<T: Message>: Send + Sync {
    async fn handle(
        &self,
        message: &T,
    ) -> Result<HandlerVerdict>;
}

/// A message together with its delivery count. The first delivery is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt<T> {
    pub message: T,
    pub count: u32,
}

impl<T> Attempt<T> {
    pub fn new(message: T) -> Self {
        Self {
            message,
            count: 1,
        }
    }

    fn next(self) -> Self {
        Self {
            message: self.message,
            count: self.count + 1,
        }
    }
}

/// Result of one [`MessageProcessor::process`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome<T> {
    /// No further delivery needed.
    Completed,
    /// Deliver `attempt` again to the same processor after `delay`.
    Redeliver {
        attempt: Attempt<T>,
        delay: Duration,
    },
    /// The attempt limit was reached and the message was discarded.
    Dropped,
}

pub struct MessageProcessor<T: Message> {
    name: String,
    handlers: ShareLock<Vec<Arc<dyn MessageHandler<T>>>>,
    error_sender: Arc<dyn MessageSender<ControlMessage>>,
    max_attempt_count: u32,
    retry_interval: Duration,
}

impl<T: Message> MessageProcessor<T> {
    pub fn new(
        name: &str,
        error_sender: Arc<dyn MessageSender<ControlMessage>>,
        max_attempt_count: u32,
        retry_interval: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            handlers: Arc::new(RwLock::new(Vec::new())),
            error_sender,
            max_attempt_count: max_attempt_count.max(1),
            retry_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(
        &self,
        handler: Arc<dyn MessageHandler<T>>,
    ) {
        self.handlers.write().unwrap().push(handler);
    }

    /// Removes a previously subscribed handler. Returns false when it was not subscribed.
    pub fn unsubscribe(
        &self,
        handler: &Arc<dyn MessageHandler<T>>,
    ) -> bool {
        let mut handlers = self.handlers.write().unwrap();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    /// Runs one delivery cycle of `attempt`.
    pub async fn process(
        &self,
        attempt: Attempt<T>,
    ) -> ProcessOutcome<T> {
        // snapshot so handlers can (un)subscribe while we dispatch
        let handlers = self.handlers.read().unwrap().clone();
        if handlers.is_empty() {
            warn!("{} processor has no handler for message {}", self.name, attempt.message.id());
            return ProcessOutcome::Completed;
        }

        let mut reason = None;
        for handler in handlers.iter() {
            match handler.handle(&attempt.message).await {
                Ok(HandlerVerdict::Complete) => return ProcessOutcome::Completed,
                Ok(HandlerVerdict::Continue) => continue,
                Ok(HandlerVerdict::Yield) => {
                    reason = Some("handler yielded".to_string());
                    break;
                }
                Err(e) => {
                    debug!("{} handler failed on message {}: {}", self.name, attempt.message.id(), e);
                    reason = Some(e.to_string());
                    break;
                }
            }
        }

        let Some(reason) = reason else {
            return ProcessOutcome::Completed;
        };

        if attempt.count < self.max_attempt_count {
            trace!(
                "{} message {} yielded on attempt {}/{}, redelivering in {:?}",
                self.name,
                attempt.message.id(),
                attempt.count,
                self.max_attempt_count,
                self.retry_interval
            );
            return ProcessOutcome::Redeliver {
                attempt: attempt.next(),
                delay: self.retry_interval,
            };
        }

        warn!("{} message {} dropped after {} attempts: {}", self.name, attempt.message.id(), attempt.count, reason);
        self.report_dropped(&attempt.message, &reason).await;
        ProcessOutcome::Dropped
    }

    /// Sends the error report of a message that will not be delivered again.
    /// Error reports themselves are only logged.
    pub async fn report_dropped(
        &self,
        message: &T,
        reason: &str,
    ) {
        match message.delivery_failure(reason) {
            Some(report) => {
                if let Err(e) = self.error_sender.send(report).await {
                    error!("{} processor could not report dropped message {}: {}", self.name, message.id(), e);
                }
            }
            None => error!("{} error report {} was dropped: {}", self.name, message.id(), reason),
        }
    }
}

//! In-process transport.
//!
//! Every send fans out into one delivery per processor subscribed at send
//! time. A fixed pool of worker tasks drains the delivery queue; delayed
//! deliveries wait on a timer task, never on a worker.

use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use crate::{
    EvflowError, Result, ShareLock,
    common::{Queue, Shutdown},
    events::Message,
    runtime::{Attempt, MessageProcessor, MessageSender, ProcessOutcome},
};

struct Delivery<T: Message> {
    processor: Arc<MessageProcessor<T>>,
    attempt: Attempt<T>,
}

pub struct MessageQueue<T: Message> {
    name: String,
    deliveries: Arc<Queue<Delivery<T>>>,
    processors: ShareLock<Vec<Arc<MessageProcessor<T>>>>,
    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl<T: Message> MessageQueue<T> {
    pub fn new(
        name: &str,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            deliveries: Queue::unbounded(),
            processors: Arc::new(RwLock::new(Vec::new())),
            runtime,
            shutdown: Arc::new(Shutdown::new()),
        })
    }

    pub fn subscribe(
        &self,
        processor: Arc<MessageProcessor<T>>,
    ) {
        self.processors.write().unwrap().push(processor);
    }

    pub fn unsubscribe(
        &self,
        processor: &Arc<MessageProcessor<T>>,
    ) {
        self.processors.write().unwrap().retain(|p| !Arc::ptr_eq(p, processor));
    }

    /// Deliveries waiting for a worker, delayed ones excluded.
    pub fn pending(&self) -> usize {
        self.deliveries.len()
    }

    /// Spawns `workers` tasks draining the queue until shutdown.
    pub fn listen(
        self: &Arc<Self>,
        workers: usize,
    ) {
        for _ in 0..workers.max(1) {
            let queue = self.clone();
            let shutdown = self.shutdown.clone();
            self.runtime.spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        Some(delivery) = queue.deliveries.next_async() => queue.deliver(delivery).await,
                    }
                }
            });
        }
    }

    /// Stops the workers and pending timers and releases the processors.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
        self.processors.write().unwrap().clear();
    }

    async fn deliver(
        &self,
        delivery: Delivery<T>,
    ) {
        let Delivery {
            processor,
            attempt,
        } = delivery;
        let message = attempt.message.clone();
        let id = message.id().to_string();

        // a panicking handler must not take the worker down with it
        let outcome = match AssertUnwindSafe(processor.process(attempt)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("{} queue: processor {} panicked on message {}", self.name, processor.name(), id);
                processor.report_dropped(&message, &format!("{} processor panicked", processor.name())).await;
                return;
            }
        };

        if let ProcessOutcome::Redeliver {
            attempt,
            delay,
        } = outcome
        {
            if let Err(e) = self.enqueue(processor, attempt, delay) {
                warn!("{} queue: message {} could not be redelivered: {}", self.name, id, e);
            }
        }
    }

    fn enqueue(
        &self,
        processor: Arc<MessageProcessor<T>>,
        attempt: Attempt<T>,
        delay: Duration,
    ) -> Result<()> {
        if self.shutdown.is_terminated() {
            return Err(EvflowError::Queue(format!("{} queue is shut down", self.name)));
        }
        let delivery = Delivery {
            processor,
            attempt,
        };
        if delay.is_zero() {
            return self.deliveries.send(delivery);
        }

        let deliveries = self.deliveries.clone();
        let shutdown = self.shutdown.wait();
        let name = self.name.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = deliveries.send(delivery) {
                        warn!("{} queue: delayed delivery lost: {}", name, e);
                    }
                }
            }
        });
        Ok(())
    }
}

#[async_trait]
impl<T: Message> MessageSender<T> for MessageQueue<T> {
    async fn send_with_delay(
        &self,
        message: T,
        delay: Duration,
    ) -> Result<()> {
        let processors = self.processors.read().unwrap().clone();
        if processors.is_empty() {
            debug!("{} queue: no processor subscribed, message {} discarded", self.name, message.id());
            return Ok(());
        }
        for processor in processors {
            self.enqueue(processor, Attempt::new(message.clone()), delay)?;
        }
        Ok(())
    }
}

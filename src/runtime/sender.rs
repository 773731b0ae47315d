use std::time::Duration;

use async_trait::async_trait;

use crate::{Result, events::Message};

/// Fire-and-forget, at-least-once delivery of one message type to every
/// processor subscribed at send time.
#[async_trait]
pub trait MessageSender<T: Message>: Send + Sync {
    async fn send(
        &self,
        message: T,
    ) -> Result<()> {
        self.send_with_delay(message, Duration::ZERO).await
    }

    /// Delivers no earlier than `delay` from now.
    async fn send_with_delay(
        &self,
        message: T,
        delay: Duration,
    ) -> Result<()>;
}

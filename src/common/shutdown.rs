use tokio::sync::watch;

/// One-shot shutdown signal shared between a component and its tasks.
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
        }
    }

    /// Signals every waiter. Calling it more than once is harmless.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`Shutdown::shutdown`] has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            let _ = receiver.wait_for(|terminated| *terminated).await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Shutdown;

    #[tokio::test]
    async fn test_wait_resolves_after_shutdown() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.wait();
        assert!(!shutdown.is_terminated());

        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap();
        assert!(shutdown.is_terminated());
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait()).await.unwrap();
    }
}

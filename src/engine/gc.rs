use std::{sync::Arc, time::Duration};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::{common::Shutdown, store::Store};

/// Periodic sweep of expired entities.
pub struct Gc {
    store: Store,
    interval: Duration,

    runtime: Handle,
    shutdown: Arc<Shutdown>,
}

impl Gc {
    pub fn new(
        store: Store,
        interval: Duration,
        runtime: Handle,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            store,
            interval,
            runtime,
            shutdown,
        }
    }

    pub fn start(&self) {
        if self.interval.is_zero() {
            return;
        }

        let store = self.store.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.interval;
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = ticker.tick() => {
                        match store.purge_expired().await {
                            Ok(0) => {}
                            Ok(n) => debug!("gc purged {} expired entities", n),
                            Err(e) => warn!("gc failed: {}", e),
                        }
                    }
                }
            }
        });
    }
}

//! User activity contract.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{Result, ShareLock, events::Event, workflow::ActivityContext};

/// Events produced by one successful activity invocation.
#[derive(Debug, Clone, Default)]
pub struct ActivityOutput {
    pub events: Vec<Event>,
}

impl ActivityOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(
        mut self,
        event: Event,
    ) -> Self {
        self.events.push(event);
        self
    }
}

impl From<Vec<Event>> for ActivityOutput {
    fn from(events: Vec<Event>) -> Self {
        Self {
            events,
        }
    }
}

/// A unit of user work.
///
/// An invocation may be repeated when its message is redelivered, so
/// activities should tolerate running more than once. Returning `Err` or
/// panicking fails the activity; neither takes a worker down.
#[async_trait]
pub trait Activity: Send + Sync {
    async fn run(
        &self,
        ctx: Arc<ActivityContext>,
    ) -> Result<ActivityOutput>;
}

/// Resolves the activity implementation for a name.
pub trait ActivityFactory: Send + Sync {
    fn create(
        &self,
        partition_key: &str,
        activity: &str,
    ) -> Option<Arc<dyn Activity>>;
}

/// Wraps an async closure as an [`Activity`].
pub struct FnActivity<F> {
    f: F,
}

impl<F> FnActivity<F>
where
    F: Fn(Arc<ActivityContext>) -> BoxFuture<'static, Result<ActivityOutput>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
        }
    }
}

#[async_trait]
impl<F> Activity for FnActivity<F>
where
    F: Fn(Arc<ActivityContext>) -> BoxFuture<'static, Result<ActivityOutput>> + Send + Sync,
{
    async fn run(
        &self,
        ctx: Arc<ActivityContext>,
    ) -> Result<ActivityOutput> {
        (self.f)(ctx).await
    }
}

/// Name keyed [`ActivityFactory`], shared by every partition.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    activities: ShareLock<HashMap<String, Arc<dyn Activity>>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self {
            activities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(
        &self,
        name: &str,
        activity: Arc<dyn Activity>,
    ) {
        self.activities.write().unwrap().insert(name.to_string(), activity);
    }

    /// Registers an async closure.
    ///
    /// ```rust,ignore
    /// registry.register_fn("charge", |ctx| Box::pin(async move {
    ///     let order: Order = ctx.input("order_placed")?;
    ///     Ok(ActivityOutput::new().event(ctx.event("charged", &order.id)?))
    /// }));
    /// ```
    pub fn register_fn<F>(
        &self,
        name: &str,
        f: F,
    ) where
        F: Fn(Arc<ActivityContext>) -> BoxFuture<'static, Result<ActivityOutput>> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnActivity::new(f)));
    }

    pub fn len(&self) -> usize {
        self.activities.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ActivityFactory for ActivityRegistry {
    fn create(
        &self,
        _partition_key: &str,
        activity: &str,
    ) -> Option<Arc<dyn Activity>> {
        self.activities.read().unwrap().get(activity).cloned()
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc};

    use crate::{
        EvflowError,
        common::JsonSerializer,
        events::WorkflowExecutionInfo,
        workflow::{ActivityContext, ActivityFactory, ActivityOutput, ActivityRegistry},
    };

    #[tokio::test]
    async fn test_registry_runs_closure() {
        let registry = ActivityRegistry::new();
        assert!(registry.is_empty());
        registry.register_fn("a1", |ctx| Box::pin(async move { Ok(ActivityOutput::new().event(ctx.event("e1", &7)?)) }));
        registry.register_fn("bad", |_| Box::pin(async { Err(EvflowError::Activity("nope".to_string())) }));
        assert_eq!(registry.len(), 2);

        let ctx = Arc::new(ActivityContext::new(WorkflowExecutionInfo::new("wf", "1", "p"), "a1", HashMap::new(), Arc::new(JsonSerializer)));
        let output = registry.create("p", "a1").unwrap().run(ctx.clone()).await.unwrap();
        assert_eq!(output.events.len(), 1);
        assert_eq!(output.events[0].name, "e1");

        assert!(registry.create("p", "bad").unwrap().run(ctx).await.is_err());
        assert!(registry.create("p", "missing").is_none());
    }
}

//! Message handlers driving executions.
//!
//! [`JoinTracker`] consumes event messages and turns completed joins into
//! `ExecuteActivity` directives. [`ControlHandler`] consumes control
//! messages and runs activities, timeouts, rechecks and error handling.
//! Both share one [`Dispatcher`] holding the stores and senders.

mod control;
mod join;
mod publisher;

use std::{sync::Arc, time::Duration};

use tracing::warn;

use crate::{
    Result,
    common::{MemCache, Serializer},
    events::{ControlMessage, EventMessage, Notice, NoticeKind, WorkflowExecutionInfo},
    runtime::{Channel, MessageSender},
    store::{Store, data::ExecutionEntity},
    utils,
    workflow::{ActivityFactory, WorkflowDefinition},
};

pub use control::ControlHandler;
pub use join::JoinTracker;
pub use publisher::EventPublisher;

pub struct Dispatcher {
    store: Store,
    definitions: Arc<MemCache<String, Arc<WorkflowDefinition>>>,
    factory: Arc<dyn ActivityFactory>,
    serializer: Arc<dyn Serializer>,
    channel: Arc<Channel>,
    events: Arc<dyn MessageSender<EventMessage>>,
    controls: Arc<dyn MessageSender<ControlMessage>>,
    entity_ttl: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        definitions: Arc<MemCache<String, Arc<WorkflowDefinition>>>,
        factory: Arc<dyn ActivityFactory>,
        serializer: Arc<dyn Serializer>,
        channel: Arc<Channel>,
        events: Arc<dyn MessageSender<EventMessage>>,
        controls: Arc<dyn MessageSender<ControlMessage>>,
        entity_ttl: Duration,
    ) -> Self {
        Self {
            store,
            definitions,
            factory,
            serializer,
            channel,
            events,
            controls,
            entity_ttl,
        }
    }

    fn definition(
        &self,
        execution: &WorkflowExecutionInfo,
    ) -> Option<Arc<WorkflowDefinition>> {
        let definition = self.definitions.get(&execution.definition_key());
        if definition.is_none() {
            warn!("workflow {} of execution {} is not deployed", execution.definition_key(), execution.execution_id);
        }
        definition
    }

    /// The execution record while it is still running. `None` for unknown
    /// and terminal executions, whose messages are stale.
    async fn running(
        &self,
        execution: &WorkflowExecutionInfo,
    ) -> Result<Option<ExecutionEntity>> {
        match self.store.executions().get(&execution.partition_key, &execution.execution_id).await {
            Ok(entity) if entity.status.is_terminal() => Ok(None),
            Ok(entity) => Ok(Some(entity)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn expires_at(&self) -> Option<i64> {
        Some(utils::time::expires_after(self.entity_ttl))
    }

    fn notify(
        &self,
        execution: &WorkflowExecutionInfo,
        activity: &str,
        kind: NoticeKind,
    ) {
        self.channel.publish(Notice::new(execution, activity, kind));
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::runtime::Handle;

    use crate::{
        Result,
        common::{JsonSerializer, MemCache},
        dispatcher::Dispatcher,
        events::{ControlMessage, ControlMessageType, EventMessage, Message, WorkflowExecutionInfo},
        model::WorkflowModel,
        runtime::{Channel, MessageSender},
        store::{Store, data::ExecutionEntity},
        workflow::{ActivityFactory, WorkflowDefinition},
    };

    /// Sender that keeps what it was given.
    pub struct Recorder<T> {
        pub sent: Mutex<Vec<T>>,
    }

    impl<T> Default for Recorder<T> {
        fn default() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl<T: Clone> Recorder<T> {
        pub fn sent(&self) -> Vec<T> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Recorder<ControlMessage> {
        pub fn count(
            &self,
            control_type: ControlMessageType,
            activity: &str,
        ) -> usize {
            self.sent.lock().unwrap().iter().filter(|m| m.control_type == control_type && m.target_activity.as_deref() == Some(activity)).count()
        }
    }

    #[async_trait]
    impl<T: Message> MessageSender<T> for Recorder<T> {
        async fn send_with_delay(
            &self,
            message: T,
            _: Duration,
        ) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    pub struct Fixture {
        pub dispatcher: Arc<Dispatcher>,
        pub events: Arc<Recorder<EventMessage>>,
        pub controls: Arc<Recorder<ControlMessage>>,
        pub store: Store,
        pub info: WorkflowExecutionInfo,
    }

    impl Fixture {
        pub async fn execution(&self) -> ExecutionEntity {
            self.store.executions().get(&self.info.partition_key, &self.info.execution_id).await.unwrap()
        }
    }

    /// Deploys `model` and starts one running execution of it.
    pub async fn fixture(
        model: WorkflowModel,
        factory: Arc<dyn ActivityFactory>,
    ) -> Fixture {
        let definition = Arc::new(WorkflowDefinition::build(&model, Duration::from_secs(60)).unwrap());
        let definitions = Arc::new(MemCache::unbounded());
        definitions.set(definition.key(), definition);

        let store = Store::mem();
        let info = WorkflowExecutionInfo::new(&model.name, &model.version, "tenant");
        store.executions().upsert(&info.partition_key, &info.execution_id, ExecutionEntity::new(&info, None)).await.unwrap();

        let events = Arc::new(Recorder::<EventMessage>::default());
        let controls = Arc::new(Recorder::<ControlMessage>::default());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            definitions,
            factory,
            Arc::new(JsonSerializer),
            Arc::new(Channel::new(Handle::current())),
            events.clone(),
            controls.clone(),
            Duration::from_secs(60),
        ));
        Fixture {
            dispatcher,
            events,
            controls,
            store,
            info,
        }
    }
}

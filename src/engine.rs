//! Workflow engine - the main entry point for Evflow.
//!
//! The engine wires the message queues, processors and handlers together
//! and exposes the orchestrator API:
//! - Deploying workflow definitions
//! - Starting executions and querying their state
//! - Observing executions through the notice channel
//! - Graceful shutdown coordination

mod gc;
mod handle;

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

use crate::{
    Config, EvflowError, Result,
    common::{MemCache, Serializer, Shutdown},
    dispatcher::{ControlHandler, Dispatcher, JoinTracker},
    events::{ControlMessage, EventMessage, WorkflowExecutionInfo},
    model::WorkflowModel,
    runtime::{Channel, MessageProcessor, MessageQueue, MessageSender},
    store::{
        Store,
        data::{ActivityStateEntity, ExecutionEntity, ExecutionStatus},
    },
    utils,
    workflow::{ActivityFactory, WorkflowDefinition},
};

use gc::Gc;
pub use handle::ExecutionHandle;

/// The workflow engine.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Arc::new(ActivityRegistry::new());
/// registry.register_fn("a1", |ctx| Box::pin(async move { Ok(ActivityOutput::new().event(ctx.event("e1", &1)?)) }));
///
/// let engine = EngineBuilder::new().factory(registry).build()?;
/// engine.launch();
/// engine.deploy(&workflow_model)?;
///
/// let handle = engine.start_new("order", "1", "tenant-a").await?;
/// let execution = handle.wait(Duration::from_secs(30)).await?;
///
/// engine.shutdown();
/// ```
pub struct Engine {
    config: Config,
    store: Store,
    /// Deployed definitions keyed by `name@version`.
    definitions: Arc<MemCache<String, Arc<WorkflowDefinition>>>,
    /// Notice channel for observers.
    channel: Arc<Channel>,
    events: Arc<MessageQueue<EventMessage>>,
    controls: Arc<MessageQueue<ControlMessage>>,
    gc: Gc,

    /// Flag indicating if the engine is running.
    running: Arc<AtomicBool>,
    runtime: Handle,
    /// Runtime created by the builder when none was available.
    _owned_runtime: Option<Arc<Runtime>>,
    shutdown: Arc<Shutdown>,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        store: Store,
        factory: Arc<dyn ActivityFactory>,
        serializer: Arc<dyn Serializer>,
        runtime: Handle,
        owned_runtime: Option<Arc<Runtime>>,
    ) -> Self {
        let channel = Arc::new(Channel::new(runtime.clone()));
        let events = MessageQueue::<EventMessage>::new("event", runtime.clone());
        let controls = MessageQueue::<ControlMessage>::new("control", runtime.clone());
        let definitions = Arc::new(MemCache::unbounded());

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            definitions.clone(),
            factory,
            serializer,
            channel.clone(),
            events.clone(),
            controls.clone(),
            config.workflow.entity_ttl(),
        ));

        // both processors report dropped messages on the control queue
        let max_attempt_count = config.processor.max_attempt_count;
        let retry_interval = config.processor.retry_interval();
        let event_processor = Arc::new(MessageProcessor::new("event", controls.clone(), max_attempt_count, retry_interval));
        event_processor.subscribe(Arc::new(JoinTracker::new(dispatcher.clone())));
        events.subscribe(event_processor);

        let control_processor = Arc::new(MessageProcessor::new("control", controls.clone(), max_attempt_count, retry_interval));
        control_processor.subscribe(Arc::new(ControlHandler::new(dispatcher)));
        controls.subscribe(control_processor);

        let shutdown = Arc::new(Shutdown::new());
        let gc = Gc::new(store.clone(), config.workflow.gc_interval(), runtime.clone(), shutdown.clone());

        Self {
            config,
            store,
            definitions,
            channel,
            events,
            controls,
            gc,
            running: Arc::new(AtomicBool::new(false)),
            runtime,
            _owned_runtime: owned_runtime,
            shutdown,
        }
    }

    /// Starts the queue workers, the notice channel and the gc.
    ///
    /// An engine that was shut down can not be launched again.
    pub fn launch(&self) {
        if self.shutdown.is_terminated() || self.running.swap(true, Ordering::Relaxed) {
            return;
        }

        let workers = usize::from(self.config.worker_number);
        self.channel.listen();
        self.events.listen(workers);
        self.controls.listen(workers);
        self.gc.start();
        info!("engine launched with {} workers per queue", workers);
    }

    /// Stops every worker. Pending and delayed messages are discarded.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        self.release();
        info!("engine shut down");
    }

    /// Signals every task and drops the processors, which hold the queues
    /// through their senders.
    fn release(&self) {
        self.shutdown.shutdown();
        self.events.shutdown();
        self.controls.shutdown();
        self.channel.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Validates a workflow and registers it under `name@version`.
    ///
    /// A deployed definition is immutable: deploying an equivalent workflow
    /// again returns the registered definition, deploying a different one
    /// under the same name and version fails. Publish changes as a new version.
    pub fn deploy(
        &self,
        workflow: &WorkflowModel,
    ) -> Result<Arc<WorkflowDefinition>> {
        let definition = Arc::new(WorkflowDefinition::build(workflow, self.config.workflow.default_timeout())?);
        let entity_ttl = self.config.workflow.entity_ttl();
        if definition.timeout() >= entity_ttl {
            return Err(EvflowError::Workflow(format!(
                "workflow {} times out after {:?}, which is not below the entity ttl of {:?}",
                definition.key(),
                definition.timeout(),
                entity_ttl
            )));
        }

        let (deployed, inserted) = self.definitions.get_or_insert(definition.key(), definition.clone());
        if inserted {
            info!("deployed workflow {} with {} activities", deployed.key(), deployed.activities().len());
        } else if deployed.is_equivalent(&definition) {
            debug!("workflow {} is already deployed", deployed.key());
        } else {
            return Err(EvflowError::Workflow(format!("workflow {} is already deployed with a different graph", deployed.key())));
        }
        Ok(deployed)
    }

    pub fn definition(
        &self,
        workflow_name: &str,
        version: &str,
    ) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(&utils::definition_key(workflow_name, version))
    }

    /// Starts a new execution of a deployed workflow.
    pub async fn start_new(
        &self,
        workflow_name: &str,
        version: &str,
        partition_key: &str,
    ) -> Result<ExecutionHandle> {
        if !self.is_running() {
            return Err(EvflowError::Engine("engine is not running".to_string()));
        }
        let definition = self
            .definition(workflow_name, version)
            .ok_or(EvflowError::Workflow(format!("workflow {} is not deployed", utils::definition_key(workflow_name, version))))?;

        let info = WorkflowExecutionInfo::new(workflow_name, version, partition_key);
        let expires_at = Some(utils::time::expires_after(self.config.workflow.entity_ttl()));
        self.store.executions().upsert(&info.partition_key, &info.execution_id, ExecutionEntity::new(&info, expires_at)).await?;

        for activity in definition.entry_activities() {
            self.controls.send(ControlMessage::execute_activity(info.clone(), &activity)).await?;
        }
        self.controls.send_with_delay(ControlMessage::workflow_timeout(info.clone()), definition.timeout()).await?;

        debug!("started execution {} of {} in partition {}", info.execution_id, definition.key(), info.partition_key);
        Ok(ExecutionHandle::new(info, definition, self.store.clone()))
    }

    /// Handle of an execution started earlier.
    pub fn handle(
        &self,
        info: &WorkflowExecutionInfo,
    ) -> Result<ExecutionHandle> {
        let definition = self
            .definitions
            .get(&info.definition_key())
            .ok_or(EvflowError::Workflow(format!("workflow {} is not deployed", info.definition_key())))?;
        Ok(ExecutionHandle::new(info.clone(), definition, self.store.clone()))
    }

    pub async fn execution(
        &self,
        info: &WorkflowExecutionInfo,
    ) -> Result<ExecutionEntity> {
        self.handle(info)?.execution().await
    }

    pub async fn status(
        &self,
        info: &WorkflowExecutionInfo,
    ) -> Result<ExecutionStatus> {
        self.handle(info)?.status().await
    }

    pub async fn activity_states(
        &self,
        info: &WorkflowExecutionInfo,
    ) -> Result<HashMap<String, ActivityStateEntity>> {
        self.handle(info)?.activity_states().await
    }

    pub async fn wait(
        &self,
        info: &WorkflowExecutionInfo,
        timeout: Duration,
    ) -> Result<ExecutionEntity> {
        self.handle(info)?.wait(timeout).await
    }

    /// Re-evaluates the join of `activity` and triggers it when every input
    /// has arrived. Used to recover a trigger lost with a crashed process.
    pub async fn recheck(
        &self,
        info: &WorkflowExecutionInfo,
        activity: &str,
    ) -> Result<()> {
        self.controls.send(ControlMessage::multi_input_check(info.clone(), activity)).await
    }

    /// Returns a reference to the notice channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    pub fn store(&self) -> Store {
        self.store.clone()
    }

    pub fn runtime(&self) -> Handle {
        self.runtime.clone()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use crate::EngineBuilder;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_releases_queues() {
        let engine = EngineBuilder::new().worker_number(2).build().unwrap();
        engine.launch();
        let events = Arc::downgrade(&engine.events);
        let controls = Arc::downgrade(&engine.controls);
        drop(engine);

        // workers let go of their queue once they see the shutdown signal
        for _ in 0..100 {
            if events.strong_count() == 0 && controls.strong_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(events.strong_count(), 0);
        assert_eq!(controls.strong_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_without_launch_releases_queues() {
        let engine = EngineBuilder::new().build().unwrap();
        let controls = Arc::downgrade(&engine.controls);
        drop(engine);
        assert_eq!(controls.strong_count(), 0);
    }
}

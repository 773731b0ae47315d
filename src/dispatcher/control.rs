//! Control plane state machine.
//!
//! | directive                | effect                                                  |
//! |--------------------------|---------------------------------------------------------|
//! | `ExecuteActivity`        | run the activity, publish its events, record completion |
//! | `WorkflowTimeout`        | `Running` becomes `TimedOut`, otherwise nothing          |
//! | `MultiInputExecuteCheck` | re-emit `ExecuteActivity` when the join is complete      |
//! | `Error`                  | record the failure and apply the error strategy          |
//!
//! Directives for terminal or unknown executions are acknowledged without
//! side effects.

use std::{
    any::Any,
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, info, trace, warn};

use crate::{
    Result,
    dispatcher::{Dispatcher, EventPublisher},
    events::{ControlMessage, ControlMessageType, ErrorInfo, ErrorKind, NoticeKind, WorkflowExecutionInfo},
    model::ErrorStrategy,
    runtime::{HandlerVerdict, MessageHandler},
    store::{
        self, Modified,
        data::{ActivityFailure, ExecutionStatus},
    },
    workflow::{ActivityContext, WorkflowDefinition},
};

pub struct ControlHandler {
    dispatcher: Arc<Dispatcher>,
    publisher: EventPublisher,
}

impl ControlHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            publisher: EventPublisher::new(dispatcher.clone()),
            dispatcher,
        }
    }

    async fn execute(
        &self,
        execution: &WorkflowExecutionInfo,
        activity: &str,
    ) -> Result<HandlerVerdict> {
        let Some(definition) = self.dispatcher.definition(execution) else {
            return Ok(HandlerVerdict::Complete);
        };
        let Some(state) = self.dispatcher.running(execution).await? else {
            debug!("execution {} is not running, {} skipped", execution.execution_id, activity);
            return Ok(HandlerVerdict::Complete);
        };
        if state.is_completed(activity) || state.is_failed(activity) {
            debug!("execution {}: {} already ran", execution.execution_id, activity);
            return Ok(HandlerVerdict::Complete);
        }
        if !definition.contains(activity) {
            let message = format!("{} is not an activity of {}", activity, definition.key());
            return self.report(execution, ErrorInfo::new(ErrorKind::ActivityNotFound, message, Some(activity))).await;
        }

        let required: Vec<String> = definition.subscriptions(activity).into_iter().collect();
        let mut inputs = HashMap::new();
        if !required.is_empty() {
            let stored = self.dispatcher.store.events().get_many(&execution.event_partition(), &required).await?;
            if stored.len() < required.len() {
                warn!("execution {}: inputs of {} are not readable yet", execution.execution_id, activity);
                return Ok(HandlerVerdict::Yield);
            }
            inputs.extend(stored.into_iter().map(|(name, entity)| (name, entity.event)));
        }

        let created = panic::catch_unwind(AssertUnwindSafe(|| self.dispatcher.factory.create(&execution.partition_key, activity)));
        let instance = match created {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                let message = format!("no implementation for {} in partition {}", activity, execution.partition_key);
                return self.report(execution, ErrorInfo::new(ErrorKind::ActivityNotFound, message, Some(activity))).await;
            }
            Err(panic) => {
                let message = format!("creating {} panicked: {}", activity, panic_message(panic));
                return self.report(execution, ErrorInfo::new(ErrorKind::ActivityPanicked, message, Some(activity))).await;
            }
        };

        let ctx = Arc::new(ActivityContext::new(execution.clone(), activity, inputs, self.dispatcher.serializer.clone()));
        debug!("execution {}: running {} as {}", execution.execution_id, activity, ctx.activity_execution_id());
        let output = match AssertUnwindSafe(instance.run(ctx)).catch_unwind().await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return self.report(execution, ErrorInfo::new(ErrorKind::ActivityFailed, e.to_string(), Some(activity))).await;
            }
            Err(panic) => {
                return self.report(execution, ErrorInfo::new(ErrorKind::ActivityPanicked, panic_message(panic), Some(activity))).await;
            }
        };

        let declared = definition.publications(activity);
        if let Some(event) = output.events.iter().find(|e| !declared.contains(&e.name)) {
            let message = format!("{} published {} which it does not declare", activity, event.name);
            return self.report(execution, ErrorInfo::new(ErrorKind::UndeclaredEvent, message, Some(activity))).await;
        }

        let mut published = Vec::with_capacity(output.events.len());
        for event in output.events {
            published.push(event.name.clone());
            self.publisher.publish(execution, event).await?;
        }
        self.complete(&definition, execution, activity, &published).await?;
        Ok(HandlerVerdict::Complete)
    }

    /// Records `activity` as completed. Finishes the execution once every
    /// activity is settled; a terminal status is left as it is.
    async fn complete(
        &self,
        definition: &WorkflowDefinition,
        execution: &WorkflowExecutionInfo,
        activity: &str,
        published: &[String],
    ) -> Result<()> {
        let executions = self.dispatcher.store.executions();
        let mut finished = None;
        let modified = store::modify(executions.as_ref(), &execution.partition_key, &execution.execution_id, |entity| {
            finished = None;
            if entity.is_completed(activity) {
                return false;
            }
            entity.completed_activities.push(activity.to_string());
            for event in published.iter() {
                if !entity.has_published(event) {
                    entity.published_events.push(event.clone());
                }
            }
            if !entity.status.is_terminal() && definition.is_settled(entity) {
                let error = entity.failures.first().map(|f| f.error.clone());
                let status = if error.is_some() { ExecutionStatus::Failed } else { ExecutionStatus::Completed };
                entity.finish(status, error.clone());
                finished = Some(error);
            }
            true
        })
        .await;

        match modified {
            Ok(Modified::Updated(_)) => {}
            Ok(Modified::Unchanged(_)) => {
                trace!("execution {}: completion of {} already recorded", execution.execution_id, activity);
                return Ok(());
            }
            Err(e) if e.is_not_found() => {
                warn!("execution {} vanished before {} completed", execution.execution_id, activity);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.dispatcher.notify(execution, activity, NoticeKind::ActivityCompleted);
        match finished {
            Some(None) => {
                info!("execution {} of {} completed", execution.execution_id, definition.key());
                self.dispatcher.notify(execution, "", NoticeKind::Completed);
            }
            Some(Some(error)) => {
                info!("execution {} of {} failed: {}", execution.execution_id, definition.key(), error);
                self.dispatcher.notify(execution, "", NoticeKind::Failed(error));
            }
            None => {}
        }
        Ok(())
    }

    async fn timeout(
        &self,
        execution: &WorkflowExecutionInfo,
    ) -> Result<HandlerVerdict> {
        let executions = self.dispatcher.store.executions();
        let error = ErrorInfo::new(ErrorKind::Timeout, format!("execution {} did not finish in time", execution.execution_id), None);
        let modified = store::modify(executions.as_ref(), &execution.partition_key, &execution.execution_id, |entity| {
            if entity.status.is_terminal() {
                return false;
            }
            entity.finish(ExecutionStatus::TimedOut, Some(error.clone()));
            true
        })
        .await;

        match modified {
            Ok(Modified::Updated(_)) => {
                info!("execution {} of {} timed out", execution.execution_id, execution.definition_key());
                self.dispatcher.notify(execution, "", NoticeKind::TimedOut);
            }
            Ok(Modified::Unchanged(entity)) => {
                trace!("execution {} already {}, timeout ignored", execution.execution_id, entity.status.as_ref());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(HandlerVerdict::Complete)
    }

    async fn recheck(
        &self,
        execution: &WorkflowExecutionInfo,
        activity: &str,
    ) -> Result<HandlerVerdict> {
        let Some(definition) = self.dispatcher.definition(execution) else {
            return Ok(HandlerVerdict::Complete);
        };
        let Some(state) = self.dispatcher.running(execution).await? else {
            return Ok(HandlerVerdict::Complete);
        };
        if state.is_completed(activity) || state.is_failed(activity) {
            return Ok(HandlerVerdict::Complete);
        }
        if !definition.contains(activity) {
            warn!("recheck of {} which is not an activity of {}", activity, definition.key());
            return Ok(HandlerVerdict::Complete);
        }

        let required = definition.subscriptions(activity);
        let ready = if required.is_empty() {
            true
        } else {
            match self.dispatcher.store.activities().get(&execution.execution_id, activity).await {
                Ok(join) => join.is_ready(&required),
                Err(e) if e.is_not_found() => false,
                Err(e) => return Err(e.into()),
            }
        };
        if ready {
            debug!("execution {}: recheck found {} ready", execution.execution_id, activity);
            self.dispatcher.controls.send(ControlMessage::execute_activity(execution.clone(), activity)).await?;
        }
        Ok(HandlerVerdict::Complete)
    }

    async fn fail(
        &self,
        message: &ControlMessage,
    ) -> Result<HandlerVerdict> {
        let execution = &message.execution;
        let error = message
            .error
            .clone()
            .unwrap_or_else(|| ErrorInfo::new(ErrorKind::DeliveryExhausted, "error reported without detail", message.target_activity.as_deref()));
        let definition = self.dispatcher.definition(execution);
        // failures that can not be pinned on one activity always halt
        let halt = error.activity.is_none() || definition.as_ref().is_none_or(|d| d.error_strategy() == ErrorStrategy::Halt);

        let executions = self.dispatcher.store.executions();
        let mut recorded = false;
        let mut finished = None;
        let modified = store::modify(executions.as_ref(), &execution.partition_key, &execution.execution_id, |entity| {
            recorded = false;
            finished = None;
            if entity.status.is_terminal() {
                return false;
            }
            if let Some(activity) = &error.activity {
                if !entity.is_failed(activity) {
                    entity.failures.push(ActivityFailure {
                        activity: activity.clone(),
                        error: error.clone(),
                    });
                    recorded = true;
                }
            }
            if halt {
                entity.finish(ExecutionStatus::Failed, Some(error.clone()));
            } else if definition.as_ref().is_some_and(|d| d.is_settled(entity)) {
                let first = entity.failures.first().map(|f| f.error.clone());
                entity.finish(ExecutionStatus::Failed, first);
            } else {
                return recorded;
            }
            finished = entity.error.clone();
            true
        })
        .await;

        match modified {
            Ok(Modified::Updated(_)) => {}
            Ok(Modified::Unchanged(_)) => {
                trace!("execution {}: error ignored: {}", execution.execution_id, error);
                return Ok(HandlerVerdict::Complete);
            }
            Err(e) if e.is_not_found() => return Ok(HandlerVerdict::Complete),
            Err(e) => return Err(e.into()),
        }

        if let (true, Some(activity)) = (recorded, &error.activity) {
            self.dispatcher.notify(execution, activity, NoticeKind::ActivityFailed(error.clone()));
        }
        if let Some(cause) = finished {
            info!("execution {} of {} failed: {}", execution.execution_id, execution.definition_key(), cause);
            self.dispatcher.notify(execution, "", NoticeKind::Failed(cause));
        }
        Ok(HandlerVerdict::Complete)
    }

    /// Surfaces a failure of user code as an `Error` directive.
    async fn report(
        &self,
        execution: &WorkflowExecutionInfo,
        error: ErrorInfo,
    ) -> Result<HandlerVerdict> {
        warn!("execution {}: {}", execution.execution_id, error);
        self.dispatcher.controls.send(ControlMessage::error(execution.clone(), error)).await?;
        Ok(HandlerVerdict::Complete)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "activity panicked".to_string()
    }
}

#[async_trait]
impl MessageHandler<ControlMessage> for ControlHandler {
    async fn handle(
        &self,
        message: &ControlMessage,
    ) -> Result<HandlerVerdict> {
        let execution = &message.execution;
        match (message.control_type, message.target_activity.as_deref()) {
            (ControlMessageType::ExecuteActivity, Some(activity)) => self.execute(execution, activity).await,
            (ControlMessageType::MultiInputExecuteCheck, Some(activity)) => self.recheck(execution, activity).await,
            (ControlMessageType::WorkflowTimeout, _) => self.timeout(execution).await,
            (ControlMessageType::Error, _) => self.fail(message).await,
            (control_type, None) => {
                warn!("{} for execution {} has no target activity", control_type.as_ref(), execution.execution_id);
                Ok(HandlerVerdict::Complete)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use crate::{
        EvflowError,
        dispatcher::{
            ControlHandler,
            testing::{Fixture, fixture},
        },
        events::{ControlMessage, ControlMessageType, ErrorInfo, ErrorKind},
        model::{ActivityModel, ErrorStrategy, WorkflowModel},
        runtime::{HandlerVerdict, MessageHandler},
        store::data::ExecutionStatus,
        workflow::{Activity, ActivityFactory, ActivityOutput, ActivityRegistry},
    };

    fn chain() -> WorkflowModel {
        WorkflowModel::new("chain", "1")
            .activity(ActivityModel::new("a1").publish("e1"))
            .activity(ActivityModel::new("a2").subscribe("e1").publish("e2"))
            .activity(ActivityModel::new("a3").subscribe("e2"))
    }

    fn registry(runs: Arc<AtomicU32>) -> Arc<ActivityRegistry> {
        let registry = ActivityRegistry::new();
        let counter = runs.clone();
        registry.register_fn("a1", move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(ActivityOutput::new().event(ctx.event("e1", &41u32)?)) })
        });
        registry.register_fn("a2", |ctx| {
            Box::pin(async move {
                let n: u32 = ctx.input("e1")?;
                Ok(ActivityOutput::new().event(ctx.event("e2", &(n + 1))?))
            })
        });
        registry.register_fn("a3", |_| Box::pin(async { Ok(ActivityOutput::new()) }));
        Arc::new(registry)
    }

    async fn chain_fixture() -> (Fixture, ControlHandler, Arc<AtomicU32>) {
        let runs = Arc::new(AtomicU32::new(0));
        let f = fixture(chain(), registry(runs.clone())).await;
        let handler = ControlHandler::new(f.dispatcher.clone());
        (f, handler, runs)
    }

    fn reported(f: &Fixture) -> Vec<ErrorInfo> {
        f.controls.sent().into_iter().filter(|m| m.control_type == ControlMessageType::Error).filter_map(|m| m.error).collect()
    }

    #[tokio::test]
    async fn test_execute_publishes_and_records_completion() {
        let (f, handler, runs) = chain_fixture().await;
        let verdict = handler.handle(&ControlMessage::execute_activity(f.info.clone(), "a1")).await.unwrap();
        assert_eq!(verdict, HandlerVerdict::Complete);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let sent = f.events.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event.name, "e1");
        assert_eq!(sent[0].event.source_activity, "a1");
        let stored = f.store.events().get(&f.info.event_partition(), "e1").await.unwrap();
        assert_eq!(stored.event, sent[0].event);

        let execution = f.execution().await;
        assert_eq!(execution.completed_activities, vec!["a1".to_string()]);
        assert_eq!(execution.published_events, vec!["e1".to_string()]);
        assert_eq!(execution.status, ExecutionStatus::Running);

        // redelivery of the same directive does not run the activity again
        handler.handle(&ControlMessage::execute_activity(f.info.clone(), "a1")).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_reads_inputs_and_finishes() {
        let (f, handler, _) = chain_fixture().await;
        for activity in ["a1", "a2", "a3"] {
            handler.handle(&ControlMessage::execute_activity(f.info.clone(), activity)).await.unwrap();
        }
        let e2 = f.store.events().get(&f.info.event_partition(), "e2").await.unwrap();
        let n: u32 = e2.event.payload(&crate::common::JsonSerializer).unwrap();
        assert_eq!(n, 42);

        let execution = f.execution().await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.error.is_none());
        assert!(execution.end_time >= execution.start_time);
    }

    #[tokio::test]
    async fn test_execute_yields_without_inputs() {
        let (f, handler, _) = chain_fixture().await;
        let verdict = handler.handle(&ControlMessage::execute_activity(f.info.clone(), "a2")).await.unwrap();
        assert_eq!(verdict, HandlerVerdict::Yield);
        assert!(f.execution().await.completed_activities.is_empty());
    }

    #[tokio::test]
    async fn test_user_failures_become_error_directives() {
        let model = WorkflowModel::new("bad", "1")
            .activity(ActivityModel::new("fails").publish("e1"))
            .activity(ActivityModel::new("panics"))
            .activity(ActivityModel::new("liar").publish("e1_other"))
            .activity(ActivityModel::new("missing"));
        let registry = ActivityRegistry::new();
        registry.register_fn("fails", |_| Box::pin(async { Err(EvflowError::Activity("card declined".to_string())) }));
        registry.register_fn("panics", |_| {
            Box::pin(async {
                let pages: Vec<u32> = Vec::new();
                if pages.is_empty() {
                    panic!("out of range");
                }
                Ok(ActivityOutput::new())
            })
        });
        registry.register_fn("liar", |ctx| Box::pin(async move { Ok(ActivityOutput::new().event(ctx.event("e9", &())?)) }));
        let f = fixture(model, Arc::new(registry)).await;
        let handler = ControlHandler::new(f.dispatcher.clone());

        for activity in ["fails", "panics", "liar", "missing", "unknown"] {
            let verdict = handler.handle(&ControlMessage::execute_activity(f.info.clone(), activity)).await.unwrap();
            assert_eq!(verdict, HandlerVerdict::Complete);
        }

        let errors = reported(&f);
        let kinds: Vec<(ErrorKind, Option<String>)> = errors.iter().map(|e| (e.kind, e.activity.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (ErrorKind::ActivityFailed, Some("fails".to_string())),
                (ErrorKind::ActivityPanicked, Some("panics".to_string())),
                (ErrorKind::UndeclaredEvent, Some("liar".to_string())),
                (ErrorKind::ActivityNotFound, Some("missing".to_string())),
                (ErrorKind::ActivityNotFound, Some("unknown".to_string())),
            ]
        );
        assert!(errors[0].message.contains("card declined"));
        assert!(errors[1].message.contains("out of range"));
        assert!(f.events.sent().is_empty());
    }

    struct PanickingFactory;

    impl ActivityFactory for PanickingFactory {
        fn create(
            &self,
            _: &str,
            activity: &str,
        ) -> Option<Arc<dyn Activity>> {
            panic!("no constructor wired for {}", activity)
        }
    }

    #[tokio::test]
    async fn test_factory_panic_becomes_error_directive() {
        let model = WorkflowModel::new("single", "1").activity(ActivityModel::new("a1"));
        let f = fixture(model, Arc::new(PanickingFactory)).await;
        let handler = ControlHandler::new(f.dispatcher.clone());

        let verdict = handler.handle(&ControlMessage::execute_activity(f.info.clone(), "a1")).await.unwrap();
        assert_eq!(verdict, HandlerVerdict::Complete);

        let errors = reported(&f);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::ActivityPanicked);
        assert_eq!(errors[0].activity.as_deref(), Some("a1"));
        assert!(errors[0].message.contains("no constructor wired for a1"));

        // the directive fails the execution once handled
        handler.handle(&f.controls.sent()[0]).await.unwrap();
        let execution = f.execution().await;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.is_failed("a1"));
    }

    #[tokio::test]
    async fn test_timeout_is_terminal() {
        let (f, handler, _) = chain_fixture().await;
        handler.handle(&ControlMessage::execute_activity(f.info.clone(), "a1")).await.unwrap();
        handler.handle(&ControlMessage::execute_activity(f.info.clone(), "a2")).await.unwrap();
        handler.handle(&ControlMessage::workflow_timeout(f.info.clone())).await.unwrap();

        let execution = f.execution().await;
        assert_eq!(execution.status, ExecutionStatus::TimedOut);
        assert_eq!(execution.error.as_ref().map(|e| e.kind), Some(ErrorKind::Timeout));

        // a directive arriving after the timeout is stale
        handler.handle(&ControlMessage::execute_activity(f.info.clone(), "a3")).await.unwrap();
        assert!(!f.execution().await.is_completed("a3"));

        // an invocation that was already running records its completion only
        let definition = f.dispatcher.definition(&f.info).unwrap();
        handler.complete(&definition, &f.info, "a3", &[]).await.unwrap();
        let execution = f.execution().await;
        assert!(execution.is_completed("a3"));
        assert_eq!(execution.status, ExecutionStatus::TimedOut);

        // a second timeout does nothing
        handler.handle(&ControlMessage::workflow_timeout(f.info.clone())).await.unwrap();
        assert_eq!(f.execution().await.end_time, execution.end_time);
    }

    #[tokio::test]
    async fn test_timeout_after_completion_is_noop() {
        let (f, handler, _) = chain_fixture().await;
        for activity in ["a1", "a2", "a3"] {
            handler.handle(&ControlMessage::execute_activity(f.info.clone(), activity)).await.unwrap();
        }
        handler.handle(&ControlMessage::workflow_timeout(f.info.clone())).await.unwrap();
        assert_eq!(f.execution().await.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_error_halts_execution() {
        let (f, handler, _) = chain_fixture().await;
        let error = ErrorInfo::new(ErrorKind::ActivityFailed, "boom", Some("a1"));
        handler.handle(&ControlMessage::error(f.info.clone(), error.clone())).await.unwrap();

        let execution = f.execution().await;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.error, Some(error));
        assert!(execution.is_failed("a1"));

        let other = ErrorInfo::new(ErrorKind::ActivityFailed, "later", Some("a2"));
        handler.handle(&ControlMessage::error(f.info.clone(), other)).await.unwrap();
        assert!(!f.execution().await.is_failed("a2"));
    }

    #[tokio::test]
    async fn test_error_continue_waits_for_siblings() {
        let model = WorkflowModel::new("fan", "1")
            .error_strategy(ErrorStrategy::Continue)
            .activity(ActivityModel::new("start").publish("left").publish("right"))
            .activity(ActivityModel::new("l").subscribe("left").publish("l_done"))
            .activity(ActivityModel::new("r").subscribe("right"))
            .activity(ActivityModel::new("after_l").subscribe("l_done"));
        let registry = ActivityRegistry::new();
        registry.register_fn("start", |ctx| {
            Box::pin(async move { Ok(ActivityOutput::from(vec![ctx.event("left", &1)?, ctx.event("right", &2)?])) })
        });
        registry.register_fn("r", |_| Box::pin(async { Ok(ActivityOutput::new()) }));
        let f = fixture(model, Arc::new(registry)).await;
        let handler = ControlHandler::new(f.dispatcher.clone());

        handler.handle(&ControlMessage::execute_activity(f.info.clone(), "start")).await.unwrap();
        let error = ErrorInfo::new(ErrorKind::ActivityFailed, "left broke", Some("l"));
        handler.handle(&ControlMessage::error(f.info.clone(), error.clone())).await.unwrap();
        let execution = f.execution().await;
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.is_failed("l"));

        handler.handle(&ControlMessage::execute_activity(f.info.clone(), "r")).await.unwrap();
        let execution = f.execution().await;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.error, Some(error));
        assert!(execution.is_completed("r"));
    }

    #[tokio::test]
    async fn test_recheck_emits_when_join_complete() {
        let (f, handler, _) = chain_fixture().await;
        handler.handle(&ControlMessage::multi_input_check(f.info.clone(), "a2")).await.unwrap();
        assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a2"), 0);

        let mut state = f.store.activities().get_or_add(&f.info.execution_id, "a2", &|| crate::store::data::ActivityStateEntity::new(&f.info.execution_id, "a2", None)).await.unwrap();
        state.add_input("e1");
        f.store.activities().update(&f.info.execution_id, "a2", state).await.unwrap();

        handler.handle(&ControlMessage::multi_input_check(f.info.clone(), "a2")).await.unwrap();
        assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a2"), 1);

        handler.handle(&ControlMessage::multi_input_check(f.info.clone(), "a1")).await.unwrap();
        assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a1"), 1);
    }
}

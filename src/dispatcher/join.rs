//! Multi-input synchronization.
//!
//! Every subscriber of an arriving event gets the event name appended to
//! its [`ActivityStateEntity`] through a conditional update. The update is
//! the serialization point: only the write that completes the input set
//! emits `ExecuteActivity`, so an activity is triggered once no matter how
//! events are ordered or duplicated.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{
    Result,
    dispatcher::Dispatcher,
    events::{ControlMessage, EventMessage, WorkflowExecutionInfo},
    runtime::{HandlerVerdict, MessageHandler},
    store::data::ActivityStateEntity,
    workflow::WorkflowDefinition,
};

pub struct JoinTracker {
    dispatcher: Arc<Dispatcher>,
}

impl JoinTracker {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
        }
    }

    /// Records `event` for `activity`. Returns true when this call completed the join.
    async fn join(
        &self,
        definition: &WorkflowDefinition,
        execution: &WorkflowExecutionInfo,
        activity: &str,
        event: &str,
    ) -> Result<bool> {
        let activities = self.dispatcher.store.activities();
        let expires_at = self.dispatcher.expires_at();
        let required = definition.subscriptions(activity);

        let factory = || ActivityStateEntity::new(&execution.execution_id, activity, expires_at);
        let mut state = activities.get_or_add(&execution.execution_id, activity, &factory).await?;
        loop {
            if !state.add_input(event) {
                trace!("execution {}: {} already has {}", execution.execution_id, activity, event);
                return Ok(false);
            }
            match activities.update(&execution.execution_id, activity, state).await {
                Ok(updated) => return Ok(updated.is_ready(&required)),
                Err(e) if e.is_etag_mismatch() => {
                    trace!("execution {}: concurrent join on {}, re-reading", execution.execution_id, activity);
                    state = activities.get(&execution.execution_id, activity).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl MessageHandler<EventMessage> for JoinTracker {
    async fn handle(
        &self,
        message: &EventMessage,
    ) -> Result<HandlerVerdict> {
        let execution = &message.execution;
        let Some(definition) = self.dispatcher.definition(execution) else {
            return Ok(HandlerVerdict::Complete);
        };
        if self.dispatcher.running(execution).await?.is_none() {
            debug!("execution {} is not running, event {} ignored", execution.execution_id, message.event.name);
            return Ok(HandlerVerdict::Complete);
        }

        for activity in definition.subscribers(&message.event.name) {
            if self.join(&definition, execution, activity, &message.event.name).await? {
                debug!("execution {}: inputs of {} complete", execution.execution_id, activity);
                self.dispatcher.controls.send(ControlMessage::execute_activity(execution.clone(), activity)).await?;
            }
        }
        Ok(HandlerVerdict::Complete)
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use crate::{
        dispatcher::{
            JoinTracker,
            testing::{Fixture, fixture},
        },
        events::{ControlMessageType, Event, EventMessage, WorkflowExecutionInfo},
        model::{ActivityModel, WorkflowModel},
        runtime::{HandlerVerdict, MessageHandler},
        workflow::ActivityRegistry,
    };

    async fn join_fixture() -> (Fixture, Arc<JoinTracker>) {
        let model = WorkflowModel::new("join", "1")
            .activity(ActivityModel::new("a1").publish("e1"))
            .activity(ActivityModel::new("a2").publish("e2"))
            .activity(ActivityModel::new("a3").subscribe("e1").subscribe("e2"))
            .activity(ActivityModel::new("a4").subscribe("e1"));
        let f = fixture(model, Arc::new(ActivityRegistry::new())).await;
        let tracker = Arc::new(JoinTracker::new(f.dispatcher.clone()));
        (f, tracker)
    }

    fn message(
        info: &WorkflowExecutionInfo,
        name: &str,
    ) -> EventMessage {
        let event = Event {
            id: crate::utils::longid(),
            name: name.to_string(),
            payload: b"null".to_vec(),
            payload_type: "()".to_string(),
            delay: Duration::ZERO,
            source_activity: String::new(),
            source_activity_execution_id: String::new(),
        };
        EventMessage::new(info.clone(), event)
    }

    #[tokio::test]
    async fn test_join_waits_for_every_input() {
        let (f, tracker) = join_fixture().await;
        assert_eq!(tracker.handle(&message(&f.info, "e2")).await.unwrap(), HandlerVerdict::Complete);
        assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a3"), 0);

        tracker.handle(&message(&f.info, "e1")).await.unwrap();
        assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a3"), 1);
        assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a4"), 1);

        let state = f.store.activities().get(&f.info.execution_id, "a3").await.unwrap();
        assert_eq!(state.available_input_events, vec!["e2".to_string(), "e1".to_string()]);
    }

    #[tokio::test]
    async fn test_every_order_with_duplicates_triggers_once() {
        let orders: [&[&str]; 6] = [
            &["e1", "e2"],
            &["e2", "e1"],
            &["e1", "e1", "e2", "e2"],
            &["e2", "e2", "e1"],
            &["e1", "e2", "e1"],
            &["e2", "e1", "e2", "e1"],
        ];
        for order in orders {
            let (f, tracker) = join_fixture().await;
            for name in order {
                tracker.handle(&message(&f.info, name)).await.unwrap();
            }
            assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a3"), 1, "order {:?}", order);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_arrivals_trigger_once() {
        for _ in 0..20 {
            let (f, tracker) = join_fixture().await;
            let mut tasks = Vec::new();
            for name in ["e1", "e2", "e1", "e2", "e2", "e1"] {
                let tracker = tracker.clone();
                let msg = message(&f.info, name);
                tasks.push(tokio::spawn(async move { tracker.handle(&msg).await }));
            }
            for task in tasks {
                task.await.unwrap().unwrap();
            }
            assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a3"), 1);
            assert_eq!(f.controls.count(ControlMessageType::ExecuteActivity, "a4"), 1);
        }
    }

    #[tokio::test]
    async fn test_stale_execution_is_acknowledged() {
        let (f, tracker) = join_fixture().await;
        let unknown = WorkflowExecutionInfo::new("join", "1", "tenant");
        assert_eq!(tracker.handle(&message(&unknown, "e1")).await.unwrap(), HandlerVerdict::Complete);
        assert!(f.store.activities().get(&unknown.execution_id, "a4").await.is_err());
        assert!(f.controls.sent().is_empty());
    }
}

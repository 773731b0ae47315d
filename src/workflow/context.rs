use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    EvflowError, Result,
    common::{Serializer, SerializerExt},
    events::{Event, WorkflowExecutionInfo},
    utils,
};

/// Everything one activity invocation can see.
pub struct ActivityContext {
    execution: WorkflowExecutionInfo,
    activity: String,
    activity_execution_id: String,
    inputs: HashMap<String, Event>,
    serializer: Arc<dyn Serializer>,
}

impl ActivityContext {
    pub fn new(
        execution: WorkflowExecutionInfo,
        activity: &str,
        inputs: HashMap<String, Event>,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self {
            execution,
            activity: activity.to_string(),
            activity_execution_id: utils::longid(),
            inputs,
            serializer,
        }
    }

    pub fn execution(&self) -> &WorkflowExecutionInfo {
        &self.execution
    }

    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// Fresh for every invocation, including redeliveries.
    pub fn activity_execution_id(&self) -> &str {
        &self.activity_execution_id
    }

    /// Input events keyed by event name.
    pub fn inputs(&self) -> &HashMap<String, Event> {
        &self.inputs
    }

    /// Decodes the payload of input event `name`.
    pub fn input<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<T> {
        let event = self.inputs.get(name).ok_or(EvflowError::Activity(format!("{} has no input event {}", self.activity, name)))?;
        event.payload(self.serializer.as_ref())
    }

    /// Builds an event published by this invocation.
    pub fn event<T: Serialize>(
        &self,
        name: &str,
        payload: &T,
    ) -> Result<Event> {
        self.event_with_delay(name, payload, Duration::ZERO)
    }

    /// Builds an event whose delivery to subscribers is deferred by `delay`.
    pub fn event_with_delay<T: Serialize>(
        &self,
        name: &str,
        payload: &T,
        delay: Duration,
    ) -> Result<Event> {
        Ok(Event {
            id: utils::longid(),
            name: name.to_string(),
            payload: self.serializer.serialize(payload)?,
            payload_type: std::any::type_name::<T>().to_string(),
            delay,
            source_activity: self.activity.clone(),
            source_activity_execution_id: self.activity_execution_id.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, sync::Arc, time::Duration};

    use crate::{
        common::JsonSerializer,
        events::WorkflowExecutionInfo,
        workflow::ActivityContext,
    };

    fn context(
        activity: &str,
        inputs: HashMap<String, crate::events::Event>,
    ) -> ActivityContext {
        ActivityContext::new(WorkflowExecutionInfo::new("wf", "1", "p"), activity, inputs, Arc::new(JsonSerializer))
    }

    #[test]
    fn test_event_reaches_subscriber_input() {
        let upstream = context("a1", HashMap::new());
        let event = upstream.event_with_delay("e1", &vec![1u32, 2, 3], Duration::from_millis(5)).unwrap();
        assert_eq!(event.source_activity, "a1");
        assert_eq!(event.source_activity_execution_id, upstream.activity_execution_id());
        assert_eq!(event.delay, Duration::from_millis(5));

        let downstream = context("a2", HashMap::from([("e1".to_string(), event)]));
        let payload: Vec<u32> = downstream.input("e1").unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_or_mistyped_input() {
        let upstream = context("a1", HashMap::new());
        let event = upstream.event("e1", &"text").unwrap();
        let downstream = context("a2", HashMap::from([("e1".to_string(), event)]));
        assert!(downstream.input::<String>("e2").is_err());
        assert!(downstream.input::<u64>("e1").is_err());
    }

    #[test]
    fn test_fresh_execution_id_per_invocation() {
        assert_ne!(context("a1", HashMap::new()).activity_execution_id(), context("a1", HashMap::new()).activity_execution_id());
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    EvflowError, Result,
    common::{Serializer, SerializerExt},
    events::{ControlMessage, ErrorInfo, ErrorKind, Message, WorkflowExecutionInfo},
    utils,
};

/// A named, typed payload published by an activity.
///
/// The persistence identity of an event is its execution plus its name, so
/// a redelivered or republished event overwrites itself harmlessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub payload: Vec<u8>,
    /// Rust type name of the payload at publish time.
    pub payload_type: String,
    /// Delivery of the event message is deferred by this long.
    pub delay: Duration,
    pub source_activity: String,
    pub source_activity_execution_id: String,
}

impl Event {
    /// Decodes the payload as `T`.
    pub fn payload<T: DeserializeOwned>(
        &self,
        serializer: &dyn Serializer,
    ) -> Result<T> {
        serializer.deserialize(&self.payload).map_err(|e| {
            EvflowError::Convert(format!(
                "event {} carries {} which can not be read as {}: {}",
                self.name,
                self.payload_type,
                std::any::type_name::<T>(),
                e
            ))
        })
    }
}

/// Transport envelope around a published [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub execution: WorkflowExecutionInfo,
    pub event: Event,
}

impl EventMessage {
    pub fn new(
        execution: WorkflowExecutionInfo,
        event: Event,
    ) -> Self {
        Self {
            id: utils::longid(),
            execution,
            event,
        }
    }
}

impl Message for EventMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn execution(&self) -> &WorkflowExecutionInfo {
        &self.execution
    }

    fn delivery_failure(
        &self,
        reason: &str,
    ) -> Option<ControlMessage> {
        let error = ErrorInfo {
            kind: ErrorKind::DeliveryExhausted,
            message: format!("event {} could not be delivered: {}", self.event.name, reason),
            activity: None,
        };
        Some(ControlMessage::error(self.execution.clone(), error))
    }
}

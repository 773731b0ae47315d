use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    events::{Message, WorkflowExecutionInfo},
    utils,
};

/// Directive kinds understood by the control state machine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ControlMessageType {
    ExecuteActivity,
    WorkflowTimeout,
    MultiInputExecuteCheck,
    Error,
}

/// Category of a failure surfaced to the execution status.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// The activity returned an error.
    ActivityFailed,
    /// The activity panicked.
    ActivityPanicked,
    /// The activity factory had nothing for the activity name.
    ActivityNotFound,
    /// The activity published an event it does not declare.
    UndeclaredEvent,
    /// A message was dropped after its last delivery attempt.
    DeliveryExhausted,
    /// The workflow timeout fired before completion.
    Timeout,
}

/// Failure captured as data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub activity: Option<String>,
}

impl ErrorInfo {
    pub fn new(
        kind: ErrorKind,
        message: impl Into<String>,
        activity: Option<&str>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            activity: activity.map(str::to_string),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match &self.activity {
            Some(activity) => write!(f, "{} in {}: {}", self.kind.as_ref(), activity, self.message),
            None => write!(f, "{}: {}", self.kind.as_ref(), self.message),
        }
    }
}

/// Control plane directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub id: String,
    pub execution: WorkflowExecutionInfo,
    pub control_type: ControlMessageType,
    pub target_activity: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl ControlMessage {
    fn new(
        execution: WorkflowExecutionInfo,
        control_type: ControlMessageType,
        target_activity: Option<String>,
        error: Option<ErrorInfo>,
    ) -> Self {
        Self {
            id: utils::longid(),
            execution,
            control_type,
            target_activity,
            error,
        }
    }

    pub fn execute_activity(
        execution: WorkflowExecutionInfo,
        activity: &str,
    ) -> Self {
        Self::new(execution, ControlMessageType::ExecuteActivity, Some(activity.to_string()), None)
    }

    pub fn workflow_timeout(execution: WorkflowExecutionInfo) -> Self {
        Self::new(execution, ControlMessageType::WorkflowTimeout, None, None)
    }

    pub fn multi_input_check(
        execution: WorkflowExecutionInfo,
        activity: &str,
    ) -> Self {
        Self::new(execution, ControlMessageType::MultiInputExecuteCheck, Some(activity.to_string()), None)
    }

    pub fn error(
        execution: WorkflowExecutionInfo,
        error: ErrorInfo,
    ) -> Self {
        let target = error.activity.clone();
        Self::new(execution, ControlMessageType::Error, target, Some(error))
    }
}

impl Message for ControlMessage {
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
        if self.control_type == ControlMessageType::Error {
            return None;
        }
        let message = match &self.target_activity {
            Some(activity) => format!("{} for {} could not be delivered: {}", self.control_type.as_ref(), activity, reason),
            None => format!("{} could not be delivered: {}", self.control_type.as_ref(), reason),
        };
        let error = ErrorInfo::new(ErrorKind::DeliveryExhausted, message, self.target_activity.as_deref());
        Some(ControlMessage::error(self.execution.clone(), error))
    }
}

#[cfg(test)]
mod test {
    use crate::events::{ControlMessage, ControlMessageType, ErrorInfo, ErrorKind, Message, WorkflowExecutionInfo};

    #[test]
    fn test_delivery_failure_targets_activity() {
        let info = WorkflowExecutionInfo::new("wf", "1", "tenant");
        let msg = ControlMessage::execute_activity(info.clone(), "a1");
        let report = msg.delivery_failure("store offline").unwrap();
        assert_eq!(report.control_type, ControlMessageType::Error);
        assert_eq!(report.target_activity.as_deref(), Some("a1"));
        assert_eq!(report.error.unwrap().kind, ErrorKind::DeliveryExhausted);
        assert_eq!(report.execution, info);
    }

    #[test]
    fn test_error_reports_are_not_reported_again() {
        let info = WorkflowExecutionInfo::new("wf", "1", "tenant");
        let msg = ControlMessage::error(info, ErrorInfo::new(ErrorKind::ActivityFailed, "boom", Some("a1")));
        assert!(msg.delivery_failure("store offline").is_none());
    }
}

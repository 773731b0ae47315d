use serde::{Deserialize, Serialize};

use crate::{
    events::{ErrorInfo, WorkflowExecutionInfo},
    store::{Entity, StoreIden},
    utils,
};

/// Lifecycle state of one execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ActivityFailure {
    pub activity: String,
    pub error: ErrorInfo,
}

/// Status record of one execution.
///
/// Keyed by `(partition key, execution id)`. Once `status` is terminal it
/// never changes again.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ExecutionEntity {
    pub info: WorkflowExecutionInfo,
    pub status: ExecutionStatus,
    pub completed_activities: Vec<String>,
    /// Names of every event published so far.
    pub published_events: Vec<String>,
    pub failures: Vec<ActivityFailure>,
    /// Error that ended the execution, if it did not complete.
    pub error: Option<ErrorInfo>,
    pub start_time: i64,
    pub end_time: i64,

    pub etag: String,
    pub expires_at: Option<i64>,
}

impl ExecutionEntity {
    pub fn new(
        info: &WorkflowExecutionInfo,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            info: info.clone(),
            status: ExecutionStatus::Running,
            completed_activities: Vec::new(),
            published_events: Vec::new(),
            failures: Vec::new(),
            error: None,
            start_time: utils::time::time_millis(),
            end_time: 0,
            etag: String::new(),
            expires_at,
        }
    }

    pub fn is_completed(
        &self,
        activity: &str,
    ) -> bool {
        self.completed_activities.iter().any(|a| a == activity)
    }

    pub fn is_failed(
        &self,
        activity: &str,
    ) -> bool {
        self.failures.iter().any(|f| f.activity == activity)
    }

    pub fn has_published(
        &self,
        event: &str,
    ) -> bool {
        self.published_events.iter().any(|e| e == event)
    }

    /// Moves the execution into a terminal status.
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        error: Option<ErrorInfo>,
    ) {
        self.status = status;
        self.error = error;
        self.end_time = utils::time::time_millis();
    }
}

impl Entity for ExecutionEntity {
    fn iden() -> StoreIden {
        StoreIden::Executions
    }

    fn etag(&self) -> &str {
        &self.etag
    }

    fn set_etag(
        &mut self,
        etag: String,
    ) {
        self.etag = etag;
    }

    fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }
}

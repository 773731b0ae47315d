use serde::{Deserialize, Serialize};

use crate::utils;

/// Identity of one workflow run. Immutable for the lifetime of the execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecutionInfo {
    pub workflow_name: String,
    pub workflow_version: String,
    /// Unique per run.
    pub execution_id: String,
    /// Caller supplied shard or tenant identifier.
    pub partition_key: String,
}

impl WorkflowExecutionInfo {
    /// Allocates a new execution of the given workflow.
    pub fn new(
        workflow_name: &str,
        workflow_version: &str,
        partition_key: &str,
    ) -> Self {
        Self {
            workflow_name: workflow_name.to_string(),
            workflow_version: workflow_version.to_string(),
            execution_id: uuid::Uuid::new_v4().to_string(),
            partition_key: partition_key.to_string(),
        }
    }

    /// Key of the deployed definition this execution runs.
    pub fn definition_key(&self) -> String {
        utils::definition_key(&self.workflow_name, &self.workflow_version)
    }

    /// Store partition holding this execution's events.
    pub fn event_partition(&self) -> String {
        format!("{}/{}", self.partition_key, self.execution_id)
    }
}

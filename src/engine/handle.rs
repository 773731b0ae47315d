use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    EvflowError, Result,
    events::WorkflowExecutionInfo,
    store::{
        Store,
        data::{ActivityStateEntity, ExecutionEntity, ExecutionStatus},
    },
    workflow::WorkflowDefinition,
};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Read access to one execution. Reads are eventually consistent with
/// messages still in flight.
#[derive(Clone)]
pub struct ExecutionHandle {
    info: WorkflowExecutionInfo,
    definition: Arc<WorkflowDefinition>,
    store: Store,
}

impl ExecutionHandle {
    pub(crate) fn new(
        info: WorkflowExecutionInfo,
        definition: Arc<WorkflowDefinition>,
        store: Store,
    ) -> Self {
        Self {
            info,
            definition,
            store,
        }
    }

    pub fn info(&self) -> &WorkflowExecutionInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.execution_id
    }

    pub fn definition(&self) -> Arc<WorkflowDefinition> {
        self.definition.clone()
    }

    pub async fn execution(&self) -> Result<ExecutionEntity> {
        Ok(self.store.executions().get(&self.info.partition_key, &self.info.execution_id).await?)
    }

    pub async fn status(&self) -> Result<ExecutionStatus> {
        Ok(self.execution().await?.status)
    }

    /// Join state of every activity that has received at least one input.
    pub async fn activity_states(&self) -> Result<HashMap<String, ActivityStateEntity>> {
        let activities = self.definition.activities().to_vec();
        Ok(self.store.activities().get_many(&self.info.execution_id, &activities).await?)
    }

    /// Polls until the execution reaches a terminal status.
    pub async fn wait(
        &self,
        timeout: Duration,
    ) -> Result<ExecutionEntity> {
        let poll = async {
            loop {
                let execution = self.execution().await?;
                if execution.status.is_terminal() {
                    return Ok::<_, EvflowError>(execution);
                }
                tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| EvflowError::Engine(format!("execution {} still running after {:?}", self.info.execution_id, timeout)))?
    }
}

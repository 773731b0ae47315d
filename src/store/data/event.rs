use serde::{Deserialize, Serialize};

use crate::{
    events::{Event, WorkflowExecutionInfo},
    store::{Entity, StoreIden},
    utils,
};

/// Persisted form of an [`Event`].
///
/// Keyed by `(execution.event_partition(), event name)`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EventEntity {
    pub execution_id: String,
    pub partition_key: String,
    pub event: Event,

    pub etag: String,
    pub expires_at: Option<i64>,
    pub timestamp: i64,
}

impl EventEntity {
    pub fn new(
        execution: &WorkflowExecutionInfo,
        event: Event,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            execution_id: execution.execution_id.clone(),
            partition_key: execution.partition_key.clone(),
            event,
            etag: String::new(),
            expires_at,
            timestamp: utils::time::time_millis(),
        }
    }
}

impl Entity for EventEntity {
    fn iden() -> StoreIden {
        StoreIden::Events
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

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    store::{Entity, StoreIden},
    utils,
};

/// Join state of one activity within one execution.
///
/// Keyed by `(execution id, activity name)`. `available_input_events` only
/// grows and never holds duplicates.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ActivityStateEntity {
    pub execution_id: String,
    pub activity: String,
    pub available_input_events: Vec<String>,

    pub etag: String,
    pub expires_at: Option<i64>,
    pub timestamp: i64,
}

impl ActivityStateEntity {
    pub fn new(
        execution_id: &str,
        activity: &str,
        expires_at: Option<i64>,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            activity: activity.to_string(),
            available_input_events: Vec::new(),
            etag: String::new(),
            expires_at,
            timestamp: utils::time::time_millis(),
        }
    }

    pub fn has_input(
        &self,
        event: &str,
    ) -> bool {
        self.available_input_events.iter().any(|e| e == event)
    }

    /// Records an arrival. Returns false when the event was already recorded.
    pub fn add_input(
        &mut self,
        event: &str,
    ) -> bool {
        if self.has_input(event) {
            return false;
        }
        self.available_input_events.push(event.to_string());
        self.timestamp = utils::time::time_millis();
        true
    }

    /// Whether the recorded inputs are exactly the required subscriptions.
    pub fn is_ready(
        &self,
        required: &BTreeSet<String>,
    ) -> bool {
        self.available_input_events.len() == required.len() && required.iter().all(|e| self.has_input(e))
    }
}

impl Entity for ActivityStateEntity {
    fn iden() -> StoreIden {
        StoreIden::Activities
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

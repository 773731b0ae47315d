use std::sync::Arc;

use tracing::trace;

use crate::{
    Result,
    dispatcher::Dispatcher,
    events::{Event, EventMessage, WorkflowExecutionInfo},
    store::data::EventEntity,
};

/// Persists published events, then hands them to the event transport.
pub struct EventPublisher {
    dispatcher: Arc<Dispatcher>,
}

impl EventPublisher {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
        }
    }

    /// Publishing the same event twice overwrites the stored copy.
    pub async fn publish(
        &self,
        execution: &WorkflowExecutionInfo,
        event: Event,
    ) -> Result<()> {
        let entity = EventEntity::new(execution, event.clone(), self.dispatcher.expires_at());
        self.dispatcher.store.events().upsert(&execution.event_partition(), &event.name, entity).await?;

        trace!("execution {} published {} from {}", execution.execution_id, event.name, event.source_activity);
        let delay = event.delay;
        self.dispatcher.events.send_with_delay(EventMessage::new(execution.clone(), event), delay).await
    }
}

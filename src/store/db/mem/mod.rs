mod collect;

use std::sync::Arc;

use crate::store::{
    EntityStore,
    data::{ActivityStateEntity, EventEntity, ExecutionEntity},
};

pub use collect::MemCollection;

#[derive(Clone)]
pub struct MemStore {
    events: Arc<MemCollection<EventEntity>>,
    activities: Arc<MemCollection<ActivityStateEntity>>,
    executions: Arc<MemCollection<ExecutionEntity>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(MemCollection::new()),
            activities: Arc::new(MemCollection::new()),
            executions: Arc::new(MemCollection::new()),
        }
    }

    pub fn events(&self) -> Arc<dyn EntityStore<EventEntity>> {
        self.events.clone()
    }

    pub fn activities(&self) -> Arc<dyn EntityStore<ActivityStateEntity>> {
        self.activities.clone()
    }

    pub fn executions(&self) -> Arc<dyn EntityStore<ExecutionEntity>> {
        self.executions.clone()
    }
}

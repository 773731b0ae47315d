use std::sync::Arc;

use crate::{
    EvflowError, Result, StoreConfig, StoreType,
    common::{JsonSerializer, Serializer},
    store::{
        EntityStore, MemStore, PostgresStore,
        data::{ActivityStateEntity, EventEntity, ExecutionEntity},
    },
};

/// Typed access to every collection the engine persists.
#[derive(Clone)]
pub struct Store {
    events: Arc<dyn EntityStore<EventEntity>>,
    activities: Arc<dyn EntityStore<ActivityStateEntity>>,
    executions: Arc<dyn EntityStore<ExecutionEntity>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::mem()
    }
}

impl Store {
    pub fn new(
        events: Arc<dyn EntityStore<EventEntity>>,
        activities: Arc<dyn EntityStore<ActivityStateEntity>>,
        executions: Arc<dyn EntityStore<ExecutionEntity>>,
    ) -> Self {
        Self {
            events,
            activities,
            executions,
        }
    }

    /// Store backed by process memory.
    pub fn mem() -> Self {
        MemStore::new().into()
    }

    /// Opens the store described by `config`.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        match config.store_type {
            StoreType::Mem => Ok(Self::mem()),
            StoreType::Postgres => {
                let postgres =
                    config.postgres.as_ref().ok_or(EvflowError::Config("postgres configuration is required when store type is postgres".to_string()))?;
                let serializer: Arc<dyn Serializer> = Arc::new(JsonSerializer);
                let store = PostgresStore::connect(postgres, serializer).await?;
                Ok(store.into())
            }
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

    /// Purges expired entities from every collection.
    pub async fn purge_expired(&self) -> Result<usize> {
        let mut removed = self.events.purge_expired().await?;
        removed += self.activities.purge_expired().await?;
        removed += self.executions.purge_expired().await?;
        Ok(removed)
    }
}

impl From<MemStore> for Store {
    fn from(mem: MemStore) -> Self {
        Self::new(mem.events(), mem.activities(), mem.executions())
    }
}

impl From<PostgresStore> for Store {
    fn from(postgres: PostgresStore) -> Self {
        Self::new(postgres.events(), postgres.activities(), postgres.executions())
    }
}

use std::{sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    PostgresConfig, Result,
    common::Serializer,
    store::{
        EntityStore,
        data::{ActivityStateEntity, EventEntity, ExecutionEntity},
        map_db_err,
    },
};

use super::collection::PostgresCollection;

pub struct PostgresStore {
    events: Arc<PostgresCollection<EventEntity>>,
    activities: Arc<PostgresCollection<ActivityStateEntity>>,
    executions: Arc<PostgresCollection<ExecutionEntity>>,
}

impl PostgresStore {
    /// Connects the pool and creates any missing table.
    pub async fn connect(
        config: &PostgresConfig,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(5))
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(map_db_err)?;

        let events = PostgresCollection::new(pool.clone(), serializer.clone());
        let activities = PostgresCollection::new(pool.clone(), serializer.clone());
        let executions = PostgresCollection::new(pool, serializer);

        events.init().await?;
        activities.init().await?;
        executions.init().await?;
        info!("postgres store ready ({} max connections)", config.max_connections);

        Ok(Self {
            events: Arc::new(events),
            activities: Arc::new(activities),
            executions: Arc::new(executions),
        })
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

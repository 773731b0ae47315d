use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use tracing::trace;

use crate::{
    ShareLock,
    store::{Entity, EntityStore, StoreError, StoreResult},
    utils,
};

type Key = (String, String);

/// In-memory collection of one entity type.
///
/// A single lock guards the whole map, which makes every conditional write
/// trivially atomic.
pub struct MemCollection<E> {
    rows: ShareLock<HashMap<Key, E>>,
}

impl<E: Entity> Default for MemCollection<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemCollection<E> {
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(
        partition: &str,
        key: &str,
    ) -> Key {
        (partition.to_string(), key.to_string())
    }

    fn is_live(
        entity: &E,
        now: i64,
    ) -> bool {
        entity.expires_at().is_none_or(|t| t > now)
    }

    fn stamp(mut entity: E) -> E {
        entity.set_etag(utils::longid());
        entity
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemCollection<E> {
    async fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> StoreResult<E> {
        let rows = self.rows.read().unwrap();
        let now = utils::time::time_millis();
        rows.get(&Self::key(partition, key)).filter(|e| Self::is_live(e, now)).cloned().ok_or_else(|| StoreError::not_found::<E>(partition, key))
    }

    async fn get_or_add(
        &self,
        partition: &str,
        key: &str,
        factory: &(dyn Fn() -> E + Send + Sync),
    ) -> StoreResult<E> {
        let mut rows = self.rows.write().unwrap();
        let now = utils::time::time_millis();
        let k = Self::key(partition, key);
        if let Some(existing) = rows.get(&k).filter(|e| Self::is_live(e, now)) {
            return Ok(existing.clone());
        }
        trace!("mem::get_or_add({}, {}/{}) inserting", E::iden().as_ref(), partition, key);
        let entity = Self::stamp(factory());
        rows.insert(k, entity.clone());
        Ok(entity)
    }

    async fn get_many(
        &self,
        partition: &str,
        keys: &[String],
    ) -> StoreResult<HashMap<String, E>> {
        let rows = self.rows.read().unwrap();
        let now = utils::time::time_millis();
        Ok(keys
            .iter()
            .filter_map(|key| rows.get(&Self::key(partition, key)).filter(|e| Self::is_live(e, now)).map(|e| (key.clone(), e.clone())))
            .collect())
    }

    async fn upsert(
        &self,
        partition: &str,
        key: &str,
        entity: E,
    ) -> StoreResult<E> {
        let mut rows = self.rows.write().unwrap();
        let entity = Self::stamp(entity);
        rows.insert(Self::key(partition, key), entity.clone());
        Ok(entity)
    }

    async fn update(
        &self,
        partition: &str,
        key: &str,
        entity: E,
    ) -> StoreResult<E> {
        let mut rows = self.rows.write().unwrap();
        let now = utils::time::time_millis();
        let k = Self::key(partition, key);
        let matches = rows.get(&k).filter(|e| Self::is_live(e, now)).map(|stored| stored.etag() == entity.etag());
        match matches {
            None => Err(StoreError::not_found::<E>(partition, key)),
            Some(false) => Err(StoreError::etag_mismatch::<E>(partition, key)),
            Some(true) => {
                let entity = Self::stamp(entity);
                rows.insert(k, entity.clone());
                Ok(entity)
            }
        }
    }

    async fn delete(
        &self,
        partition: &str,
        key: &str,
    ) -> StoreResult<()> {
        self.rows.write().unwrap().remove(&Self::key(partition, key));
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let mut rows = self.rows.write().unwrap();
        let now = utils::time::time_millis();
        let before = rows.len();
        rows.retain(|_, e| Self::is_live(e, now));
        Ok(before - rows.len())
    }
}

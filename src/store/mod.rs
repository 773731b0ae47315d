//! Storage layer for execution state.
//!
//! Every stateful component persists through [`EntityStore`], keyed by
//! `(partition, key)` and guarded by ETag optimistic concurrency. Backends:
//! - `MemStore`: In-memory storage for tests and single process use
//! - `PostgresStore`: PostgreSQL for durable, multi process use

pub mod data;
mod db;
mod store;

use std::{collections::HashMap, error::Error};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use strum::AsRefStr;
use thiserror::Error;
use tracing::trace;

pub use db::{MemCollection, MemStore, PostgresCollection, PostgresStore};
pub use store::Store;

/// Expected, recoverable store outcomes that callers branch on.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{collection} entity {partition}/{key} not found")]
    NotFound {
        collection: String,
        partition: String,
        key: String,
    },

    #[error("{collection} entity {partition}/{key} already exists")]
    AlreadyExists {
        collection: String,
        partition: String,
        key: String,
    },

    #[error("{collection} entity {partition}/{key} was modified concurrently")]
    EtagMismatch {
        collection: String,
        partition: String,
        key: String,
    },

    /// Driver, connection or serialization failure. Treated as transient.
    #[error("store backend: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found<E: Entity>(
        partition: &str,
        key: &str,
    ) -> Self {
        StoreError::NotFound {
            collection: E::iden().as_ref().to_string(),
            partition: partition.to_string(),
            key: key.to_string(),
        }
    }

    pub fn etag_mismatch<E: Entity>(
        partition: &str,
        key: &str,
    ) -> Self {
        StoreError::EtagMismatch {
            collection: E::iden().as_ref().to_string(),
            partition: partition.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_etag_mismatch(&self) -> bool {
        matches!(self, StoreError::EtagMismatch { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Maps database errors to StoreError.
fn map_db_err(err: impl Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Identifiers for different storage collections.
#[derive(Debug, Clone, Copy, AsRefStr, PartialEq, Hash, Eq)]
pub enum StoreIden {
    /// Published events per execution.
    #[strum(serialize = "events")]
    Events,
    /// Join state per activity execution.
    #[strum(serialize = "activity_states")]
    Activities,
    /// Execution status records.
    #[strum(serialize = "executions")]
    Executions,
}

/// A persisted record carrying its own concurrency token.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns the collection identifier for this type.
    fn iden() -> StoreIden;

    /// Version token of the stored copy this value was read from.
    fn etag(&self) -> &str;

    fn set_etag(
        &mut self,
        etag: String,
    );

    /// Millisecond timestamp after which the entity is garbage.
    fn expires_at(&self) -> Option<i64>;
}

/// Optimistic-concurrency entity store keyed by `(partition, key)`.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Reads an entity, `NotFound` when absent or expired.
    async fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> StoreResult<E>;

    /// Returns the stored entity or atomically inserts the one built by
    /// `factory`. Concurrent callers all observe the single winner.
    async fn get_or_add(
        &self,
        partition: &str,
        key: &str,
        factory: &(dyn Fn() -> E + Send + Sync),
    ) -> StoreResult<E>;

    /// Reads several keys of one partition. Missing keys are simply absent.
    async fn get_many(
        &self,
        partition: &str,
        keys: &[String],
    ) -> StoreResult<HashMap<String, E>>;

    /// Unconditional write, returns the entity with its fresh etag.
    async fn upsert(
        &self,
        partition: &str,
        key: &str,
        entity: E,
    ) -> StoreResult<E>;

    /// Conditional write. Fails with `EtagMismatch` when `entity.etag()` is
    /// not the stored etag and with `NotFound` when nothing is stored.
    async fn update(
        &self,
        partition: &str,
        key: &str,
        entity: E,
    ) -> StoreResult<E>;

    /// Removes an entity. Deleting a missing entity succeeds.
    async fn delete(
        &self,
        partition: &str,
        key: &str,
    ) -> StoreResult<()>;

    /// Removes every expired entity and returns how many were removed.
    async fn purge_expired(&self) -> StoreResult<usize>;
}

/// Outcome of [`modify`].
#[derive(Debug, Clone)]
pub enum Modified<E> {
    Updated(E),
    Unchanged(E),
}

impl<E> Modified<E> {
    pub fn into_inner(self) -> E {
        match self {
            Modified::Updated(e) | Modified::Unchanged(e) => e,
        }
    }
}

/// Read-modify-write loop over a conditional update.
///
/// `apply` is re-run on a fresh copy after every `EtagMismatch`; returning
/// `false` leaves the entity untouched.
pub async fn modify<E, F>(
    store: &dyn EntityStore<E>,
    partition: &str,
    key: &str,
    mut apply: F,
) -> StoreResult<Modified<E>>
where
    E: Entity,
    F: FnMut(&mut E) -> bool + Send,
{
    loop {
        let mut entity = store.get(partition, key).await?;
        if !apply(&mut entity) {
            return Ok(Modified::Unchanged(entity));
        }
        match store.update(partition, key, entity).await {
            Ok(updated) => return Ok(Modified::Updated(updated)),
            Err(e) if e.is_etag_mismatch() => {
                trace!("store::modify({}, {}/{}) lost a race, retrying", E::iden().as_ref(), partition, key);
            }
            Err(e) => return Err(e),
        }
    }
}

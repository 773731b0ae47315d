use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use sea_query::{
    Alias as SeaAlias, ColumnDef, Cond, ConditionalStatement, Expr as SeaExpr, Iden, Index, OnConflict, PostgresQueryBuilder, Query as SeaQuery, SimpleExpr, Table,
};
use sea_query_binder::SqlxBinder;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::trace;

use crate::{
    Result,
    common::{Serializer, SerializerExt},
    store::{Entity, EntityStore, StoreError, StoreResult, map_db_err},
    utils,
};

/// One table per entity type, rows addressed by `(partition_key, row_key)`.
#[derive(Iden)]
enum CollectionIden {
    PartitionKey,
    RowKey,
    Etag,
    ExpiresAt,
    Data,
    UpdateTime,
}

/// PostgreSQL collection of one entity type.
///
/// Conditional writes are single statements filtered on the etag column, so
/// the database row lock is the arbiter between concurrent writers.
pub struct PostgresCollection<E> {
    pool: PgPool,
    table: String,
    serializer: Arc<dyn Serializer>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> PostgresCollection<E> {
    pub fn new(
        pool: PgPool,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self {
            pool,
            table: E::iden().as_ref().to_string(),
            serializer,
            _entity: PhantomData,
        }
    }

    /// Creates the table and its expiration index when missing.
    pub async fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(self.table())
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::PartitionKey).string().not_null())
                .col(ColumnDef::new(CollectionIden::RowKey).string().not_null())
                .col(ColumnDef::new(CollectionIden::Etag).string().not_null())
                .col(ColumnDef::new(CollectionIden::ExpiresAt).big_integer())
                .col(ColumnDef::new(CollectionIden::Data).binary().not_null())
                .col(ColumnDef::new(CollectionIden::UpdateTime).big_integer().default(0))
                .primary_key(Index::create().col(CollectionIden::PartitionKey).col(CollectionIden::RowKey))
                .build(PostgresQueryBuilder),
            Index::create()
                .name(format!("idx_{}_expires_at", self.table))
                .if_not_exists()
                .table(self.table())
                .col(CollectionIden::ExpiresAt)
                .build(PostgresQueryBuilder),
        ];

        for stmt in sql.iter() {
            sqlx::query(stmt).execute(&self.pool).await.map_err(map_db_err)?;
        }
        Ok(())
    }

    fn table(&self) -> SeaAlias {
        SeaAlias::new(self.table.as_str())
    }

    fn key_cond(
        partition: &str,
        key: &str,
    ) -> Cond {
        Cond::all().add(SeaExpr::col(CollectionIden::PartitionKey).eq(partition)).add(SeaExpr::col(CollectionIden::RowKey).eq(key))
    }

    fn live_cond(now: i64) -> Cond {
        Cond::any().add(SeaExpr::col(CollectionIden::ExpiresAt).is_null()).add(SeaExpr::col(CollectionIden::ExpiresAt).gt(now))
    }

    fn encode(
        &self,
        entity: &E,
    ) -> StoreResult<Vec<u8>> {
        self.serializer.serialize(entity).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn decode(
        &self,
        row: &PgRow,
    ) -> StoreResult<E> {
        let etag: String = row.try_get("etag").map_err(map_db_err)?;
        let data: Vec<u8> = row.try_get("data").map_err(map_db_err)?;
        let mut entity: E = self.serializer.deserialize(&data).map_err(|e| StoreError::Backend(e.to_string()))?;
        entity.set_etag(etag);
        Ok(entity)
    }

    fn row_values(
        &self,
        partition: &str,
        key: &str,
        entity: &E,
    ) -> StoreResult<[SimpleExpr; 6]> {
        Ok([
            partition.into(),
            key.into(),
            entity.etag().into(),
            entity.expires_at().into(),
            self.encode(entity)?.into(),
            utils::time::time_millis().into(),
        ])
    }

    async fn fetch_row(
        &self,
        partition: &str,
        key: &str,
    ) -> StoreResult<Option<E>> {
        let (sql, values) = SeaQuery::select()
            .columns([CollectionIden::RowKey, CollectionIden::Etag, CollectionIden::Data])
            .from(self.table())
            .cond_where(Cond::all().add(Self::key_cond(partition, key)).add(Self::live_cond(utils::time::time_millis())))
            .build_sqlx(PostgresQueryBuilder);

        let row = sqlx::query_with(&sql, values).fetch_optional(&self.pool).await.map_err(map_db_err)?;
        row.map(|r| self.decode(&r)).transpose()
    }

    /// Inserts unless a live row exists. An expired row is replaced.
    async fn try_insert(
        &self,
        partition: &str,
        key: &str,
        entity: &E,
    ) -> StoreResult<bool> {
        let now = utils::time::time_millis();
        let (sql, values) = SeaQuery::insert()
            .into_table(self.table())
            .columns([
                CollectionIden::PartitionKey,
                CollectionIden::RowKey,
                CollectionIden::Etag,
                CollectionIden::ExpiresAt,
                CollectionIden::Data,
                CollectionIden::UpdateTime,
            ])
            .values(self.row_values(partition, key, entity)?)
            .map_err(map_db_err)?
            .on_conflict(
                OnConflict::columns([CollectionIden::PartitionKey, CollectionIden::RowKey])
                    .update_columns([CollectionIden::Etag, CollectionIden::ExpiresAt, CollectionIden::Data, CollectionIden::UpdateTime])
                    .action_and_where(SeaExpr::col((self.table(), CollectionIden::ExpiresAt)).lt(now))
                    .to_owned(),
            )
            .build_sqlx(PostgresQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&self.pool).await.map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for PostgresCollection<E> {
    async fn get(
        &self,
        partition: &str,
        key: &str,
    ) -> StoreResult<E> {
        self.fetch_row(partition, key).await?.ok_or_else(|| StoreError::not_found::<E>(partition, key))
    }

    async fn get_or_add(
        &self,
        partition: &str,
        key: &str,
        factory: &(dyn Fn() -> E + Send + Sync),
    ) -> StoreResult<E> {
        loop {
            if let Some(existing) = self.fetch_row(partition, key).await? {
                return Ok(existing);
            }
            let mut entity = factory();
            entity.set_etag(utils::longid());
            if self.try_insert(partition, key, &entity).await? {
                return Ok(entity);
            }
            trace!("postgres::get_or_add({}, {}/{}) lost the insert, re-reading", self.table, partition, key);
        }
    }

    async fn get_many(
        &self,
        partition: &str,
        keys: &[String],
    ) -> StoreResult<HashMap<String, E>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let (sql, values) = SeaQuery::select()
            .columns([CollectionIden::RowKey, CollectionIden::Etag, CollectionIden::Data])
            .from(self.table())
            .cond_where(
                Cond::all()
                    .add(SeaExpr::col(CollectionIden::PartitionKey).eq(partition))
                    .add(SeaExpr::col(CollectionIden::RowKey).is_in(keys.iter().cloned()))
                    .add(Self::live_cond(utils::time::time_millis())),
            )
            .build_sqlx(PostgresQueryBuilder);

        let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await.map_err(map_db_err)?;
        let mut found = HashMap::with_capacity(rows.len());
        for row in rows.iter() {
            let key: String = row.try_get("row_key").map_err(map_db_err)?;
            found.insert(key, self.decode(row)?);
        }
        Ok(found)
    }

    async fn upsert(
        &self,
        partition: &str,
        key: &str,
        mut entity: E,
    ) -> StoreResult<E> {
        entity.set_etag(utils::longid());
        let (sql, values) = SeaQuery::insert()
            .into_table(self.table())
            .columns([
                CollectionIden::PartitionKey,
                CollectionIden::RowKey,
                CollectionIden::Etag,
                CollectionIden::ExpiresAt,
                CollectionIden::Data,
                CollectionIden::UpdateTime,
            ])
            .values(self.row_values(partition, key, &entity)?)
            .map_err(map_db_err)?
            .on_conflict(
                OnConflict::columns([CollectionIden::PartitionKey, CollectionIden::RowKey])
                    .update_columns([CollectionIden::Etag, CollectionIden::ExpiresAt, CollectionIden::Data, CollectionIden::UpdateTime])
                    .to_owned(),
            )
            .build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&self.pool).await.map_err(map_db_err)?;
        Ok(entity)
    }

    async fn update(
        &self,
        partition: &str,
        key: &str,
        mut entity: E,
    ) -> StoreResult<E> {
        let expected = entity.etag().to_string();
        entity.set_etag(utils::longid());
        let (sql, values) = SeaQuery::update()
            .table(self.table())
            .values([
                (CollectionIden::Etag, entity.etag().into()),
                (CollectionIden::ExpiresAt, entity.expires_at().into()),
                (CollectionIden::Data, self.encode(&entity)?.into()),
                (CollectionIden::UpdateTime, utils::time::time_millis().into()),
            ])
            .cond_where(
                Cond::all()
                    .add(Self::key_cond(partition, key))
                    .add(SeaExpr::col(CollectionIden::Etag).eq(expected))
                    .add(Self::live_cond(utils::time::time_millis())),
            )
            .build_sqlx(PostgresQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&self.pool).await.map_err(map_db_err)?;
        if result.rows_affected() > 0 {
            return Ok(entity);
        }

        match self.fetch_row(partition, key).await? {
            Some(_) => Err(StoreError::etag_mismatch::<E>(partition, key)),
            None => Err(StoreError::not_found::<E>(partition, key)),
        }
    }

    async fn delete(
        &self,
        partition: &str,
        key: &str,
    ) -> StoreResult<()> {
        let (sql, values) = SeaQuery::delete().from_table(self.table()).cond_where(Self::key_cond(partition, key)).build_sqlx(PostgresQueryBuilder);

        sqlx::query_with(&sql, values).execute(&self.pool).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<usize> {
        let (sql, values) = SeaQuery::delete()
            .from_table(self.table())
            .and_where(SeaExpr::col(CollectionIden::ExpiresAt).lt(utils::time::time_millis()))
            .build_sqlx(PostgresQueryBuilder);

        let result = sqlx::query_with(&sql, values).execute(&self.pool).await.map_err(map_db_err)?;
        Ok(result.rows_affected() as usize)
    }
}

use super::sql::{SqlValue, Statement};
use crate::error::{Result, ResultExt as _, WarehouseError};
use chrono::NaiveDate;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column as _, Postgres, Row as _, Transaction, TypeInfo as _};
use std::time::Duration;

/// The relational store the loader and reconciler talk to.
///
/// Statements run inside the open transaction when there is one. `close`
/// releases the connection and must be called on every exit path.
#[allow(async_fn_in_trait)] // driven from a current-thread runtime only
pub trait Store {
    async fn begin(&mut self) -> Result<()>;

    /// Returns the number of affected rows.
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Vec<SqlValue>>>;

    async fn commit(&mut self) -> Result<()>;

    /// No-op without an open transaction.
    async fn rollback(&mut self) -> Result<()>;

    async fn close(self) -> Result<()>
    where
        Self: Sized;

    /// First column of the first row, as an integer.
    async fn fetch_count(&mut self, statement: &Statement) -> Result<i64> {
        let rows = self.fetch_all(statement).await?;
        rows.first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| {
                WarehouseError::Store(format!("Expected a count from: {}", statement.sql))
            })
    }
}

/// PostgreSQL store over a single pooled connection.
pub struct PgStore {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgStore {
    pub async fn connect(options: PgConnectOptions) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("Failed to connect to PostgreSQL (timeout after 10s)")?;
        tracing::debug!("Connected to PostgreSQL");
        Ok(Self { pool, tx: None })
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

fn bind_all<'q>(sql: &'q str, params: &'q [SqlValue]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Int(value) => query.bind(*value),
            SqlValue::SmallInt(value) => query.bind(*value),
            SqlValue::Float(value) => query.bind(*value),
            SqlValue::Text(value) => query.bind(value.as_str()),
            SqlValue::Date(value) => query.bind(*value),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Vec<SqlValue>> {
    row.columns()
        .iter()
        .map(|column| -> Result<SqlValue> {
            let i = column.ordinal();
            let value = match column.type_info().name() {
                "INT2" => row.try_get::<Option<i16>, _>(i)?.map(SqlValue::SmallInt),
                "INT4" => row
                    .try_get::<Option<i32>, _>(i)?
                    .map(|v| SqlValue::Int(i64::from(v))),
                "INT8" => row.try_get::<Option<i64>, _>(i)?.map(SqlValue::Int),
                "FLOAT4" => row
                    .try_get::<Option<f32>, _>(i)?
                    .map(|v| SqlValue::Float(f64::from(v))),
                "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.map(SqlValue::Float),
                "DATE" => row.try_get::<Option<NaiveDate>, _>(i)?.map(SqlValue::Date),
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                    row.try_get::<Option<String>, _>(i)?.map(SqlValue::Text)
                }
                other => {
                    return Err(WarehouseError::Store(format!(
                        "Unsupported column type {other} for '{}'",
                        column.name()
                    )));
                }
            };
            Ok(value.unwrap_or(SqlValue::Null))
        })
        .collect()
}

impl Store for PgStore {
    async fn begin(&mut self) -> Result<()> {
        if self.tx.is_some() {
            return Err(WarehouseError::Consistency(
                "A transaction is already open".to_owned(),
            ));
        }
        self.tx = Some(self.pool.begin().await.context("Failed to begin transaction")?);
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let query = bind_all(&statement.sql, &statement.params);
        let result = match self.tx.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        };
        let result = result.with_context(|| format!("Failed to execute: {}", statement.sql))?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Vec<SqlValue>>> {
        let query = bind_all(&statement.sql, &statement.params);
        let rows = match self.tx.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        };
        let rows = rows.with_context(|| format!("Failed to query: {}", statement.sql))?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            WarehouseError::Consistency("No open transaction to commit".to_owned())
        })?;
        tx.commit().await.context("Failed to commit")
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.context("Failed to roll back")?;
            tracing::warn!("Transaction rolled back");
        }
        Ok(())
    }

    async fn close(mut self) -> Result<()> {
        let rolled_back = self.rollback().await;
        self.pool.close().await;
        tracing::debug!("PostgreSQL connection closed");
        rolled_back
    }
}

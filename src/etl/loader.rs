//! Transactional load of the star schema.
//!
//! A run moves through
//! `Idle -> SchemaReset -> SchemaCreated -> Populated -> Augmented -> Committed`
//! inside one transaction. Any error moves it to `Failed` and rolls the
//! transaction back, so a failed run leaves the previous warehouse intact.

use super::db::Store;
use super::model::CleanedRecord;
use super::schema::{WarehouseSchema, sync_id};
use super::sql::{self, Statement};
use crate::error::{Result, WarehouseError};
use serde::Serialize;

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadState {
    Idle,
    /// Previous tables dropped
    SchemaReset,
    /// Dimension and fact tables exist, empty
    SchemaCreated,
    /// Every cleaned record inserted
    Populated,
    /// Derived release columns filled, indexes built
    Augmented,
    Committed,
    Failed,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::SchemaReset => "SchemaReset",
            Self::SchemaCreated => "SchemaCreated",
            Self::Populated => "Populated",
            Self::Augmented => "Augmented",
            Self::Committed => "Committed",
            Self::Failed => "Failed",
        }
    }

    /// The next state on the happy path.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::SchemaReset),
            Self::SchemaReset => Some(Self::SchemaCreated),
            Self::SchemaCreated => Some(Self::Populated),
            Self::Populated => Some(Self::Augmented),
            Self::Augmented => Some(Self::Committed),
            Self::Committed | Self::Failed => None,
        }
    }

    /// Strictly one step forward, or to `Failed` from any unfinished state.
    pub fn can_transition_to(&self, target: Self) -> bool {
        match (self, target) {
            (Self::Committed | Self::Failed, _) => false,
            (_, Self::Failed) => true,
            (current, target) => current.next() == Some(target),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub rows_loaded: usize,
    pub genre_columns: usize,
    pub category_columns: usize,
    pub indexes_created: usize,
    pub statements_executed: usize,
    pub final_state: LoadState,
}

impl LoadSummary {
    pub fn summary_text(&self) -> String {
        format!(
            "Loaded {} game(s) with {} genre and {} category column(s); {} index(es), {} statement(s), state {}",
            self.rows_loaded,
            self.genre_columns,
            self.category_columns,
            self.indexes_created,
            self.statements_executed,
            self.final_state.as_str()
        )
    }
}

/// Drives one load run against `store`.
pub struct Loader<'a, S: Store> {
    store: &'a mut S,
    schema: &'a WarehouseSchema,
    batch_size: usize,
    state: LoadState,
    statements: usize,
}

impl<'a, S: Store> Loader<'a, S> {
    pub fn new(store: &'a mut S, schema: &'a WarehouseSchema, batch_size: usize) -> Self {
        Self {
            store,
            schema,
            batch_size: batch_size.max(1),
            state: LoadState::Idle,
            statements: 0,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Records loaded per round of three inserts. The same records go to all
    /// three tables in a round, so the widest table decides.
    pub fn rows_per_batch(&self) -> usize {
        let genre_width = 1 + self.schema.genres.len();
        let category_width = 1 + self.schema.categories.len();
        [genre_width, category_width, sql::FACT_PARAMS_PER_ROW]
            .into_iter()
            .map(|width| sql::rows_per_statement(width, self.batch_size))
            .min()
            .unwrap_or(1)
    }

    /// Runs every stage in one transaction. On error the transaction is
    /// rolled back and the loader is left in [`LoadState::Failed`].
    pub async fn run(&mut self, records: &[CleanedRecord]) -> Result<LoadSummary> {
        if self.state != LoadState::Idle {
            return Err(WarehouseError::Consistency(format!(
                "Loader already ran (state {})",
                self.state.as_str()
            )));
        }

        match self.run_stages(records).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    async fn run_stages(&mut self, records: &[CleanedRecord]) -> Result<LoadSummary> {
        self.store.begin().await?;
        self.reset_schema().await?;
        self.create_schema().await?;
        let rows_loaded = self.populate(records).await?;
        let indexes_created = self.augment().await?;
        self.commit().await?;

        Ok(LoadSummary {
            rows_loaded,
            genre_columns: self.schema.genres.len(),
            category_columns: self.schema.categories.len(),
            indexes_created,
            statements_executed: self.statements,
            final_state: self.state,
        })
    }

    fn transition(&mut self, target: LoadState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(WarehouseError::Consistency(format!(
                "Illegal loader transition {} -> {}",
                self.state.as_str(),
                target.as_str()
            )));
        }
        tracing::info!(
            from = self.state.as_str(),
            to = target.as_str(),
            "Loader state change"
        );
        self.state = target;
        Ok(())
    }

    async fn exec(&mut self, statement: &Statement) -> Result<u64> {
        self.statements += 1;
        self.store.execute(statement).await
    }

    pub async fn reset_schema(&mut self) -> Result<()> {
        for statement in sql::drop_tables() {
            self.exec(&statement).await?;
        }
        self.transition(LoadState::SchemaReset)
    }

    pub async fn create_schema(&mut self) -> Result<()> {
        let schema = self.schema;
        self.exec(&sql::create_dimension_table(&schema.genres)).await?;
        self.exec(&sql::create_dimension_table(&schema.categories))
            .await?;
        self.exec(&sql::create_fact_table()).await?;
        self.transition(LoadState::SchemaCreated)
    }

    /// Inserts every record under the next synchronized id, in batches.
    /// Returns the number of records loaded.
    pub async fn populate(&mut self, records: &[CleanedRecord]) -> Result<usize> {
        let schema = self.schema;
        let chunk_size = self.rows_per_batch();

        for (batch, chunk) in records.chunks(chunk_size).enumerate() {
            let start = batch * chunk_size;
            let mut genre_rows = Vec::with_capacity(chunk.len());
            let mut category_rows = Vec::with_capacity(chunk.len());
            let mut fact_rows = Vec::with_capacity(chunk.len());

            for (offset, record) in chunk.iter().enumerate() {
                let id = sync_id(start + offset)?;
                let row = schema.synthesize(id, record)?;
                genre_rows.push(row.genre);
                category_rows.push(row.category);
                fact_rows.push(row.fact);
            }

            self.exec(&sql::insert_dimension_rows(&schema.genres, &genre_rows))
                .await?;
            self.exec(&sql::insert_dimension_rows(
                &schema.categories,
                &category_rows,
            ))
            .await?;
            self.exec(&sql::insert_fact_rows(&fact_rows)).await?;
            tracing::debug!(batch, rows = chunk.len(), "Inserted batch");
        }

        self.transition(LoadState::Populated)?;
        Ok(records.len())
    }

    /// Derived release columns and indexes. Returns the number of indexes.
    pub async fn augment(&mut self) -> Result<usize> {
        self.exec(&sql::add_release_columns()).await?;
        let filled = self.exec(&sql::fill_release_columns()).await?;
        tracing::debug!(rows = filled, "Filled release year and month");

        let indexes = sql::create_indexes(self.schema);
        for statement in &indexes {
            self.exec(statement).await?;
        }
        self.transition(LoadState::Augmented)?;
        Ok(indexes.len())
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.store.commit().await?;
        self.transition(LoadState::Committed)
    }

    async fn fail(&mut self, err: &WarehouseError) {
        tracing::error!(state = self.state.as_str(), "Load failed: {err}");
        if let Err(rollback_err) = self.store.rollback().await {
            tracing::warn!("Rollback after failure also failed: {rollback_err}");
        }
        self.state = LoadState::Failed;
    }
}

#![expect(clippy::unwrap_used)]
use super::db::Store;
use super::model::{CleanedRecord, RawRecord};
use super::sql::{SqlValue, Statement};
use crate::error::{Result, WarehouseError};
use chrono::NaiveDate;
use std::collections::BTreeMap;

mod cleaning;
mod loader;

/// A [`Store`] that records every statement and keeps inserted rows in
/// memory, so that a load can be reconciled without a database.
#[derive(Debug, Default)]
pub(super) struct RecordingStore {
    pub executed: Vec<Statement>,
    pub queries: Vec<Statement>,
    /// Rows per quoted table name, in insert order
    pub tables: BTreeMap<String, Vec<Vec<SqlValue>>>,
    pub in_transaction: bool,
    pub commits: usize,
    pub rollbacks: usize,
    /// Fail any statement whose SQL contains this text
    pub fail_on: Option<String>,
    pub null_rows: i64,
    pub duplicate_groups: i64,
}

impl RecordingStore {
    pub fn failing_on(sql: &str) -> Self {
        Self {
            fail_on: Some(sql.to_owned()),
            ..Default::default()
        }
    }

    pub fn table(&self, name: &str) -> &[Vec<SqlValue>] {
        self.tables
            .get(&format!("\"{name}\""))
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn table_mut(&mut self, name: &str) -> &mut Vec<Vec<SqlValue>> {
        self.tables.entry(format!("\"{name}\"")).or_default()
    }

    fn check_failure(&self, statement: &Statement) -> Result<()> {
        match &self.fail_on {
            Some(needle) if statement.sql.contains(needle.as_str()) => Err(
                WarehouseError::Store(format!("injected failure: {}", statement.sql)),
            ),
            _ => Ok(()),
        }
    }

    fn apply(&mut self, statement: &Statement) {
        let sql = &statement.sql;
        if let Some(table) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
            self.tables.remove(table);
        } else if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
            let table = rest.split_whitespace().next().unwrap().to_owned();
            let open = rest.find('(').unwrap();
            let close = rest.find(')').unwrap();
            let width = rest[open + 1..close].split(", ").count();
            self.tables
                .entry(table)
                .or_default()
                .extend(statement.params.chunks(width).map(<[SqlValue]>::to_vec));
        }
    }

    fn flag_counts(&self, sql: &str) -> Vec<SqlValue> {
        let table = sql.rsplit("FROM ").next().unwrap_or_default();
        let columns = sql.matches("FILTER").count();
        let rows = self.tables.get(table).map_or(&[][..], Vec::as_slice);
        (1..=columns)
            .map(|col| {
                let flagged = rows
                    .iter()
                    .filter(|row| row.get(col) == Some(&SqlValue::SmallInt(1)))
                    .count();
                SqlValue::Int(i64::try_from(flagged).unwrap())
            })
            .collect()
    }
}

impl Store for RecordingStore {
    async fn begin(&mut self) -> Result<()> {
        self.in_transaction = true;
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.check_failure(statement)?;
        self.apply(statement);
        self.executed.push(statement.clone());
        Ok(0)
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Vec<SqlValue>>> {
        self.check_failure(statement)?;
        self.queries.push(statement.clone());
        let sql = &statement.sql;
        let rows = if sql.contains("IS NULL") {
            vec![vec![SqlValue::Int(self.null_rows)]]
        } else if sql.contains("HAVING") {
            vec![vec![SqlValue::Int(self.duplicate_groups)]]
        } else if sql.contains("FILTER") {
            vec![self.flag_counts(sql)]
        } else {
            self.table("fact_games").to_vec()
        };
        Ok(rows)
    }

    async fn commit(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.rollbacks += 1;
            self.tables.clear();
        }
        Ok(())
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A cleaned record with neutral metrics.
pub(super) fn record(genres: &str, categories: &str) -> CleanedRecord {
    CleanedRecord {
        line: 2,
        release_date: date(2020, 1, 15),
        price: 19.99,
        positive_reviews: 120,
        negative_reviews: 7,
        user_score: 87.5,
        metacritic_score: 81,
        average_playtime_forever: 300,
        average_playtime_2weeks: 12,
        median_playtime_forever: 250,
        median_playtime_2weeks: 10,
        genres: genres.to_owned(),
        categories: categories.to_owned(),
    }
}

/// A raw record with every field present and valid.
pub(super) fn raw(line: usize) -> RawRecord {
    let text = |s: &str| Some(s.to_owned());
    RawRecord {
        line,
        release_date: text("2020-01-15"),
        price: text("19.99"),
        positive_reviews: text("120"),
        negative_reviews: text("7"),
        user_score: text("87.5"),
        metacritic_score: text("81"),
        average_playtime_forever: text("300"),
        average_playtime_2weeks: text("12"),
        median_playtime_forever: text("250"),
        median_playtime_2weeks: text("10"),
        genres: text("Action, Indie"),
        categories: text("Single-player"),
    }
}

#[test]
fn test_recording_store_tracks_inserted_rows() {
    let mut store = RecordingStore::default();
    store.apply(&Statement {
        sql: "INSERT INTO \"t\" (\"id\", \"a\") VALUES ($1, $2), ($3, $4)".to_owned(),
        params: vec![
            SqlValue::Int(1),
            SqlValue::SmallInt(0),
            SqlValue::Int(2),
            SqlValue::SmallInt(1),
        ],
    });
    assert_eq!(store.table("t").len(), 2);
    assert_eq!(
        store.flag_counts("SELECT COUNT(*) FILTER (WHERE \"a\" = 1) FROM \"t\""),
        vec![SqlValue::Int(1)]
    );
}

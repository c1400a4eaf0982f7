//! Post-load reconciliation: re-derive what each fact row should hold from the
//! cleaned records and compare it with what the store returns, then audit
//! the tables for nulls, duplicates and label frequencies.

use super::cleaning::round_to_cents;
use super::db::Store;
use super::model::CleanedRecord;
use super::naming::{Identifier, Label};
use super::schema::{ColumnSet, WarehouseSchema};
use super::sql::{self, FACT_PARAMS_PER_ROW, SqlValue};
use crate::error::{Result, WarehouseError};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Write as _};

/// Mismatches listed individually in the rendered report.
const MAX_LISTED_MISMATCHES: usize = 20;

/// The comparable values of one fact row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactTuple {
    /// ISO `YYYY-MM-DD`
    pub release_date: Option<String>,
    pub price: Option<f64>,
    pub positive_reviews: Option<i64>,
    pub negative_reviews: Option<i64>,
    pub user_score: Option<f64>,
    pub metacritic_score: Option<i64>,
    pub average_playtime_forever: Option<i64>,
    pub average_playtime_2weeks: Option<i64>,
    pub median_playtime_forever: Option<i64>,
    pub median_playtime_2weeks: Option<i64>,
}

impl fmt::Display for FactTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn cell<T: fmt::Display>(value: Option<&T>) -> String {
            value.map_or_else(|| "NULL".to_owned(), ToString::to_string)
        }
        write!(
            f,
            "({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
            cell(self.release_date.as_ref()),
            cell(self.price.as_ref()),
            cell(self.positive_reviews.as_ref()),
            cell(self.negative_reviews.as_ref()),
            cell(self.user_score.as_ref()),
            cell(self.metacritic_score.as_ref()),
            cell(self.average_playtime_forever.as_ref()),
            cell(self.average_playtime_2weeks.as_ref()),
            cell(self.median_playtime_forever.as_ref()),
            cell(self.median_playtime_2weeks.as_ref())
        )
    }
}

/// A fact row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedFact {
    pub id: i64,
    pub category_id: Option<i64>,
    pub genre_id: Option<i64>,
    pub values: FactTuple,
}

impl PersistedFact {
    /// Decodes a row shaped like [`sql::select_fact_rows`].
    pub fn from_row(row: &[SqlValue]) -> Result<Self> {
        let [
            id,
            category_id,
            genre_id,
            release_date,
            price,
            positive_reviews,
            negative_reviews,
            user_score,
            metacritic_score,
            average_playtime_forever,
            average_playtime_2weeks,
            median_playtime_forever,
            median_playtime_2weeks,
        ] = row
        else {
            return Err(WarehouseError::Store(format!(
                "Fact row has {} column(s), expected {FACT_PARAMS_PER_ROW}",
                row.len()
            )));
        };

        let id = id
            .as_i64()
            .ok_or_else(|| WarehouseError::Store(format!("Fact row without an id: {id:?}")))?;

        Ok(Self {
            id,
            category_id: category_id.as_i64(),
            genre_id: genre_id.as_i64(),
            values: FactTuple {
                release_date: release_date
                    .as_date()
                    .map(|date| date.format("%Y-%m-%d").to_string()),
                price: price.as_f64(),
                positive_reviews: positive_reviews.as_i64(),
                negative_reviews: negative_reviews.as_i64(),
                user_score: user_score.as_f64(),
                metacritic_score: metacritic_score.as_i64(),
                average_playtime_forever: average_playtime_forever.as_i64(),
                average_playtime_2weeks: average_playtime_2weeks.as_i64(),
                median_playtime_forever: median_playtime_forever.as_i64(),
                median_playtime_2weeks: median_playtime_2weeks.as_i64(),
            },
        })
    }
}

/// What the fact row for `record` should hold. The two `NUMERIC` columns
/// come back rounded to cents.
pub fn expected_tuple(record: &CleanedRecord) -> FactTuple {
    FactTuple {
        release_date: Some(record.release_date.format("%Y-%m-%d").to_string()),
        price: Some(round_to_cents(record.price)),
        positive_reviews: Some(record.positive_reviews),
        negative_reviews: Some(record.negative_reviews),
        user_score: Some(round_to_cents(record.user_score)),
        metacritic_score: Some(record.metacritic_score),
        average_playtime_forever: Some(record.average_playtime_forever),
        average_playtime_2weeks: Some(record.average_playtime_2weeks),
        median_playtime_forever: Some(record.median_playtime_forever),
        median_playtime_2weeks: Some(record.median_playtime_2weeks),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowMismatch {
    pub id: i64,
    pub persisted: FactTuple,
    pub expected: FactTuple,
}

/// Outcome of comparing persisted fact rows against the cleaned records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffReport {
    pub compared: usize,
    pub matched: usize,
    pub mismatches: Vec<RowMismatch>,
    /// Persisted ids with no cleaned record at `id - 1`
    pub orphaned_ids: Vec<i64>,
    /// Ids `1..=N` that were never persisted
    pub missing_ids: Vec<i64>,
    /// Rows where `genre_id` or `category_id` differs from `id`
    pub unsynchronized_ids: Vec<i64>,
}

impl DiffReport {
    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0
    }

    pub fn finding_count(&self) -> usize {
        self.mismatches.len()
            + self.orphaned_ids.len()
            + self.missing_ids.len()
            + self.unsynchronized_ids.len()
    }
}

/// Compares each persisted row with the cleaned record at `id - 1`.
pub fn compare(persisted: &[PersistedFact], records: &[CleanedRecord]) -> DiffReport {
    let mut report = DiffReport::default();
    let mut seen = HashSet::with_capacity(persisted.len());

    for row in persisted {
        seen.insert(row.id);
        if row.genre_id != Some(row.id) || row.category_id != Some(row.id) {
            report.unsynchronized_ids.push(row.id);
        }

        let record = usize::try_from(row.id - 1)
            .ok()
            .and_then(|position| records.get(position));
        let Some(record) = record else {
            report.orphaned_ids.push(row.id);
            continue;
        };

        report.compared += 1;
        let expected = expected_tuple(record);
        if row.values == expected {
            report.matched += 1;
        } else {
            report.mismatches.push(RowMismatch {
                id: row.id,
                persisted: row.values.clone(),
                expected,
            });
        }
    }

    report.missing_ids = (1..=records.len())
        .filter_map(|position| i64::try_from(position).ok())
        .filter(|id| !seen.contains(id))
        .collect();

    report
}

pub async fn fetch_fact_rows<S: Store>(store: &mut S) -> Result<Vec<PersistedFact>> {
    let rows = store.fetch_all(&sql::select_fact_rows()).await?;
    rows.iter().map(|row| PersistedFact::from_row(row)).collect()
}

/// Rows of `table` with any of `columns` null.
pub async fn count_nulls<S: Store>(
    store: &mut S,
    table: &Identifier,
    columns: &[Identifier],
) -> Result<i64> {
    store.fetch_count(&sql::count_nulls(table, columns)).await
}

/// Groups of rows of `table` identical over `columns`, with more than one
/// member.
pub async fn count_duplicate_groups<S: Store>(
    store: &mut S,
    table: &Identifier,
    columns: &[Identifier],
) -> Result<i64> {
    store
        .fetch_count(&sql::count_duplicate_groups(table, columns))
        .await
}

/// Number of rows flagged for each label of one dimension table.
pub async fn count_label_occurrences<S: Store>(
    store: &mut S,
    columns: &ColumnSet,
) -> Result<BTreeMap<Label, i64>> {
    let Some(statement) = sql::count_flags(columns) else {
        return Ok(BTreeMap::new());
    };
    let rows = store.fetch_all(&statement).await?;
    let counts = rows.first().ok_or_else(|| {
        WarehouseError::Store(format!("No counts returned for {}", columns.table()))
    })?;

    columns
        .columns()
        .iter()
        .zip(counts)
        .map(|(flag, count)| -> Result<(Label, i64)> {
            let count = count.as_i64().ok_or_else(|| {
                WarehouseError::Store(format!("Non-integer count for {}", flag.column))
            })?;
            Ok((flag.label.clone(), count))
        })
        .collect()
}

/// Everything reconciliation found about one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub diff: DiffReport,
    pub null_rows: i64,
    pub duplicate_groups: i64,
    pub genre_counts: BTreeMap<Label, i64>,
    pub category_counts: BTreeMap<Label, i64>,
}

impl ValidationReport {
    pub fn finding_count(&self) -> usize {
        let audit = usize::try_from(self.null_rows.max(0) + self.duplicate_groups.max(0))
            .unwrap_or(usize::MAX);
        self.diff.finding_count().saturating_add(audit)
    }

    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0
    }

    /// Human-readable report, one finding per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let diff = &self.diff;

        if diff.mismatches.is_empty() {
            let _ = writeln!(out, "All {} rows match successfully.", diff.matched);
        } else {
            for mismatch in diff.mismatches.iter().take(MAX_LISTED_MISMATCHES) {
                let _ = writeln!(out, "Mismatch found in row {}:", mismatch.id);
                let _ = writeln!(out, "  Database: {}", mismatch.persisted);
                let _ = writeln!(out, "  Expected: {}", mismatch.expected);
            }
            if diff.mismatches.len() > MAX_LISTED_MISMATCHES {
                let _ = writeln!(
                    out,
                    "... and {} more mismatch(es)",
                    diff.mismatches.len() - MAX_LISTED_MISMATCHES
                );
            }
            let _ = writeln!(
                out,
                "{} of {} rows match; {} do not.",
                diff.matched,
                diff.compared,
                diff.mismatches.len()
            );
        }

        for (what, ids) in [
            ("persisted row(s) without a cleaned record", &diff.orphaned_ids),
            ("cleaned record(s) never persisted", &diff.missing_ids),
            ("row(s) with unsynchronized ids", &diff.unsynchronized_ids),
        ] {
            if !ids.is_empty() {
                let _ = writeln!(out, "Found {} {what}: {}", ids.len(), preview(ids));
            }
        }

        if self.null_rows > 0 {
            let _ = writeln!(out, "There are {} NULL values in the database.", self.null_rows);
        } else {
            let _ = writeln!(out, "No NULL values found in the database.");
        }

        if self.duplicate_groups > 0 {
            let _ = writeln!(
                out,
                "Found {} duplicate entries in the database.",
                self.duplicate_groups
            );
        } else {
            let _ = writeln!(out, "No duplicate entries found in the database.");
        }

        for (table, counts) in [
            (sql::GENRE_TABLE, &self.genre_counts),
            (sql::CATEGORY_TABLE, &self.category_counts),
        ] {
            let _ = writeln!(out, "Counting '1s' in {} columns:", table.as_str());
            for (label, count) in counts {
                let _ = writeln!(out, "  {label}: {count}");
            }
        }

        out
    }
}

fn preview(ids: &[i64]) -> String {
    let shown: Vec<String> = ids
        .iter()
        .take(MAX_LISTED_MISMATCHES)
        .map(ToString::to_string)
        .collect();
    if ids.len() > shown.len() {
        format!("{}, ...", shown.join(", "))
    } else {
        shown.join(", ")
    }
}

/// Reads the warehouse back and checks it against `records`.
pub async fn reconcile<S: Store>(
    store: &mut S,
    schema: &WarehouseSchema,
    records: &[CleanedRecord],
) -> Result<ValidationReport> {
    let persisted = fetch_fact_rows(store).await?;
    let diff = compare(&persisted, records);
    let null_rows = count_nulls(store, &sql::FACT_TABLE, &sql::metric_columns()).await?;
    let duplicate_groups =
        count_duplicate_groups(store, &sql::FACT_TABLE, &sql::semantic_fact_columns()).await?;
    let genre_counts = count_label_occurrences(store, &schema.genres).await?;
    let category_counts = count_label_occurrences(store, &schema.categories).await?;

    let report = ValidationReport {
        diff,
        null_rows,
        duplicate_groups,
        genre_counts,
        category_counts,
    };

    if report.is_clean() {
        tracing::info!(rows = report.diff.matched, "Reconciliation clean");
    } else {
        tracing::warn!(
            mismatches = report.diff.mismatches.len(),
            orphaned = report.diff.orphaned_ids.len(),
            missing = report.diff.missing_ids.len(),
            unsynchronized = report.diff.unsynchronized_ids.len(),
            null_rows = report.null_rows,
            duplicate_groups = report.duplicate_groups,
            "Reconciliation found {} problem(s)",
            report.finding_count()
        );
    }

    Ok(report)
}

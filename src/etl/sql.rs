//! SQL text for the warehouse, kept apart from execution so that the
//! generated statements can be inspected without a database.
//!
//! Every table, column and index name is an [`Identifier`], whose `Display`
//! is the double-quoted form. Values always travel as bound parameters.

use super::model::{
    AVERAGE_PLAYTIME_2WEEKS, AVERAGE_PLAYTIME_FOREVER, MEDIAN_PLAYTIME_2WEEKS,
    MEDIAN_PLAYTIME_FOREVER, METACRITIC_SCORE, NEGATIVE_REVIEWS, POSITIVE_REVIEWS, PRICE,
    RELEASE_DATE, USER_SCORE,
};
use super::naming::Identifier;
use super::schema::{ColumnSet, DimensionRow, FactRow, WarehouseSchema};
use chrono::NaiveDate;
use std::fmt::Write as _;

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub const FACT_TABLE: Identifier = Identifier::fixed("fact_games");
pub const GENRE_TABLE: Identifier = Identifier::fixed("dim_genre_set");
pub const CATEGORY_TABLE: Identifier = Identifier::fixed("dim_category_set");

pub const ID: Identifier = Identifier::fixed("id");
pub const CATEGORY_ID: Identifier = Identifier::fixed("category_id");
pub const GENRE_ID: Identifier = Identifier::fixed("genre_id");
pub const RELEASE_YEAR: Identifier = Identifier::fixed("release_year");
pub const RELEASE_MONTH: Identifier = Identifier::fixed("release_month");

pub const IDX_USER_PLAYTIME: Identifier = Identifier::fixed("idx_games_user_playtime_id");
pub const IDX_RELEASE_PERIOD: Identifier = Identifier::fixed("idx_games_release_year_month");

/// Number of metric columns in the fact table.
pub const FACT_METRIC_COUNT: usize = 10;

/// Metric columns of the fact table in insert order, with their SQL types.
/// Metric columns are nullable; the reconciler audits them.
pub const FACT_METRICS: [(Identifier, &str); FACT_METRIC_COUNT] = [
    (Identifier::fixed(RELEASE_DATE), "DATE"),
    (Identifier::fixed(PRICE), "NUMERIC(10, 2)"),
    (Identifier::fixed(POSITIVE_REVIEWS), "INTEGER"),
    (Identifier::fixed(NEGATIVE_REVIEWS), "INTEGER"),
    (Identifier::fixed(USER_SCORE), "NUMERIC(5, 2)"),
    (Identifier::fixed(METACRITIC_SCORE), "INTEGER"),
    (Identifier::fixed(AVERAGE_PLAYTIME_FOREVER), "INTEGER"),
    (Identifier::fixed(AVERAGE_PLAYTIME_2WEEKS), "INTEGER"),
    (Identifier::fixed(MEDIAN_PLAYTIME_FOREVER), "INTEGER"),
    (Identifier::fixed(MEDIAN_PLAYTIME_2WEEKS), "INTEGER"),
];

/// `id`, both foreign keys, then the metrics.
pub const FACT_PARAMS_PER_ROW: usize = 3 + FACT_METRIC_COUNT;

/// Every compile-time identifier used by the warehouse.
pub fn fixed_identifiers() -> Vec<Identifier> {
    let mut identifiers = vec![
        FACT_TABLE,
        GENRE_TABLE,
        CATEGORY_TABLE,
        ID,
        CATEGORY_ID,
        GENRE_ID,
        RELEASE_YEAR,
        RELEASE_MONTH,
        IDX_USER_PLAYTIME,
        IDX_RELEASE_PERIOD,
    ];
    identifiers.extend(FACT_METRICS.into_iter().map(|(column, _)| column));
    identifiers
}

/// Metric columns only, in insert order.
pub fn metric_columns() -> Vec<Identifier> {
    FACT_METRICS.into_iter().map(|(column, _)| column).collect()
}

/// Columns that identify a game semantically: foreign keys plus metrics.
pub fn semantic_fact_columns() -> Vec<Identifier> {
    let mut columns = vec![CATEGORY_ID, GENRE_ID];
    columns.extend(metric_columns());
    columns
}

/// A bound parameter, or a decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    SmallInt(i16),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::SmallInt(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            Self::SmallInt(value) => Some(f64::from(*value)),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            Self::Text(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<bool> for SqlValue {
    fn from(flag: bool) -> Self {
        Self::SmallInt(i16::from(flag))
    }
}

/// One SQL statement with its positional (`$n`) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// How many rows fit in one insert, given `batch_size` and the bind
/// parameter ceiling. Never less than one.
pub fn rows_per_statement(params_per_row: usize, batch_size: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / params_per_row.max(1);
    batch_size.min(by_params).max(1)
}

fn join(columns: &[Identifier]) -> String {
    columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fact first: it holds the foreign keys.
pub fn drop_tables() -> Vec<Statement> {
    [FACT_TABLE, GENRE_TABLE, CATEGORY_TABLE]
        .iter()
        .map(|table| Statement::new(format!("DROP TABLE IF EXISTS {table}")))
        .collect()
}

pub fn create_dimension_table(columns: &ColumnSet) -> Statement {
    let mut sql = format!("CREATE TABLE {} ({ID} INTEGER PRIMARY KEY", columns.table());
    for flag in columns.columns() {
        let _ = write!(sql, ", {} SMALLINT NOT NULL DEFAULT 0", flag.column);
    }
    sql.push(')');
    Statement::new(sql)
}

pub fn create_fact_table() -> Statement {
    let mut sql = format!(
        "CREATE TABLE {FACT_TABLE} ({ID} INTEGER PRIMARY KEY, \
         {CATEGORY_ID} INTEGER NOT NULL REFERENCES {CATEGORY_TABLE} ({ID}), \
         {GENRE_ID} INTEGER NOT NULL REFERENCES {GENRE_TABLE} ({ID})"
    );
    for (column, sql_type) in &FACT_METRICS {
        let _ = write!(sql, ", {column} {sql_type}");
    }
    sql.push(')');
    Statement::new(sql)
}

/// `VALUES ($1, $2), ($3, $4), ...` for `rows` rows of `width` parameters.
fn values_clause(rows: usize, width: usize) -> String {
    let mut clause = String::from("VALUES ");
    for row in 0..rows {
        if row > 0 {
            clause.push_str(", ");
        }
        clause.push('(');
        for col in 0..width {
            if col > 0 {
                clause.push_str(", ");
            }
            let _ = write!(clause, "${}", row * width + col + 1);
        }
        clause.push(')');
    }
    clause
}

pub fn insert_dimension_rows(columns: &ColumnSet, rows: &[DimensionRow]) -> Statement {
    let mut names = vec![ID];
    names.extend(columns.columns().iter().map(|flag| flag.column.clone()));

    let mut params = Vec::with_capacity(rows.len() * names.len());
    for row in rows {
        params.push(SqlValue::from(row.id));
        params.extend(row.flags.iter().copied().map(SqlValue::from));
    }

    Statement {
        sql: format!(
            "INSERT INTO {} ({}) {}",
            columns.table(),
            join(&names),
            values_clause(rows.len(), names.len())
        ),
        params,
    }
}

pub fn insert_fact_rows(rows: &[FactRow]) -> Statement {
    let mut names = vec![ID, CATEGORY_ID, GENRE_ID];
    names.extend(metric_columns());

    let mut params = Vec::with_capacity(rows.len() * FACT_PARAMS_PER_ROW);
    for row in rows {
        params.extend([
            SqlValue::from(row.id),
            SqlValue::from(row.category_id),
            SqlValue::from(row.genre_id),
            SqlValue::from(row.release_date),
            SqlValue::from(row.price),
            SqlValue::from(row.positive_reviews),
            SqlValue::from(row.negative_reviews),
            SqlValue::from(row.user_score),
            SqlValue::from(row.metacritic_score),
            SqlValue::from(row.average_playtime_forever),
            SqlValue::from(row.average_playtime_2weeks),
            SqlValue::from(row.median_playtime_forever),
            SqlValue::from(row.median_playtime_2weeks),
        ]);
    }

    Statement {
        sql: format!(
            "INSERT INTO {FACT_TABLE} ({}) {}",
            join(&names),
            values_clause(rows.len(), FACT_PARAMS_PER_ROW)
        ),
        params,
    }
}

pub fn add_release_columns() -> Statement {
    Statement::new(format!(
        "ALTER TABLE {FACT_TABLE} ADD COLUMN {RELEASE_YEAR} INTEGER, \
         ADD COLUMN {RELEASE_MONTH} INTEGER"
    ))
}

pub fn fill_release_columns() -> Statement {
    let release_date = Identifier::fixed(RELEASE_DATE);
    Statement::new(format!(
        "UPDATE {FACT_TABLE} SET \
         {RELEASE_YEAR} = EXTRACT(YEAR FROM {release_date})::INTEGER, \
         {RELEASE_MONTH} = EXTRACT(MONTH FROM {release_date})::INTEGER"
    ))
}

fn create_index(name: &Identifier, table: &Identifier, columns: &[Identifier]) -> Statement {
    Statement::new(format!(
        "CREATE INDEX {name} ON {table} ({})",
        join(columns)
    ))
}

/// The two fact indexes, then one per flag column of each dimension.
pub fn create_indexes(schema: &WarehouseSchema) -> Vec<Statement> {
    let mut statements = vec![
        create_index(
            &IDX_USER_PLAYTIME,
            &FACT_TABLE,
            &[
                Identifier::fixed(USER_SCORE),
                Identifier::fixed(AVERAGE_PLAYTIME_FOREVER),
                ID,
            ],
        ),
        create_index(
            &IDX_RELEASE_PERIOD,
            &FACT_TABLE,
            &[RELEASE_YEAR, RELEASE_MONTH],
        ),
    ];
    for columns in [&schema.genres, &schema.categories] {
        statements.extend(columns.columns().iter().map(|flag| {
            create_index(&flag.index, columns.table(), std::slice::from_ref(&flag.column))
        }));
    }
    statements
}

/// Fact rows ordered by id. Numeric columns come back as `DOUBLE PRECISION`
/// so that they decode as plain floats.
pub fn select_fact_rows() -> Statement {
    let mut select = vec![ID.to_string(), CATEGORY_ID.to_string(), GENRE_ID.to_string()];
    for (column, sql_type) in &FACT_METRICS {
        if sql_type.starts_with("NUMERIC") {
            select.push(format!("{column}::DOUBLE PRECISION"));
        } else {
            select.push(column.to_string());
        }
    }
    Statement::new(format!(
        "SELECT {} FROM {FACT_TABLE} ORDER BY {ID}",
        select.join(", ")
    ))
}

pub fn count_nulls(table: &Identifier, columns: &[Identifier]) -> Statement {
    if columns.is_empty() {
        return Statement::new("SELECT 0::BIGINT");
    }
    let condition = columns
        .iter()
        .map(|column| format!("{column} IS NULL"))
        .collect::<Vec<_>>()
        .join(" OR ");
    Statement::new(format!("SELECT COUNT(*) FROM {table} WHERE {condition}"))
}

pub fn count_duplicate_groups(table: &Identifier, columns: &[Identifier]) -> Statement {
    if columns.is_empty() {
        return Statement::new("SELECT 0::BIGINT");
    }
    Statement::new(format!(
        "SELECT COUNT(*) FROM (SELECT 1 FROM {table} GROUP BY {} HAVING COUNT(*) > 1) AS dup",
        join(columns)
    ))
}

/// One `COUNT(*) FILTER` per flag column, in column order. `None` for a
/// dimension without flags.
pub fn count_flags(columns: &ColumnSet) -> Option<Statement> {
    if columns.is_empty() {
        return None;
    }
    let counts = columns
        .columns()
        .iter()
        .map(|flag| format!("COUNT(*) FILTER (WHERE {} = 1)", flag.column))
        .collect::<Vec<_>>()
        .join(", ");
    Some(Statement::new(format!(
        "SELECT {counts} FROM {}",
        columns.table()
    )))
}

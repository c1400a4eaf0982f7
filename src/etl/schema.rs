//! Dynamic warehouse shape derived from the vocabularies, and the row
//! tuples that fill it.

use super::model::{CleanedRecord, LabelField};
use super::naming::{Identifier, Label, unique_identifier};
use super::sql::{CATEGORY_TABLE, GENRE_TABLE, ID};
use super::vocabulary::{Vocabulary, row_labels};
use crate::error::{Result, WarehouseError};
use chrono::NaiveDate;
use std::collections::HashSet;

/// One boolean column of a dimension table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagColumn {
    pub label: Label,
    /// Equal to the label unless it clashed with `id` or was too long.
    pub column: Identifier,
    pub index: Identifier,
}

/// The flag columns of one dimension table, in sorted label order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSet {
    field: LabelField,
    table: Identifier,
    columns: Vec<FlagColumn>,
}

impl ColumnSet {
    pub fn from_vocabulary(vocabulary: &Vocabulary) -> Result<Self> {
        let field = vocabulary.field();
        let mut taken_columns = HashSet::from([ID.as_str().to_owned()]);
        let mut taken_indexes = HashSet::new();

        let columns = vocabulary
            .labels()
            .iter()
            .map(|label| -> Result<FlagColumn> {
                let column = unique_identifier(label.as_str(), &mut taken_columns)?;
                let index = unique_identifier(
                    &format!("{}{}", field.index_prefix(), column.as_str()),
                    &mut taken_indexes,
                )?;
                if column.as_str() != label.as_str() {
                    tracing::warn!("Label '{label}' stored in column {column}");
                }
                Ok(FlagColumn {
                    label: label.clone(),
                    column,
                    index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let table = match field {
            LabelField::Genres => GENRE_TABLE,
            LabelField::Categories => CATEGORY_TABLE,
        };

        Ok(Self {
            field,
            table,
            columns,
        })
    }

    pub fn field(&self) -> LabelField {
        self.field
    }

    pub fn table(&self) -> &Identifier {
        &self.table
    }

    pub fn columns(&self) -> &[FlagColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The `k`-length membership vector of one record's raw field value.
    ///
    /// # Errors
    ///
    /// [`WarehouseError::Consistency`] when the record carries a label the
    /// vocabulary never saw, which means the vocabulary was built from a
    /// different record set.
    pub fn flags(&self, raw: &str) -> Result<Vec<bool>> {
        let mut flags = vec![false; self.columns.len()];
        for label in row_labels(raw) {
            let position = self
                .columns
                .binary_search_by(|column| column.label.cmp(&label))
                .map_err(|_missing| {
                    WarehouseError::Consistency(format!(
                        "label '{label}' of {} is not in the vocabulary",
                        self.field.column()
                    ))
                })?;
            if let Some(flag) = flags.get_mut(position) {
                *flag = true;
            }
        }
        Ok(flags)
    }
}

/// Both dimension shapes, computed once and shared by synthesizer and loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseSchema {
    pub genres: ColumnSet,
    pub categories: ColumnSet,
}

impl WarehouseSchema {
    pub fn from_vocabularies(genres: &Vocabulary, categories: &Vocabulary) -> Result<Self> {
        if genres.field() != LabelField::Genres || categories.field() != LabelField::Categories {
            return Err(WarehouseError::Consistency(
                "vocabularies passed in the wrong order".to_owned(),
            ));
        }
        Ok(Self {
            genres: ColumnSet::from_vocabulary(genres)?,
            categories: ColumnSet::from_vocabulary(categories)?,
        })
    }

    pub fn column_set(&self, field: LabelField) -> &ColumnSet {
        match field {
            LabelField::Genres => &self.genres,
            LabelField::Categories => &self.categories,
        }
    }

    /// Builds the three rows of one record, all keyed by `id`.
    pub fn synthesize(&self, id: i64, record: &CleanedRecord) -> Result<SynthesizedRow> {
        Ok(SynthesizedRow {
            genre: DimensionRow {
                id,
                flags: self.genres.flags(&record.genres)?,
            },
            category: DimensionRow {
                id,
                flags: self.categories.flags(&record.categories)?,
            },
            fact: FactRow::new(id, record),
        })
    }
}

/// Synchronized id of the record at 0-based `position` in the cleaned
/// sequence.
pub fn sync_id(position: usize) -> Result<i64> {
    position
        .checked_add(1)
        .and_then(|id| i64::try_from(id).ok())
        .ok_or_else(|| WarehouseError::Consistency(format!("row position {position} overflows id")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRow {
    pub id: i64,
    pub flags: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub id: i64,
    pub category_id: i64,
    pub genre_id: i64,
    pub release_date: NaiveDate,
    pub price: f64,
    pub positive_reviews: i64,
    pub negative_reviews: i64,
    pub user_score: f64,
    pub metacritic_score: i64,
    pub average_playtime_forever: i64,
    pub average_playtime_2weeks: i64,
    pub median_playtime_forever: i64,
    pub median_playtime_2weeks: i64,
}

impl FactRow {
    pub fn new(id: i64, record: &CleanedRecord) -> Self {
        Self {
            id,
            category_id: id,
            genre_id: id,
            release_date: record.release_date,
            price: record.price,
            positive_reviews: record.positive_reviews,
            negative_reviews: record.negative_reviews,
            user_score: record.user_score,
            metacritic_score: record.metacritic_score,
            average_playtime_forever: record.average_playtime_forever,
            average_playtime_2weeks: record.average_playtime_2weeks,
            median_playtime_forever: record.median_playtime_forever,
            median_playtime_2weeks: record.median_playtime_2weeks,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedRow {
    pub genre: DimensionRow,
    pub category: DimensionRow,
    pub fact: FactRow,
}

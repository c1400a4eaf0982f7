//! Per-field label vocabularies.
//!
//! The order of operations matters for the persisted column order:
//! normalize every raw token, collapse collisions keeping the first-seen raw
//! token, then sort by label.

use super::model::{CleanedRecord, LabelField};
use super::naming::{Label, split_labels};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Distinct raw tokens that normalize to the same label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCollision {
    pub label: Label,
    /// First-seen first; the first one is the survivor.
    pub raw_tokens: Vec<String>,
}

/// Union of the raw tokens of `field` across `records`, in first-seen order.
pub fn extract_labels(records: &[CleanedRecord], field: LabelField) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for record in records {
        for token in split_labels(record.labels(field)) {
            if seen.insert(token) {
                tokens.push(token.to_owned());
            }
        }
    }
    tokens
}

/// Normalizes `raw_labels` and collapses labels produced by more than one
/// distinct raw token. Returns the surviving labels in first-seen order
/// along with the collisions found.
///
/// Repeats of the very same raw token are not collisions.
pub fn normalize_and_dedupe<S: AsRef<str>>(raw_labels: &[S]) -> (Vec<Label>, Vec<LabelCollision>) {
    let mut labels: Vec<Label> = Vec::new();
    let mut sources: HashMap<Label, Vec<String>> = HashMap::new();

    for raw in raw_labels {
        let raw = raw.as_ref().trim();
        let label = Label::normalize(raw);
        match sources.get_mut(&label) {
            Some(tokens) => {
                if !tokens.iter().any(|token| token == raw) {
                    tokens.push(raw.to_owned());
                }
            }
            None => {
                sources.insert(label.clone(), vec![raw.to_owned()]);
                labels.push(label);
            }
        }
    }

    let collisions = labels
        .iter()
        .filter_map(|label| {
            let tokens = sources.get(label)?;
            (tokens.len() > 1).then(|| LabelCollision {
                label: label.clone(),
                raw_tokens: tokens.clone(),
            })
        })
        .collect();

    (labels, collisions)
}

/// Sorted, deduplicated label set of one record's raw field value.
pub fn row_labels(raw: &str) -> Vec<Label> {
    let tokens: Vec<&str> = split_labels(raw).collect();
    let (mut labels, _) = normalize_and_dedupe(&tokens);
    labels.sort();
    labels
}

/// The sorted label set of one categorical field, built once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vocabulary {
    field: LabelField,
    labels: Vec<Label>,
    collisions: Vec<LabelCollision>,
}

impl Vocabulary {
    pub fn build(records: &[CleanedRecord], field: LabelField) -> Self {
        let vocabulary = Self::from_raw_tokens(field, &extract_labels(records, field));
        tracing::info!(
            field = field.column(),
            labels = vocabulary.len(),
            collisions = vocabulary.collisions.len(),
            "Built vocabulary"
        );
        vocabulary
    }

    pub fn from_raw_tokens<S: AsRef<str>>(field: LabelField, raw_tokens: &[S]) -> Self {
        let (mut labels, collisions) = normalize_and_dedupe(raw_tokens);
        labels.sort();

        for collision in &collisions {
            tracing::warn!(
                field = field.column(),
                "Found duplicates: {:?} all normalize to '{}'; keeping {:?}",
                collision.raw_tokens,
                collision.label,
                collision.raw_tokens.first()
            );
        }

        Self {
            field,
            labels,
            collisions,
        }
    }

    pub fn field(&self) -> LabelField {
        self.field
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn collisions(&self) -> &[LabelCollision] {
        &self.collisions
    }

    /// Column position of `label`, if it is part of the vocabulary.
    pub fn position(&self, label: &Label) -> Option<usize> {
        self.labels.binary_search(label).ok()
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.position(label).is_some()
    }
}

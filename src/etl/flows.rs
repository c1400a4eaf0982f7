use super::cleaning::{CleanStats, clean_records};
use super::db::Store;
use super::io::load_records;
use super::loader::{LoadSummary, Loader};
use super::model::{CleanedRecord, LabelField, RawRecord};
use super::reconcile::{ValidationReport, reconcile};
use super::schema::WarehouseSchema;
use super::vocabulary::Vocabulary;
use crate::config::{InputSettings, LoadSettings, ValidationSettings};
use crate::error::{Result, ResultExt as _, WarehouseError};

/// Everything derived from the extract before the store is touched.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub stats: CleanStats,
    pub records: Vec<CleanedRecord>,
    pub genres: Vocabulary,
    pub categories: Vocabulary,
    pub schema: WarehouseSchema,
}

impl PreparedData {
    pub fn vocabulary(&self, field: LabelField) -> &Vocabulary {
        match field {
            LabelField::Genres => &self.genres,
            LabelField::Categories => &self.categories,
        }
    }
}

/// Read, clean and derive both vocabularies and the schema.
pub fn prepare(input: &InputSettings) -> Result<PreparedData> {
    let path = input.require_path()?;
    let raw = load_records(path, input)?;
    prepare_records(&raw)
}

pub fn prepare_records(raw: &[RawRecord]) -> Result<PreparedData> {
    let outcome = clean_records(raw);
    let genres = Vocabulary::build(&outcome.records, LabelField::Genres);
    let categories = Vocabulary::build(&outcome.records, LabelField::Categories);
    let schema = WarehouseSchema::from_vocabularies(&genres, &categories)
        .context("Failed to derive warehouse schema")?;

    Ok(PreparedData {
        stats: outcome.stats,
        records: outcome.records,
        genres,
        categories,
        schema,
    })
}

pub async fn load_flow<S: Store>(
    store: &mut S,
    prepared: &PreparedData,
    settings: &LoadSettings,
) -> Result<LoadSummary> {
    let start = std::time::Instant::now();
    let mut loader = Loader::new(store, &prepared.schema, settings.batch_size);
    let summary = loader.run(&prepared.records).await?;
    tracing::info!(
        rows = summary.rows_loaded,
        elapsed_ms = start.elapsed().as_millis(),
        "Load committed"
    );
    Ok(summary)
}

pub async fn validate_flow<S: Store>(
    store: &mut S,
    prepared: &PreparedData,
) -> Result<ValidationReport> {
    reconcile(store, &prepared.schema, &prepared.records).await
}

/// Load, then reconcile what was loaded.
pub async fn run_flow<S: Store>(
    store: &mut S,
    prepared: &PreparedData,
    settings: &LoadSettings,
) -> Result<(LoadSummary, ValidationReport)> {
    let summary = load_flow(store, prepared, settings).await?;
    let report = validate_flow(store, prepared).await?;
    Ok((summary, report))
}

/// Under strict validation any finding fails the run.
pub fn enforce_strict(report: &ValidationReport, settings: &ValidationSettings) -> Result<()> {
    if settings.strict && !report.is_clean() {
        return Err(WarehouseError::ReconciliationMismatch {
            findings: report.finding_count(),
        });
    }
    Ok(())
}

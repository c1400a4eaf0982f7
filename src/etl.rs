//! The normalization-and-synchronization pipeline.
//!
//! Stages run strictly in order, each handing an explicit value to the next:
//!
//! ```text
//! io::load_records ─> cleaning::clean_records ─> Vocabulary::build (x2)
//!        ─> WarehouseSchema::from_vocabularies ─> loader::Loader::run
//!        ─> reconcile::reconcile
//! ```
//!
//! [`flows`] wires the stages together for the CLI.

pub mod cleaning;
pub mod db;
pub mod flows;
pub mod io;
pub mod loader;
pub mod model;
pub mod naming;
pub mod reconcile;
pub mod schema;
pub mod sql;
pub mod vocabulary;

pub use cleaning::{CleanOutcome, CleanStats, clean_records};
pub use db::{PgStore, Store};
pub use loader::{LoadState, LoadSummary, Loader};
pub use model::{CleanedRecord, LabelField, RawRecord};
pub use naming::{Identifier, Label};
pub use reconcile::{DiffReport, ValidationReport};
pub use schema::{ColumnSet, WarehouseSchema};
pub use vocabulary::Vocabulary;

#[cfg(test)]
mod tests;

//! # games-warehouse
//!
//! Cleans a `;`-delimited games catalog extract and loads it into a
//! PostgreSQL star schema: one `fact_games` table plus two boolean-flag
//! dimension tables (`dim_genre_set`, `dim_category_set`) whose columns are
//! derived from the data itself. Every game gets one synchronized id shared
//! by its fact row and both dimension rows. After loading, the warehouse is
//! read back and reconciled against the cleaned records.
//!
//! ```no_run
//! use games_warehouse::config::WarehouseConfig;
//! use games_warehouse::etl::{PgStore, Store as _, flows};
//!
//! # async fn example() -> games_warehouse::error::Result<()> {
//! let mut config = WarehouseConfig::default();
//! config.input.path = Some("games.csv".into());
//!
//! let prepared = flows::prepare(&config.input)?;
//! let mut store = PgStore::connect(config.database.connect_options()?).await?;
//! let result = flows::run_flow(&mut store, &prepared, &config.load).await;
//! store.close().await?;
//!
//! let (summary, report) = result?;
//! println!("{}", summary.summary_text());
//! println!("{}", report.render());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`etl`]: cleaning, vocabularies, schema synthesis, loading, reconciliation
//! - [`config`]: JSON configuration and connection settings
//! - [`error`]: error types and the `ResultExt` helper
//! - [`logging`]: tracing subscriber setup

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod etl;
pub mod logging;

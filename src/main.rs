//! # games-warehouse entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Resolve configuration (JSON file, then flags and WAREHOUSE_* env)
//!   ├─> Install tracing subscriber
//!   └─> Run the command on a current-thread Tokio runtime
//! ```
//!
//! Every command that touches the warehouse opens one connection and closes
//! it before returning, whether the command succeeded or not.
//!
//! ```bash
//! games-warehouse run --file games.csv --db-password secret
//! games-warehouse vocabulary --file games.csv
//! ```

#![expect(clippy::print_stdout)] // summaries and reports go to stdout

mod cli;

use anyhow::{Context as _, Result};
use clap::Parser as _;
use games_warehouse::logging;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let config = cli.base_config()?;

    logging::init(&config.logging)?;

    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?
        .block_on(cli::run_command(cli.command, config));

    if let Err(err) = &result {
        tracing::error!("{err:#}");
    }
    result
}

pub mod reader;
pub mod dispatch;

pub use reader::{CsvRows, open_rows};
pub use dispatch::{CancelFlag, DispatchOptions, LoadReport, describe_failure, dispatch};

use std::path::Path;
use std::sync::Arc;

use crate::mapper::RowMapper;

/// Convenience function to load a whole CSV file
///
/// Orchestrates the full pipeline: read → map → persist
pub async fn load_file(
    mapper: Arc<RowMapper>,
    data: &Path,
    options: &DispatchOptions,
) -> crate::error::Result<LoadReport> {
    let rows = open_rows(data)?;

    let mode = if options.continue_on_error {
        "continuing on errors"
    } else {
        "stopping at the first error"
    };
    log::info!(
        "Loading {} with {} worker(s), {}",
        data.display(),
        options.workers,
        mode
    );

    dispatch(mapper, rows, options).await
}

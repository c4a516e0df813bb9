use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::batch::InvoiceSpec;
use crate::error::Result;
use crate::retail::SubmissionResult;

/// Write one run's generated specs and submission results into the working
/// directory, named with a shared timestamp prefix. Empty lists are
/// skipped. Returns the paths written, for the caller to announce.
pub fn save_run_artifacts(
    specs: &[InvoiceSpec],
    results: &[SubmissionResult],
    now: DateTime<Local>,
) -> Result<Vec<PathBuf>> {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let mut written = Vec::new();

    if !specs.is_empty() {
        let path = PathBuf::from(format!("invoices_{stamp}.json"));
        write_pretty(&path, specs)?;
        written.push(path);
    }
    if !results.is_empty() {
        let path = PathBuf::from(format!("results_{stamp}.json"));
        write_pretty(&path, results)?;
        written.push(path);
    }

    Ok(written)
}

fn write_pretty<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)?;
    Ok(())
}

// Input validation: expected-column checks and invalid-row checks.
//
// Fatal checks raise with the identity of the offending input; warning
// checks export the offending rows to a side file for diagnosis and let
// the run continue.
use crate::error::PipelineError;
use std::path::Path;

/// Severity of an invalid-row check. Both severities export the rows;
/// only `Error` aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Check that a dataset contains the columns the process expects,
/// aborting with the missing names and the input's identity otherwise.
pub fn expected_columns(
    actual: &[String],
    input_name: &str,
    expected: &[&str],
) -> Result<(), PipelineError> {
    let missing: Vec<String> = expected
        .iter()
        .filter(|c| !actual.iter().any(|a| a == *c))
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SchemaMismatch {
            input: input_name.to_string(),
            missing,
        })
    }
}

/// Handle rows that failed a data-quality condition: export them to a
/// side csv, then either abort (`Error`) or log and continue
/// (`Warning`). Does nothing when there are no invalid rows.
///
/// `output_limit` caps how many rows are exported, e.g. 1 to keep just
/// the first offending row of a fatal check.
pub fn report_invalid_rows(
    severity: Severity,
    header: &[&str],
    invalid_rows: &[Vec<String>],
    output_path: &Path,
    message: &str,
    output_limit: Option<usize>,
) -> Result<(), PipelineError> {
    // A pre-existing side file from an earlier run would be misleading.
    if output_path.exists() {
        std::fs::remove_file(output_path)?;
    }
    if invalid_rows.is_empty() {
        return Ok(());
    }

    if let Some(dir) = output_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let limit = output_limit.unwrap_or(invalid_rows.len());
    let mut wtr = csv::Writer::from_path(output_path)?;
    wtr.write_record(header)?;
    for row in invalid_rows.iter().take(limit) {
        wtr.write_record(row)?;
    }
    wtr.flush()?;

    match severity {
        Severity::Error => Err(PipelineError::DataIntegrity(message.to_string())),
        Severity::Warning => {
            log::warn!("{message}");
            Ok(())
        }
    }
}

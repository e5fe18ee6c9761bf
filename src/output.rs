// Output sinks: csv files for the publication tables and feeds, a JSON
// run summary, and markdown console previews of each table.
use crate::error::PipelineError;
use crate::types::Table;
use serde::Serialize;
use std::path::Path;
use tabled::builder::Builder;
use tabled::settings::Style;

/// Per-output record written to the JSON run summary.
#[derive(Debug, Clone, Serialize)]
pub struct OutputSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub file: String,
}

/// Write a result table as csv: header row of index then value columns,
/// nulls rendered with the configured not-available symbol.
pub fn write_table_csv(
    path: &Path,
    table: &Table,
    not_available: &str,
) -> Result<(), PipelineError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;

    let header: Vec<&str> = table
        .index_columns
        .iter()
        .chain(table.value_columns.iter())
        .map(|c| c.as_str())
        .collect();
    wtr.write_record(&header)?;

    for row in &table.rows {
        let mut record: Vec<String> = row.labels.clone();
        record.extend(row.values.iter().map(|c| c.render(not_available)));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PipelineError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Markdown preview of the first `max_rows` rows of a table, for console
/// inspection during a run.
pub fn preview_table(table: &Table, not_available: &str, max_rows: usize) -> String {
    if table.rows.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    let header: Vec<String> = table
        .index_columns
        .iter()
        .chain(table.value_columns.iter())
        .cloned()
        .collect();
    builder.push_record(header);
    for row in table.rows.iter().take(max_rows) {
        let mut record: Vec<String> = row.labels.clone();
        record.extend(row.values.iter().map(|c| c.render(not_available)));
        builder.push_record(record);
    }
    builder.build().with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{columns, Cell, TableRow};

    fn sample_table() -> Table {
        let mut table = Table::new(
            columns(&["Org_Code", "Org_Name"]),
            columns(&["Population", "Coverage"]),
        );
        table.rows.push(TableRow {
            labels: vec!["E09000012".to_string(), "Hackney".to_string()],
            values: vec![Cell::Number(1500.0), Cell::Number(91.25)],
        });
        table.rows.push(TableRow {
            labels: vec!["E09000030".to_string(), "Tower Hamlets".to_string()],
            values: vec![Cell::Null, Cell::Text("*".to_string())],
        });
        table
    }

    #[test]
    fn csv_renders_nulls_and_whole_numbers() {
        let dir = std::env::temp_dir().join("coverage_report_output_test");
        let path = dir.join("sample.csv");
        write_table_csv(&path, &sample_table(), ":").unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "Org_Code,Org_Name,Population,Coverage");
        assert_eq!(lines[1], "E09000012,Hackney,1500,91.25");
        assert_eq!(lines[2], "E09000030,Tower Hamlets,:,*");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn preview_limits_rows_and_includes_header() {
        let preview = preview_table(&sample_table(), ":", 1);
        assert!(preview.contains("Org_Name"));
        assert!(preview.contains("Hackney"));
        assert!(!preview.contains("Tower Hamlets"));
    }

    #[test]
    fn empty_table_preview() {
        let table = Table::new(columns(&["Org_Code"]), columns(&["Coverage"]));
        assert_eq!(preview_table(&table, ":", 5), "(no rows)");
    }
}

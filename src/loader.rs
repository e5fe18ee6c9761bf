// Fact-table ingestion: csv deserialization, numeric cleaning,
// small-LA combination and the data-quality gates that run before any
// output is produced.
use crate::config::Config;
use crate::error::PipelineError;
use crate::orgs::OrgRefSnapshot;
use crate::types::{FactRecord, RawFactRow};
use crate::util::parse_f64_safe;
use crate::validate::{expected_columns, report_invalid_rows, Severity};
use csv::ReaderBuilder;
use std::path::Path;

/// Columns the fact extract must supply. Vaccine_Status is optional, it
/// only exists once status updates have been merged upstream.
const EXPECTED_FACT_COLUMNS: [&str; 10] = [
    "Org_Code",
    "Org_Name",
    "Parent_Org_Code",
    "Parent_Org_Name",
    "Org_Type",
    "FinancialYear",
    "Child_Age",
    "Vac_Type",
    "Number_Vaccinated",
    "Number_Population",
];

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
    pub combined_rows: usize,
    pub unmatched_rows: usize,
}

/// Load and clean the vaccination fact extract.
///
/// - aborts if expected columns are missing (SchemaMismatch);
/// - aborts if the extract contains rows after the configured reporting
///   period (DataIntegrityError, first offending row exported);
/// - excludes rows for organisation codes missing from the reference
///   snapshot, exporting them to a side file and warning (non-fatal);
/// - recodes small LAs to their combining neighbour so their counts are
///   summed together at aggregation.
pub fn load_facts(
    path: &str,
    config: &Config,
    orgs: &OrgRefSnapshot,
) -> Result<(Vec<FactRecord>, LoadReport), PipelineError> {
    log::info!("Importing vaccination fact data from {path}");
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    expected_columns(&headers, "vaccination fact extract", &EXPECTED_FACT_COLUMNS)?;

    let reporting_year = config.reporting_year()?;
    let mut total_rows = 0usize;
    let mut parse_errors = 0usize;
    let mut combined_rows = 0usize;
    let mut facts: Vec<FactRecord> = Vec::new();

    for result in rdr.deserialize::<RawFactRow>() {
        total_rows += 1;
        let row = match result {
            Ok(r) => r,
            Err(_) => {
                parse_errors += 1;
                continue;
            }
        };

        let (Some(vaccinated), Some(population)) = (
            parse_f64_safe(row.number_vaccinated.as_deref()),
            parse_f64_safe(row.number_population.as_deref()),
        ) else {
            parse_errors += 1;
            continue;
        };
        let Some(org_code) = row.org_code.filter(|c| !c.trim().is_empty()) else {
            parse_errors += 1;
            continue;
        };

        let mut fact = FactRecord {
            org_code: org_code.trim().to_string(),
            org_name: row.org_name.unwrap_or_default().trim().to_string(),
            parent_org_code: row.parent_org_code.unwrap_or_default().trim().to_string(),
            parent_org_name: row.parent_org_name.unwrap_or_default().trim().to_string(),
            org_type: row.org_type.unwrap_or_default().trim().to_string(),
            financial_year: row.financial_year.unwrap_or_default().trim().to_string(),
            child_age: row.child_age.unwrap_or_default().trim().to_string(),
            vac_type: row.vac_type.unwrap_or_default().trim().to_string(),
            vaccine_status: row.vaccine_status.unwrap_or_default().trim().to_string(),
            number_vaccinated: vaccinated,
            number_population: population,
        };

        // Small LAs are published under their combining neighbour.
        if let Some(merge) = config
            .la_merges
            .iter()
            .find(|m| m.from_code == fact.org_code)
        {
            fact.org_code = merge.to_code.clone();
            fact.org_name = merge.to_name.clone();
            combined_rows += 1;
        }

        facts.push(fact);
    }

    // A row after the reporting period means the extract is for the
    // wrong period; the whole run is invalid.
    let wrong_period: Vec<Vec<String>> = facts
        .iter()
        .filter(|f| f.financial_year.as_str() > reporting_year.as_str())
        .map(|f| vec![f.org_code.clone(), f.financial_year.clone()])
        .collect();
    report_invalid_rows(
        Severity::Error,
        &["Org_Code", "FinancialYear"],
        &wrong_period,
        &Path::new(&config.validation_dir).join("facts_wrong_period.csv"),
        &format!(
            "vaccination fact extract contains data after the configured reporting year \
             {reporting_year}; first offending row exported"
        ),
        Some(1),
    )?;

    // Organisation codes the reference snapshot does not know are
    // excluded from processing but reported for follow-up.
    let unmatched: Vec<Vec<String>> = {
        let mut seen: Vec<Vec<String>> = facts
            .iter()
            .filter(|f| !orgs.contains_code(&f.org_code))
            .map(|f| vec![f.org_code.clone(), f.org_name.clone()])
            .collect();
        seen.sort();
        seen.dedup();
        seen
    };
    report_invalid_rows(
        Severity::Warning,
        &["Org_Code", "Org_Name"],
        &unmatched,
        &Path::new(&config.validation_dir).join("facts_unmatched_orgs.csv"),
        "vaccination fact extract contains organisation codes not found in the \
         reference data; rows excluded and codes exported",
        None,
    )?;
    let before = facts.len();
    facts.retain(|f| orgs.contains_code(&f.org_code));
    let unmatched_rows = before - facts.len();

    let report = LoadReport {
        total_rows,
        loaded_rows: facts.len(),
        parse_errors,
        combined_rows,
        unmatched_rows,
    };
    Ok((facts, report))
}

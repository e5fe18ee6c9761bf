// Entry point for the childhood vaccination coverage publication run.
//
// The run is a fixed sequence: load the organisation reference snapshot,
// load and clean the fact extract, then build and write every registered
// output. Processing stops at the first failure so a bad extract never
// produces a partial publication.
mod config;
mod crosstab;
mod error;
mod loader;
mod orgs;
mod output;
mod postprocess;
mod registry;
mod suppress;
mod types;
mod util;
mod validate;

use config::Config;
use error::PipelineError;
use output::OutputSummary;
use std::path::Path;

const PREVIEW_ROWS: usize = 5;

fn run() -> Result<(), PipelineError> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(Path::new(&path))?,
        None => Config::default(),
    };
    log::info!("Reporting year: {}", config.reporting_year()?);

    let org_snapshot = orgs::load_org_ref(&config.org_ref_file, &config)?;
    log::info!(
        "Organisation reference snapshot: {} organisations",
        util::format_int(org_snapshot.records().len() as i64)
    );

    let (facts, load_report) = loader::load_facts(&config.facts_file, &config, &org_snapshot)?;
    log::info!(
        "Fact extract: {} rows loaded of {} ({} parse errors, {} combined-LA recodes, \
         {} excluded for unmatched organisations)",
        util::format_int(load_report.loaded_rows as i64),
        util::format_int(load_report.total_rows as i64),
        util::format_int(load_report.parse_errors as i64),
        util::format_int(load_report.combined_rows as i64),
        util::format_int(load_report.unmatched_rows as i64)
    );

    let output_dir = Path::new(&config.output_dir);
    let mut summaries: Vec<OutputSummary> = Vec::new();

    for spec in registry::PUBLICATION_OUTPUTS.iter() {
        log::info!("Creating output: {}", spec.name);
        let mut table = crosstab::run_output(&facts, spec, &org_snapshot, &config)?;
        postprocess::apply_output_updates(&mut table, &spec.name, &config);

        let file = output_dir.join(format!("{}.csv", spec.name));
        output::write_table_csv(&file, &table, &config.not_available)?;

        println!("{}", spec.name);
        println!("{}\n", output::preview_table(&table, &config.not_available, PREVIEW_ROWS));

        summaries.push(OutputSummary {
            name: spec.name.clone(),
            rows: table.rows.len(),
            columns: table.index_columns.len() + table.value_columns.len(),
            file: file.to_string_lossy().to_string(),
        });
    }

    output::write_json(&output_dir.join("run_summary.json"), &summaries)?;
    log::info!(
        "Run complete: {} outputs written to {}",
        summaries.len(),
        config.output_dir
    );
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("Publication run failed: {e}");
        std::process::exit(1);
    }
}

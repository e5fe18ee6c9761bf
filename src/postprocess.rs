// Output-specific updates applied after the generic engine has built a
// table: presentational columns for retired vaccines, WHO target
// columns, HepB suppression and status handling, and combined-LA
// display names. Keyed by output name so the engine itself stays
// generic.
use crate::config::Config;
use crate::suppress::suppress_triplet;
use crate::types::{Cell, Table};

const FULL_DATA_NOT_AVAILABLE: &str = "Full data not available";

/// One post-processing step. Rules are data, not code, so the per-output
/// registry reads like configuration.
#[derive(Debug, Clone)]
pub enum PostRule {
    /// Insert a value column filled with the configured not-applicable
    /// symbol at a fixed position (vaccines no longer collected).
    InsertNotApplicable { position: usize, name: &'static str },
    /// Same, appended after the existing value columns.
    AppendNotApplicable { name: &'static str },
    /// Insert a constant numeric column (WHO coverage target).
    InsertConstant {
        position: usize,
        name: &'static str,
        value: f64,
    },
    /// Insert a constant text column (data-source marker).
    InsertText {
        position: usize,
        name: &'static str,
        text: &'static str,
    },
    /// Two-pass small-number suppression of a
    /// population/vaccinated/coverage triplet.
    SuppressTriplet {
        population: &'static str,
        vaccinated: &'static str,
        coverage: &'static str,
    },
    /// Replace measures with the not-available symbol according to the
    /// vaccine submission status, and backfill the status for
    /// organisations that submitted nothing.
    StatusNotAvailable {
        status: &'static str,
        measures: &'static [&'static str],
    },
    /// Presentational relabel of row-label values (combined-LA names).
    RenameIndexValues {
        column: &'static str,
        renames: &'static [(&'static str, &'static str)],
    },
    /// Final ascending sort on the named columns.
    SortBy { columns: &'static [&'static str] },
}

const HEPB_MEASURES: [&str; 3] = ["Population", "Vaccinated", "Coverage"];

const COMBINED_LA_NAMES: [(&str, &str); 3] = [
    ("Hackney", "Hackney and City of London"),
    ("Cornwall", "Cornwall and Isles of Scilly"),
    ("Leicestershire", "Leicestershire and Rutland"),
];

/// The post-processing rules for one named output. Outputs without an
/// entry need nothing beyond the generic engine.
fn rules_for(name: &str) -> Vec<PostRule> {
    match name {
        "Table 1" => vec![
            PostRule::InsertNotApplicable { position: 2, name: "DTaP/IPV/Hib" },
            PostRule::InsertNotApplicable { position: 3, name: "MenC" },
            PostRule::InsertNotApplicable { position: 5, name: "PCV" },
        ],
        "Table 2" => vec![
            PostRule::InsertNotApplicable { position: 2, name: "DTaP/IPV/Hib" },
            PostRule::InsertNotApplicable { position: 3, name: "MenC" },
        ],
        "Table 3" => vec![PostRule::AppendNotApplicable { name: "Hib" }],
        "Table 11b" | "Table 11c" => vec![
            PostRule::SuppressTriplet {
                population: "Population",
                vaccinated: "Vaccinated",
                coverage: "Coverage",
            },
            PostRule::StatusNotAvailable {
                status: "Vaccine_Status",
                measures: &HEPB_MEASURES,
            },
        ],
        "DTaP_12m_TSeries" | "DTaP_24m_TSeries" => vec![PostRule::InsertConstant {
            position: 0,
            name: "WHO Target",
            value: 95.0,
        }],
        "DTaP_5yr_TSeries"
        | "DTaP_IPV_5yr_TSeries"
        | "MMR_24m_TSeries"
        | "MMR1_5yr_TSeries"
        | "MMR2_5yr_TSeries"
        | "PCV_12m_24m_TSeries"
        | "Hib_MenC_24m_TSeries"
        | "Hib_MenC_5y_TSeries"
        | "Rota_12m_TSeries" => vec![PostRule::InsertConstant {
            position: 1,
            name: "WHO Target",
            value: 95.0,
        }],
        "childhood_vaccination_map_data" => vec![PostRule::InsertText {
            position: 0,
            name: "Source",
            text: "Perc_Vaccinated",
        }],
        "childhood-vaccination-la-num-denom" => vec![
            PostRule::RenameIndexValues {
                column: "Org_Name",
                renames: &COMBINED_LA_NAMES,
            },
            PostRule::SortBy {
                columns: &["Parent_Org_Code", "Org_Name", "Child_Age", "Indicator"],
            },
        ],
        "childhood-vaccination-table-11b-11c" => vec![
            PostRule::SuppressTriplet {
                population: "HepB_12m_Population",
                vaccinated: "HepB_12m_Vaccinated",
                coverage: "HepB_12m_Coverage",
            },
            PostRule::SuppressTriplet {
                population: "HepB_24m_Population",
                vaccinated: "HepB_24m_Vaccinated",
                coverage: "HepB_24m_Coverage",
            },
        ],
        "DashboardData" => vec![PostRule::SortBy {
            columns: &["VacCode", "OrgType", "OrgCode"],
        }],
        _ => Vec::new(),
    }
}

fn apply_status_not_available(table: &mut Table, status: &str, measures: &[&str]) {
    let Some(status_pos) = table.value_position(status) else {
        return;
    };
    let measure_positions: Vec<usize> = measures
        .iter()
        .filter_map(|m| table.value_position(m))
        .collect();

    for row in &mut table.rows {
        match &row.values[status_pos] {
            Cell::Text(s) if s == FULL_DATA_NOT_AVAILABLE => {
                for &pos in &measure_positions {
                    row.values[pos] = Cell::Null;
                }
            }
            // No status at all means the organisation submitted no data:
            // blank everything and record why.
            Cell::Text(s) if s.is_empty() => {
                for cell in &mut row.values {
                    *cell = Cell::Null;
                }
                row.values[status_pos] = Cell::Text(FULL_DATA_NOT_AVAILABLE.to_string());
            }
            Cell::Null => {
                for cell in &mut row.values {
                    *cell = Cell::Null;
                }
                row.values[status_pos] = Cell::Text(FULL_DATA_NOT_AVAILABLE.to_string());
            }
            _ => {}
        }
    }
}

/// Apply the updates registered for this output name. The vaccine status
/// flag, wherever it was carried as a row label, is always relocated
/// after the measures first so the per-output rules can treat it as a
/// value column.
pub fn apply_output_updates(table: &mut Table, name: &str, config: &Config) {
    table.move_index_to_values_end("Vaccine_Status");

    for rule in rules_for(name) {
        match rule {
            PostRule::InsertNotApplicable { position, name } => {
                let cell = Cell::Text(config.not_applicable.clone());
                table.insert_value_column(position, name, cell);
            }
            PostRule::AppendNotApplicable { name } => {
                let end = table.value_columns.len();
                let cell = Cell::Text(config.not_applicable.clone());
                table.insert_value_column(end, name, cell);
            }
            PostRule::InsertConstant { position, name, value } => {
                table.insert_value_column(position, name, Cell::Number(value));
            }
            PostRule::InsertText { position, name, text } => {
                table.insert_value_column(position, name, Cell::Text(text.to_string()));
            }
            PostRule::SuppressTriplet {
                population,
                vaccinated,
                coverage,
            } => suppress_triplet(table, population, vaccinated, coverage),
            PostRule::StatusNotAvailable { status, measures } => {
                apply_status_not_available(table, status, measures);
            }
            PostRule::RenameIndexValues { column, renames } => {
                let renames: Vec<(String, String)> = renames
                    .iter()
                    .map(|(from, to)| (from.to_string(), to.to_string()))
                    .collect();
                table.rename_index_values(column, &renames);
            }
            PostRule::SortBy { columns } => {
                let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                table.sort_by_index(&columns);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{columns, TableRow};

    fn config() -> Config {
        Config::default()
    }

    #[test]
    fn retired_vaccine_columns_are_inserted_at_fixed_positions() {
        let mut table = Table::new(
            columns(&["Org_Name"]),
            columns(&["A", "B", "C", "D"]),
        );
        table.rows.push(TableRow {
            labels: vec!["England".to_string()],
            values: vec![
                Cell::Number(1.0),
                Cell::Number(2.0),
                Cell::Number(3.0),
                Cell::Number(4.0),
            ],
        });
        apply_output_updates(&mut table, "Table 1", &config());
        assert_eq!(
            table.value_columns,
            columns(&["A", "B", "DTaP/IPV/Hib", "MenC", "C", "PCV", "D"])
        );
        // Filled with the not-applicable symbol, not the not-available
        // one: the vaccine was withdrawn, not unreported.
        let z = Cell::Text("z".to_string());
        assert_eq!(table.rows[0].values[2], z);
        assert_eq!(table.rows[0].values[3], z);
        assert_eq!(table.rows[0].values[5], z);
    }

    #[test]
    fn retired_hib_column_is_appended() {
        let mut table = Table::new(columns(&["Org_Name"]), columns(&["A"]));
        table.rows.push(TableRow {
            labels: vec!["England".to_string()],
            values: vec![Cell::Number(1.0)],
        });
        apply_output_updates(&mut table, "Table 3", &config());
        assert_eq!(table.value_columns, columns(&["A", "Hib"]));
        assert_eq!(table.rows[0].values[1], Cell::Text("z".to_string()));
    }

    #[test]
    fn who_target_column_for_time_series() {
        let mut table = Table::new(
            columns(&["FinancialYear"]),
            columns(&["Coverage"]),
        );
        table.rows.push(TableRow {
            labels: vec!["2022-23".to_string()],
            values: vec![Cell::Number(91.8)],
        });
        apply_output_updates(&mut table, "DTaP_12m_TSeries", &config());
        assert_eq!(table.value_columns, columns(&["WHO Target", "Coverage"]));
        assert_eq!(table.rows[0].values[0], Cell::Number(95.0));
    }

    #[test]
    fn map_data_gets_a_source_column() {
        let mut table = Table::new(columns(&["Org_Code"]), columns(&["Coverage"]));
        table.rows.push(TableRow {
            labels: vec!["E09000012".to_string()],
            values: vec![Cell::Number(88.0)],
        });
        apply_output_updates(&mut table, "childhood_vaccination_map_data", &config());
        assert_eq!(table.value_columns, columns(&["Source", "Coverage"]));
        assert_eq!(
            table.rows[0].values[0],
            Cell::Text("Perc_Vaccinated".to_string())
        );
    }

    fn hepb_table(rows: &[(&str, f64, f64, f64, &str)]) -> Table {
        let mut table = Table::new(
            columns(&["Org_Name", "Vaccine_Status"]),
            columns(&["Population", "Vaccinated", "Coverage"]),
        );
        for &(name, p, v, c, status) in rows {
            table.rows.push(TableRow {
                labels: vec![name.to_string(), status.to_string()],
                values: vec![Cell::Number(p), Cell::Number(v), Cell::Number(c)],
            });
        }
        table
    }

    #[test]
    fn hepb_status_moves_after_the_measures() {
        let mut table = hepb_table(&[("Hackney", 50.0, 45.0, 90.0, "Full data submitted")]);
        apply_output_updates(&mut table, "Table 11b", &config());
        assert_eq!(table.index_columns, columns(&["Org_Name"]));
        assert_eq!(
            table.value_columns,
            columns(&["Population", "Vaccinated", "Coverage", "Vaccine_Status"])
        );
        // Ordinary counts pass through untouched.
        assert_eq!(table.rows[0].values[0], Cell::Number(50.0));
        assert_eq!(
            table.rows[0].values[3],
            Cell::Text("Full data submitted".to_string())
        );
    }

    #[test]
    fn hepb_suppression_and_partial_status() {
        let mut table = hepb_table(&[
            ("Tiny", 2.0, 1.0, 50.0, "Full data submitted"),
            ("Partial", 50.0, 45.0, 90.0, "Full data not available"),
        ]);
        apply_output_updates(&mut table, "Table 11b", &config());
        let star = Cell::Text("*".to_string());
        // Population of 2: whole triplet starred.
        assert_eq!(
            table.rows[0].values[..3],
            [star.clone(), star.clone(), star]
        );
        // Incomplete submission: measures blanked, status kept.
        assert_eq!(
            table.rows[1].values[..3],
            [Cell::Null, Cell::Null, Cell::Null]
        );
        assert_eq!(
            table.rows[1].values[3],
            Cell::Text("Full data not available".to_string())
        );
    }

    #[test]
    fn hepb_no_submission_is_backfilled_with_a_status() {
        let mut table = hepb_table(&[("Silent", 10.0, 8.0, 80.0, "")]);
        apply_output_updates(&mut table, "Table 11c", &config());
        assert_eq!(
            table.rows[0].values[..3],
            [Cell::Null, Cell::Null, Cell::Null]
        );
        assert_eq!(
            table.rows[0].values[3],
            Cell::Text("Full data not available".to_string())
        );
    }

    #[test]
    fn combined_la_names_are_relabeled_and_sorted() {
        let mut table = Table::new(
            columns(&["Parent_Org_Code", "Org_Name", "Child_Age", "Indicator"]),
            columns(&["Value"]),
        );
        for (parent, name) in [("E12000007", "Hackney"), ("E12000004", "Leicestershire")] {
            table.rows.push(TableRow {
                labels: vec![
                    parent.to_string(),
                    name.to_string(),
                    "12m".to_string(),
                    "Coverage".to_string(),
                ],
                values: vec![Cell::Number(1.0)],
            });
        }
        apply_output_updates(&mut table, "childhood-vaccination-la-num-denom", &config());
        assert_eq!(table.rows[0].labels[0], "E12000004");
        assert_eq!(table.rows[0].labels[1], "Leicestershire and Rutland");
        assert_eq!(table.rows[1].labels[1], "Hackney and City of London");
    }

    #[test]
    fn unknown_outputs_are_untouched() {
        let mut table = Table::new(columns(&["Org_Name"]), columns(&["Coverage"]));
        table.rows.push(TableRow {
            labels: vec!["England".to_string()],
            values: vec![Cell::Number(92.1)],
        });
        let before = table.clone();
        apply_output_updates(&mut table, "Table 6", &config());
        assert_eq!(table, before);
    }
}

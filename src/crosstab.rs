// The crosstab construction engine.
//
// Takes the long-form fact table and a declarative output specification
// and produces a wide, ordered, labeled table ready for presentation:
// filter -> group/aggregate -> optional subgroups -> measure -> pivot ->
// organisation merge -> order -> round -> rename. Construction is
// atomic: any failure happens before a single cell is written anywhere.
use crate::config::Config;
use crate::error::{validate_value_with_list, PipelineError};
use crate::orgs::OrgRefSnapshot;
use crate::types::{
    Cell, FactRecord, FilterCondition, Measure, MissingOrgs, OutputKind, OutputSpec, RowOrdering,
    RowSubgroup, Table, TableRow,
};
use crate::util::{fyear_range, percent_or_rate, round_half_up};
use std::collections::BTreeMap;

/// Long-form aggregated counts: one row per combination of the grouping
/// columns with summed numerator and denominator.
#[derive(Debug, Clone)]
pub struct AggData {
    pub group_columns: Vec<String>,
    pub rows: Vec<AggRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggRow {
    pub keys: Vec<String>,
    pub vaccinated: f64,
    pub population: f64,
}

/// Apply the standard filters: organisation type, trailing financial
/// year window, and the output's optional filter condition.
fn filter_facts<'a>(
    facts: &'a [FactRecord],
    org_type: Option<&str>,
    filter: Option<&FilterCondition>,
    window_years: usize,
    config: &Config,
) -> Result<Vec<&'a FactRecord>, PipelineError> {
    let mut kept: Vec<&FactRecord> = facts.iter().collect();

    if let Some(org_type) = org_type {
        // The requested type must actually exist in the data.
        let mut valid: Vec<String> = Vec::new();
        for f in &kept {
            if !valid.iter().any(|v| v == &f.org_type) {
                valid.push(f.org_type.clone());
            }
        }
        validate_value_with_list("Org_Type", org_type, &valid)?;
        kept.retain(|f| f.org_type == org_type);
    }

    let reporting_year = config.reporting_year()?;
    let year_window = fyear_range(&reporting_year, window_years.max(1))?;
    kept.retain(|f| year_window.iter().any(|y| y == &f.financial_year));

    if let Some(filter) = filter {
        let mut filtered = Vec::with_capacity(kept.len());
        for f in kept {
            if filter.matches(f)? {
                filtered.push(f);
            }
        }
        kept = filtered;
    }

    Ok(kept)
}

/// Filter the facts and sum numerator/denominator grouped by the given
/// columns. Sums only: every published measure derives from additive
/// counts.
pub fn filter_and_aggregate(
    facts: &[FactRecord],
    org_type: Option<&str>,
    filter: Option<&FilterCondition>,
    window_years: usize,
    group_columns: &[String],
    config: &Config,
) -> Result<AggData, PipelineError> {
    for column in group_columns {
        if !FactRecord::is_label_column(column) {
            return Err(PipelineError::SchemaMismatch {
                input: "vaccination fact data".to_string(),
                missing: vec![column.clone()],
            });
        }
    }

    let kept = filter_facts(facts, org_type, filter, window_years, config)?;

    let mut groups: BTreeMap<Vec<String>, (f64, f64)> = BTreeMap::new();
    for fact in kept {
        let key: Vec<String> = group_columns
            .iter()
            .map(|c| fact.label(c).unwrap_or_default().to_string())
            .collect();
        let entry = groups.entry(key).or_insert((0.0, 0.0));
        entry.0 += fact.number_vaccinated;
        entry.1 += fact.number_population;
    }

    Ok(AggData {
        group_columns: group_columns.to_vec(),
        rows: groups
            .into_iter()
            .map(|(keys, (vaccinated, population))| AggRow {
                keys,
                vaccinated,
                population,
            })
            .collect(),
    })
}

/// Append rows for one composed label: member rows are relabeled to the
/// new label and re-summed over the full group key. Member rows are
/// retained unchanged.
fn compose_group(agg: &mut AggData, column_pos: usize, label: &str, members: &[String]) {
    let mut sums: BTreeMap<Vec<String>, (f64, f64)> = BTreeMap::new();
    for row in &agg.rows {
        if members.iter().any(|m| m == &row.keys[column_pos]) {
            let mut key = row.keys.clone();
            key[column_pos] = label.to_string();
            let entry = sums.entry(key).or_insert((0.0, 0.0));
            entry.0 += row.vaccinated;
            entry.1 += row.population;
        }
    }
    agg.rows.extend(
        sums.into_iter()
            .map(|(keys, (vaccinated, population))| AggRow {
                keys,
                vaccinated,
                population,
            }),
    );
}

/// Add the composed rows defined by a row subgroup (e.g. merged age
/// bands). Composition happens on the counts, before any percentage is
/// derived, so combined coverage reflects true combined totals.
pub fn add_subgroup_rows(agg: &mut AggData, subgroup: &RowSubgroup) -> Result<(), PipelineError> {
    let pos = agg
        .group_columns
        .iter()
        .position(|c| c == &subgroup.column)
        .ok_or_else(|| PipelineError::SchemaMismatch {
            input: "row subgroup".to_string(),
            missing: vec![subgroup.column.clone()],
        })?;
    for (label, members) in &subgroup.groups {
        compose_group(agg, pos, label, members);
    }
    Ok(())
}

/// Add composed pivot values (e.g. merged vaccine types) that become new
/// output columns after the pivot. Same count-first rule as row
/// subgroups.
pub fn add_subgroup_columns(
    agg: &mut AggData,
    pivot_column: &str,
    groups: &[(String, Vec<String>)],
) -> Result<(), PipelineError> {
    let pos = agg
        .group_columns
        .iter()
        .position(|c| c == pivot_column)
        .ok_or_else(|| PipelineError::SchemaMismatch {
            input: "column subgroup".to_string(),
            missing: vec![pivot_column.to_string()],
        })?;
    for (label, members) in groups {
        compose_group(agg, pos, label, members);
    }
    Ok(())
}

/// Derive the requested measure for one aggregated row. Coverage of an
/// empty population is undefined, not zero.
fn derive_measure(row: &AggRow, measure: Measure) -> Option<f64> {
    match measure {
        Measure::Coverage => percent_or_rate(row.vaccinated, row.population, 100.0),
        Measure::Vaccinated => Some(row.vaccinated),
        Measure::Population => Some(row.population),
    }
}

/// Pivot the aggregated long data into wide form: index = row columns,
/// one value column per distinct pivot value (ascending), or a single
/// measure column when no pivot column is given. Null measures survive
/// the reshape as true nulls.
fn pivot(agg: &AggData, row_count: usize, has_pivot: bool, measure: Measure) -> Table {
    let mut cells: BTreeMap<Vec<String>, BTreeMap<String, Option<f64>>> = BTreeMap::new();
    let mut pivot_values: Vec<String> = if has_pivot {
        Vec::new()
    } else {
        // The measure column exists even when no data survived the
        // filters.
        vec![measure.column_name().to_string()]
    };

    for row in &agg.rows {
        let index_key: Vec<String> = row.keys[..row_count].to_vec();
        let column = if has_pivot {
            row.keys[row_count].clone()
        } else {
            measure.column_name().to_string()
        };
        if !pivot_values.contains(&column) {
            pivot_values.push(column.clone());
        }
        cells
            .entry(index_key)
            .or_default()
            .insert(column, derive_measure(row, measure));
    }
    pivot_values.sort();

    let mut table = Table::new(
        agg.group_columns[..row_count].to_vec(),
        pivot_values.clone(),
    );
    for (labels, row_cells) in cells {
        let values = pivot_values
            .iter()
            .map(|c| match row_cells.get(c) {
                Some(Some(n)) => Cell::Number(*n),
                // Either a null coverage or a combination absent from
                // the data; both present as null.
                _ => Cell::Null,
            })
            .collect();
        table.rows.push(TableRow { labels, values });
    }
    table
}

/// Re-join a pivoted local-level table against the organisation
/// reference snapshot so every currently valid organisation of the
/// requested type appears exactly once, with canonical reference labels
/// replacing whatever the source data carried.
fn merge_org_ref(
    table: Table,
    rows_original: &[String],
    org_type: Option<&str>,
    orgs: &OrgRefSnapshot,
    missing_orgs: MissingOrgs,
    config: &Config,
) -> Result<Table, PipelineError> {
    let org_type = org_type.unwrap_or_default();
    let reporting_year = config.reporting_year()?;
    let (ref_columns, ref_rows) = orgs.organisations_for(
        org_type,
        rows_original,
        &reporting_year,
        &config.local_level_org_types,
    )?;

    let data_code_pos = table.index_position("Org_Code").ok_or_else(|| {
        PipelineError::DataIntegrity("organisation merge requires an Org_Code row column".into())
    })?;

    // Left join from the reference side on Org_Code.
    let mut by_code: BTreeMap<&str, Vec<&TableRow>> = BTreeMap::new();
    for row in &table.rows {
        by_code
            .entry(row.labels[data_code_pos].as_str())
            .or_default()
            .push(row);
    }

    let ref_code_pos = ref_columns
        .iter()
        .position(|c| c == "Org_Code")
        .ok_or_else(|| {
            PipelineError::DataIntegrity(
                "organisation reference resolver did not return Org_Code".into(),
            )
        })?;

    let mut merged = Table::new(rows_original.to_vec(), table.value_columns.clone());
    for ref_row in &ref_rows {
        let code = ref_row[ref_code_pos].as_str();
        let matches = by_code.get(code);

        if matches.is_none() && missing_orgs == MissingOrgs::Exclude {
            continue;
        }

        let empty_row;
        let placeholder;
        let data_rows: &[&TableRow] = match matches {
            Some(rows) => rows.as_slice(),
            None => {
                empty_row = TableRow {
                    labels: vec![String::new(); table.index_columns.len()],
                    values: vec![Cell::Null; table.value_columns.len()],
                };
                placeholder = [&empty_row];
                &placeholder
            }
        };

        for data_row in data_rows {
            let labels = rows_original
                .iter()
                .map(|column| {
                    // Reference values are canonical; data-only columns
                    // keep their source values.
                    if let Some(pos) = ref_columns.iter().position(|c| c == column) {
                        ref_row[pos].clone()
                    } else if let Some(pos) = table.index_columns.iter().position(|c| c == column) {
                        data_row.labels[pos].clone()
                    } else {
                        String::new()
                    }
                })
                .collect();
            merged.rows.push(TableRow {
                labels,
                values: data_row.values.clone(),
            });
        }
    }
    Ok(merged)
}

/// Keep only rows whose values appear in the explicit order lists and
/// sort them into exactly that sequence. Ordering keys are applied in
/// the order the lists are configured, so the first listed column is the
/// primary sequence. Supports single- and multi-level row labels.
fn order_rows_explicit(table: &mut Table, orders: &[(String, Vec<String>)]) {
    let positions: Vec<(usize, &Vec<String>)> = orders
        .iter()
        .filter_map(|(column, list)| table.index_position(column).map(|pos| (pos, list)))
        .collect();

    table.rows.retain(|row| {
        positions
            .iter()
            .all(|(pos, list)| list.iter().any(|v| v == &row.labels[*pos]))
    });
    table.rows.sort_by_key(|row| {
        positions
            .iter()
            .map(|(pos, list)| list.iter().position(|v| v == &row.labels[*pos]))
            .collect::<Vec<_>>()
    });
}

/// Ascending lexical sort on the named columns, with optional handling
/// of a sentinel total row: excluded entirely, or relocated to the end
/// rather than sorted in place. Drops columns that were only present for
/// sorting.
fn sort_rows(
    table: &mut Table,
    sort_on: &[String],
    cols_to_remove: &[String],
    include_row_total: bool,
    total_name: &str,
) {
    if !include_row_total {
        table
            .rows
            .retain(|row| !row.labels.iter().any(|l| l == total_name));
    }
    table.sort_by_index(sort_on);
    if include_row_total {
        let (totals, rest): (Vec<TableRow>, Vec<TableRow>) = table
            .rows
            .drain(..)
            .partition(|row| row.labels.iter().any(|l| l == total_name));
        table.rows = rest;
        table.rows.extend(totals);
    }
    table.drop_index_columns(cols_to_remove);
}

/// Reorder/select the value columns of a pivoted table. Requesting a
/// column the data cannot supply is a schema error.
fn select_value_columns(table: &Table, column_order: &[String]) -> Result<Table, PipelineError> {
    let mut positions = Vec::with_capacity(column_order.len());
    let mut missing = Vec::new();
    for column in column_order {
        match table.value_position(column) {
            Some(pos) => positions.push(pos),
            None => missing.push(column.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::SchemaMismatch {
            input: "column_order".to_string(),
            missing,
        });
    }

    let mut selected = Table::new(table.index_columns.clone(), column_order.to_vec());
    selected.rows = table
        .rows
        .iter()
        .map(|row| TableRow {
            labels: row.labels.clone(),
            values: positions.iter().map(|&p| row.values[p].clone()).collect(),
        })
        .collect();
    Ok(selected)
}

/// Build a crosstab output for any breakdown and any number of years.
///
/// Runs the full sequence described in the module header. `facts` is
/// the cleaned fact table, `orgs` the per-run reference snapshot.
pub fn build_crosstab(
    facts: &[FactRecord],
    spec: &OutputSpec,
    orgs: &OrgRefSnapshot,
    config: &Config,
) -> Result<Table, PipelineError> {
    // Account for columns only needed for sorting: they take part in
    // grouping and are dropped after the sort.
    let mut rows_all = spec.rows.clone();
    let mut cols_to_remove: Vec<String> = Vec::new();
    if let Some(RowOrdering::SortOn { columns, .. }) = &spec.ordering {
        for column in columns {
            if !rows_all.contains(column) {
                rows_all.push(column.clone());
                cols_to_remove.push(column.clone());
            }
        }
    }

    // Columns the fact data cannot supply (reference-only details) are
    // set aside; the organisation merge restores them later.
    let rows_original = rows_all.clone();
    let rows_present: Vec<String> = rows_all
        .iter()
        .filter(|c| FactRecord::is_label_column(c))
        .cloned()
        .collect();

    let mut group_columns = rows_present.clone();
    if let Some(pivot_column) = &spec.pivot_column {
        group_columns.push(pivot_column.clone());
    }

    let mut agg = filter_and_aggregate(
        facts,
        spec.org_type.as_deref(),
        spec.filter.as_ref(),
        spec.window.resolve(config),
        &group_columns,
        config,
    )?;

    for subgroup in &spec.row_subgroup {
        add_subgroup_rows(&mut agg, subgroup)?;
    }
    if !spec.column_subgroup.is_empty() {
        let pivot_column =
            spec.pivot_column
                .as_deref()
                .ok_or_else(|| PipelineError::SchemaMismatch {
                    input: "column subgroup".to_string(),
                    missing: vec!["columns".to_string()],
                })?;
        add_subgroup_columns(&mut agg, pivot_column, &spec.column_subgroup)?;
    }

    // Counts are scaled before the measure is derived so a multiplier
    // can never distort a ratio.
    if let Some(multiplier) = spec.count_multiplier {
        for row in &mut agg.rows {
            row.vaccinated *= multiplier;
            row.population *= multiplier;
        }
    }

    let mut table = pivot(
        &agg,
        rows_present.len(),
        spec.pivot_column.is_some(),
        spec.measure,
    );

    // Local-level outputs are completed against the organisation
    // reference so every current organisation appears, data or not.
    if rows_original.iter().any(|c| c == "Org_Code") {
        table = merge_org_ref(
            table,
            &rows_original,
            spec.org_type.as_deref(),
            orgs,
            spec.missing_orgs,
            config,
        )?;
    }

    let column_order: Vec<String> = if spec.pivot_column.is_none() {
        vec![spec.measure.column_name().to_string()]
    } else if let Some(order) = &spec.column_order {
        order.clone()
    } else {
        table.value_columns.clone()
    };
    let mut table = select_value_columns(&table, &column_order)?;

    match &spec.ordering {
        Some(RowOrdering::Explicit(orders)) => order_rows_explicit(&mut table, orders),
        Some(RowOrdering::SortOn {
            columns,
            include_row_total,
            total_name,
        }) => sort_rows(
            &mut table,
            columns,
            &cols_to_remove,
            *include_row_total,
            total_name,
        ),
        None => {}
    }

    if let Some(decimals) = spec.rounding {
        for row in &mut table.rows {
            for cell in &mut row.values {
                if let Cell::Number(n) = cell {
                    *cell = Cell::Number(round_half_up(*n, decimals));
                }
            }
        }
    }

    table.rename_columns(&spec.column_rename);
    Ok(table)
}

/// Run several no-pivot crosstabs over the same rows and join them side
/// by side, renaming each measure column. Used for outputs that show
/// population, vaccinated and coverage together.
pub fn build_joined(
    facts: &[FactRecord],
    spec: &OutputSpec,
    parts: &[(Measure, String)],
    orgs: &OrgRefSnapshot,
    config: &Config,
) -> Result<Table, PipelineError> {
    let mut joined: Option<Table> = None;
    for (measure, column_name) in parts {
        let part_spec = OutputSpec {
            measure: *measure,
            kind: OutputKind::Crosstab,
            column_rename: Vec::new(),
            ..spec.clone()
        };
        let mut part = build_crosstab(facts, &part_spec, orgs, config)?;
        let from = part.value_columns[0].clone();
        part.rename_columns(&[(from, column_name.clone())]);

        joined = Some(match joined {
            None => part,
            Some(mut base) => {
                if base.rows.len() != part.rows.len()
                    || base
                        .rows
                        .iter()
                        .zip(&part.rows)
                        .any(|(a, b)| a.labels != b.labels)
                {
                    return Err(PipelineError::DataIntegrity(format!(
                        "joined output '{}' parts do not align on row labels",
                        spec.name
                    )));
                }
                base.value_columns.extend(part.value_columns);
                for (row, part_row) in base.rows.iter_mut().zip(part.rows) {
                    row.values.extend(part_row.values);
                }
                base
            }
        });
    }
    let mut table = joined.ok_or_else(|| PipelineError::DataIntegrity(format!(
        "joined output '{}' has no parts",
        spec.name
    )))?;
    table.rename_columns(&spec.column_rename);
    Ok(table)
}

/// Long-format csv output: one value column over the given breakdowns.
/// Population outputs are relabeled to the eligible-population labels
/// and filtered to them.
pub fn build_csv_long(
    facts: &[FactRecord],
    spec: &OutputSpec,
    config: &Config,
) -> Result<Table, PipelineError> {
    let mut agg = filter_and_aggregate(
        facts,
        spec.org_type.as_deref(),
        spec.filter.as_ref(),
        spec.window.resolve(config),
        &spec.rows,
        config,
    )?;

    let vac_pos = agg.group_columns.iter().position(|c| c == "Vac_Type");
    if spec.measure == Measure::Population {
        if let Some(pos) = vac_pos {
            for row in &mut agg.rows {
                if let Some((label, _)) = config
                    .population_vaccines
                    .iter()
                    .find(|(_, vac)| vac == &row.keys[pos])
                {
                    row.keys[pos] = label.clone();
                }
            }
            agg.rows.retain(|row| row.keys[pos].ends_with("Eligible_Pop"));
        }
    }

    let mut table = Table::new(
        spec.rows.clone(),
        vec![spec.measure.column_name().to_string()],
    );
    for row in &agg.rows {
        let value = derive_measure(row, spec.measure);
        table.rows.push(TableRow {
            labels: row.keys.clone(),
            values: vec![value.map_or(Cell::Null, Cell::Number)],
        });
    }

    if let Some(RowOrdering::SortOn {
        columns,
        include_row_total,
        total_name,
    }) = &spec.ordering
    {
        sort_rows(&mut table, columns, &[], *include_row_total, total_name);
    }

    table.rename_columns(&spec.column_rename);
    Ok(table)
}

const DASHBOARD_OUTPUT_TYPES: [&str; 5] = ["UK", "National", "Other nations", "Region", "LA"];

/// Dashboard feed: population and coverage melted into a single value
/// column, with organisation code/name overrides for UK and national
/// rollups.
pub fn build_dashboard_long(
    facts: &[FactRecord],
    spec: &OutputSpec,
    output_type: &str,
    config: &Config,
) -> Result<Table, PipelineError> {
    let valid: Vec<String> = DASHBOARD_OUTPUT_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect();
    validate_value_with_list("dashboard output_type", output_type, &valid)?;

    let kept = filter_facts(
        facts,
        spec.org_type.as_deref(),
        spec.filter.as_ref(),
        spec.window.resolve(config),
        config,
    )?;

    // UK and national rollups group everything under a single synthetic
    // organisation before aggregation.
    let mut working: Vec<FactRecord> = kept.into_iter().cloned().collect();
    match output_type {
        "UK" => {
            for f in &mut working {
                f.org_code = "K02000001".to_string();
                f.org_name = "United Kingdom".to_string();
            }
        }
        "National" => {
            for f in &mut working {
                f.org_code = "E92000001".to_string();
                f.org_name = "England".to_string();
            }
        }
        _ => {}
    }
    let org_level = match output_type {
        "National" | "Other nations" => "Country",
        other => other,
    };

    // Group by the breakdowns; Org_Level is derived here rather than
    // carried on the facts.
    let mut groups: BTreeMap<Vec<String>, (f64, f64)> = BTreeMap::new();
    for fact in &working {
        let key: Vec<String> = spec
            .rows
            .iter()
            .map(|column| {
                if column == "Org_Level" {
                    org_level.to_string()
                } else {
                    fact.label(column).unwrap_or_default().to_string()
                }
            })
            .collect();
        let entry = groups.entry(key).or_insert((0.0, 0.0));
        entry.0 += fact.number_vaccinated;
        entry.1 += fact.number_population;
    }

    let vac_pos = spec.rows.iter().position(|c| c == "Vac_Type");
    let mut table = Table::new(spec.rows.clone(), vec!["Value".to_string()]);

    // Population rows first, then coverage, as the melt produces them.
    for (keys, (_, population)) in &groups {
        let mut labels = keys.clone();
        if let Some(pos) = vac_pos {
            match config
                .population_vaccines
                .iter()
                .find(|(_, vac)| vac == &labels[pos])
            {
                // Only vaccines that define an eligible population
                // contribute population rows.
                Some((label, _)) => labels[pos] = label.clone(),
                None => continue,
            }
        }
        table.rows.push(TableRow {
            labels,
            values: vec![Cell::Number(*population)],
        });
    }
    for (keys, (vaccinated, population)) in &groups {
        let coverage = percent_or_rate(*vaccinated, *population, 100.0);
        table.rows.push(TableRow {
            labels: keys.clone(),
            values: vec![coverage.map_or(Cell::Null, Cell::Number)],
        });
    }

    if let Some(RowOrdering::SortOn {
        columns,
        include_row_total,
        total_name,
    }) = &spec.ordering
    {
        sort_rows(&mut table, columns, &[], *include_row_total, total_name);
    }

    table.rename_columns(&spec.column_rename);
    Ok(table)
}

/// Dispatch one registry entry to the engine that builds it.
pub fn run_output(
    facts: &[FactRecord],
    spec: &OutputSpec,
    orgs: &OrgRefSnapshot,
    config: &Config,
) -> Result<Table, PipelineError> {
    match &spec.kind {
        OutputKind::Crosstab => build_crosstab(facts, spec, orgs, config),
        OutputKind::Joined(parts) => build_joined(facts, spec, parts, orgs, config),
        OutputKind::CsvLong => build_csv_long(facts, spec, config),
        OutputKind::DashboardLong { output_type } => {
            build_dashboard_long(facts, spec, output_type, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orgs::RawOrgRow;
    use crate::types::{columns, WindowYears};

    fn fact(
        org_code: &str,
        org_name: &str,
        org_type: &str,
        year: &str,
        age: &str,
        vac: &str,
        vaccinated: f64,
        population: f64,
    ) -> FactRecord {
        FactRecord {
            org_code: org_code.to_string(),
            org_name: org_name.to_string(),
            parent_org_code: "E12000007".to_string(),
            parent_org_name: "London".to_string(),
            org_type: org_type.to_string(),
            financial_year: year.to_string(),
            child_age: age.to_string(),
            vac_type: vac.to_string(),
            vaccine_status: String::new(),
            number_vaccinated: vaccinated,
            number_population: population,
        }
    }

    fn config() -> Config {
        Config::default()
    }

    fn empty_orgs() -> OrgRefSnapshot {
        OrgRefSnapshot::build(Vec::new(), &config()).unwrap()
    }

    fn orgs(entries: &[(&str, &str)]) -> OrgRefSnapshot {
        let raw = entries
            .iter()
            .map(|(code, name)| RawOrgRow {
                org_code: Some(code.to_string()),
                org_name: Some(name.to_string()),
                parent_org_code: Some("E12000007".to_string()),
                open_date: None,
            })
            .collect();
        OrgRefSnapshot::build(raw, &config()).unwrap()
    }

    #[test]
    fn single_cell_coverage_scenario() {
        // One LA fact row, 4 of 8 vaccinated -> a single 50.0 cell.
        let facts = vec![fact(
            "E09000012", "Hackney", "LA", "2022-23", "12m", "X", 4.0, 8.0,
        )];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.index_columns, columns(&["FinancialYear"]));
        assert_eq!(table.value_columns, columns(&["X"]));
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].labels, vec!["2022-23"]);
        assert_eq!(table.rows[0].values, vec![Cell::Number(50.0)]);
    }

    #[test]
    fn duplicate_fact_rows_are_summed_before_pivoting() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 4.0, 8.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 2.0, 4.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            measure: Measure::Vaccinated,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].values, vec![Cell::Number(6.0)]);
    }

    #[test]
    fn zero_denominator_coverage_is_null_not_zero() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 0.0, 0.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "Y", 3.0, 4.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.value_columns, columns(&["X", "Y"]));
        assert_eq!(table.rows[0].values[0], Cell::Null);
        assert_eq!(table.rows[0].values[1], Cell::Number(75.0));
    }

    #[test]
    fn unknown_org_type_is_invalid_argument() {
        let facts = vec![fact(
            "E09000012", "Hackney", "LA", "2022-23", "12m", "X", 4.0, 8.0,
        )];
        let spec = OutputSpec {
            org_type: Some("PCT".to_string()),
            rows: columns(&["FinancialYear"]),
            ..OutputSpec::default()
        };
        let err = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument { .. }));
    }

    #[test]
    fn time_window_restricts_to_trailing_years() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2019-20", "12m", "X", 1.0, 2.0),
            fact("E09000012", "Hackney", "LA", "2021-22", "12m", "X", 1.0, 2.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 1.0, 2.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            window: WindowYears::Fixed(2),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        let years: Vec<&str> = table.rows.iter().map(|r| r.labels[0].as_str()).collect();
        assert_eq!(years, vec!["2021-22", "2022-23"]);
    }

    #[test]
    fn series_windows_come_from_the_run_configuration() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2020-21", "12m", "X", 1.0, 2.0),
            fact("E09000012", "Hackney", "LA", "2021-22", "12m", "X", 1.0, 2.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 1.0, 2.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            window: WindowYears::PublicationSeries,
            ..OutputSpec::default()
        };
        let mut config = config();
        config.ts_years_publication = 2;
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config).unwrap();
        let years: Vec<&str> = table.rows.iter().map(|r| r.labels[0].as_str()).collect();
        assert_eq!(years, vec!["2021-22", "2022-23"]);

        // Widening the configured series pulls in the extra year with no
        // registry change.
        config.ts_years_publication = 3;
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config).unwrap();
        assert_eq!(table.rows.len(), 3);
    }

    #[test]
    fn explicit_row_order_round_trip() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 1.0, 2.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "24m", "X", 1.0, 2.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "5y", "X", 1.0, 2.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["Child_Age"]),
            pivot_column: Some("Vac_Type".to_string()),
            ordering: Some(RowOrdering::explicit(&[("Child_Age", &["5y", "12m"])])),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        // Exactly the listed subset, in the listed sequence.
        let ages: Vec<&str> = table.rows.iter().map(|r| r.labels[0].as_str()).collect();
        assert_eq!(ages, vec!["5y", "12m"]);
    }

    #[test]
    fn explicit_multi_level_row_order() {
        let mut facts = Vec::new();
        for age in ["<45", "70+", "50-65"] {
            for vac in ["Positive", "Negative"] {
                facts.push(fact("E09000012", "Hackney", "LA", "2022-23", age, vac, 1.0, 2.0));
            }
        }
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            measure: Measure::Population,
            rows: columns(&["Child_Age", "Vac_Type"]),
            ordering: Some(RowOrdering::explicit(&[
                ("Child_Age", &["<45", "50-65", "70+"]),
                ("Vac_Type", &["Positive", "Negative"]),
            ])),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        let keys: Vec<(String, String)> = table
            .rows
            .iter()
            .map(|r| (r.labels[0].clone(), r.labels[1].clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("<45".to_string(), "Positive".to_string()),
                ("<45".to_string(), "Negative".to_string()),
                ("50-65".to_string(), "Positive".to_string()),
                ("50-65".to_string(), "Negative".to_string()),
                ("70+".to_string(), "Positive".to_string()),
                ("70+".to_string(), "Negative".to_string()),
            ]
        );
    }

    #[test]
    fn sort_only_columns_never_reach_the_output() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 1.0, 2.0),
            fact("E09000030", "Tower Hamlets", "LA", "2022-23", "12m", "X", 1.0, 2.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            ordering: Some(RowOrdering::sort_on(&["Parent_Org_Code", "Org_Name"])),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.index_columns, columns(&["Org_Name"]));
        assert!(!table.index_columns.contains(&"Parent_Org_Code".to_string()));
        let names: Vec<&str> = table.rows.iter().map(|r| r.labels[0].as_str()).collect();
        assert_eq!(names, vec!["Hackney", "Tower Hamlets"]);
    }

    #[test]
    fn total_row_is_relocated_to_the_end() {
        let mut facts = vec![
            fact("E09000012", "Zebra", "LA", "2022-23", "12m", "X", 1.0, 2.0),
            fact("E09000030", "Apple", "LA", "2022-23", "12m", "X", 1.0, 2.0),
        ];
        facts.push(fact(
            "E92000001",
            "Grand_Total",
            "LA",
            "2022-23",
            "12m",
            "X",
            2.0,
            4.0,
        ));
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            ordering: Some(RowOrdering::SortOn {
                columns: vec!["Org_Name".to_string()],
                include_row_total: true,
                total_name: "Grand_Total".to_string(),
            }),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        let names: Vec<&str> = table.rows.iter().map(|r| r.labels[0].as_str()).collect();
        assert_eq!(names, vec!["Apple", "Zebra", "Grand_Total"]);
    }

    #[test]
    fn row_subgroup_sums_equal_member_sums() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 3.0, 10.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "24m", "X", 5.0, 10.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "5y", "X", 7.0, 10.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            measure: Measure::Vaccinated,
            rows: columns(&["Child_Age"]),
            pivot_column: Some("Vac_Type".to_string()),
            row_subgroup: vec![RowSubgroup::new(
                "Child_Age",
                &[("12m_24m", &["12m", "24m"])],
            )],
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        let find = |age: &str| {
            table
                .rows
                .iter()
                .find(|r| r.labels[0] == age)
                .unwrap()
                .values[0]
                .as_number()
                .unwrap()
        };
        // Members retained, combined row equals the member total.
        assert_eq!(find("12m_24m"), find("12m") + find("24m"));
        assert_eq!(find("12m_24m"), 8.0);
        assert_eq!(find("5y"), 7.0);
    }

    #[test]
    fn column_subgroup_coverage_uses_combined_counts() {
        // Coverage of the combined column must come from summed counts,
        // not from averaging the member percentages.
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "A", 1.0, 10.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "B", 9.0, 10.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            column_subgroup: vec![(
                "A_B".to_string(),
                vec!["A".to_string(), "B".to_string()],
            )],
            column_order: Some(columns(&["A", "B", "A_B"])),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        assert_eq!(
            table.rows[0].values,
            vec![Cell::Number(10.0), Cell::Number(90.0), Cell::Number(50.0)]
        );
    }

    #[test]
    fn multiplier_scales_counts_but_not_coverage() {
        let facts = vec![fact(
            "E09000012", "Hackney", "LA", "2022-23", "12m", "X", 500.0, 1000.0,
        )];
        let population = OutputSpec {
            org_type: Some("LA".to_string()),
            measure: Measure::Population,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            count_multiplier: Some(0.001),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &population, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.rows[0].values, vec![Cell::Number(1.0)]);

        let coverage = OutputSpec {
            measure: Measure::Coverage,
            ..population
        };
        let table = build_crosstab(&facts, &coverage, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.rows[0].values, vec![Cell::Number(50.0)]);
    }

    #[test]
    fn rounding_applies_to_value_columns() {
        let facts = vec![fact(
            "E09000012", "Hackney", "LA", "2022-23", "12m", "X", 1.0, 3.0,
        )];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            rounding: Some(1),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.rows[0].values, vec![Cell::Number(33.3)]);
    }

    #[test]
    fn org_merge_gives_every_current_organisation_a_row() {
        let snapshot = orgs(&[
            ("E09000012", "Hackney"),
            ("E09000030", "Tower Hamlets"),
            ("E12000007", "London"),
        ]);
        // Only Hackney submitted data.
        let facts = vec![fact(
            "E09000012", "Hackney", "LA", "2022-23", "12m", "X", 4.0, 8.0,
        )];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["Org_Code", "Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &snapshot, &config()).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].labels, vec!["E09000012", "Hackney"]);
        assert_eq!(table.rows[0].values, vec![Cell::Number(50.0)]);
        // No data: present with a null cell, not absent.
        assert_eq!(table.rows[1].labels, vec!["E09000030", "Tower Hamlets"]);
        assert_eq!(table.rows[1].values, vec![Cell::Null]);
    }

    #[test]
    fn org_merge_overwrites_source_labels_with_reference_values() {
        let snapshot = orgs(&[("E09000012", "Hackney")]);
        let facts = vec![fact(
            "E09000012",
            "Hackney (old style)",
            "LA",
            "2022-23",
            "12m",
            "X",
            4.0,
            8.0,
        )];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["Org_Code", "Org_Name", "FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &snapshot, &config()).unwrap();
        assert_eq!(
            table.rows[0].labels,
            vec!["E09000012", "Hackney", "2022-23"]
        );
    }

    #[test]
    fn org_merge_can_exclude_data_less_organisations() {
        let snapshot = orgs(&[("E09000012", "Hackney"), ("E09000030", "Tower Hamlets")]);
        let facts = vec![fact(
            "E09000012", "Hackney", "LA", "2022-23", "12m", "X", 4.0, 8.0,
        )];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["Org_Code", "Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            missing_orgs: MissingOrgs::Exclude,
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &snapshot, &config()).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].labels, vec!["E09000012", "Hackney"]);
    }

    #[test]
    fn org_merge_drops_organisations_outside_the_type() {
        let snapshot = orgs(&[("E09000012", "Hackney")]);
        // A regional row sneaks into an LA output's data.
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "X", 4.0, 8.0),
            fact("E12000007", "London", "LA", "2022-23", "12m", "X", 9.0, 10.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["Org_Code", "Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &snapshot, &config()).unwrap();
        let codes: Vec<&str> = table.rows.iter().map(|r| r.labels[0].as_str()).collect();
        assert_eq!(codes, vec!["E09000012"]);
    }

    #[test]
    fn explicit_column_order_is_respected_and_missing_columns_fail() {
        let facts = vec![
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "A", 1.0, 2.0),
            fact("E09000012", "Hackney", "LA", "2022-23", "12m", "B", 1.0, 2.0),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            column_order: Some(columns(&["B", "A"])),
            ..OutputSpec::default()
        };
        let table = build_crosstab(&facts, &spec, &empty_orgs(), &config()).unwrap();
        assert_eq!(table.value_columns, columns(&["B", "A"]));

        let bad = OutputSpec {
            column_order: Some(columns(&["B", "C"])),
            ..spec
        };
        let err = build_crosstab(&facts, &bad, &empty_orgs(), &config()).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn joined_output_lines_up_measure_columns() {
        let facts = vec![fact(
            "E09000012", "Hackney", "LA", "2022-23", "12m", "X", 4.0, 8.0,
        )];
        let snapshot = orgs(&[("E09000012", "Hackney")]);
        let spec = OutputSpec {
            name: "Table 11b".to_string(),
            org_type: Some("LA".to_string()),
            rows: columns(&["Org_Code", "Org_Name"]),
            ..OutputSpec::default()
        };
        let parts = vec![
            (Measure::Population, "Population".to_string()),
            (Measure::Vaccinated, "Vaccinated".to_string()),
            (Measure::Coverage, "Coverage".to_string()),
        ];
        let table = build_joined(&facts, &spec, &parts, &snapshot, &config()).unwrap();
        assert_eq!(
            table.value_columns,
            columns(&["Population", "Vaccinated", "Coverage"])
        );
        assert_eq!(
            table.rows[0].values,
            vec![Cell::Number(8.0), Cell::Number(4.0), Cell::Number(50.0)]
        );
    }

    #[test]
    fn csv_long_population_uses_eligible_pop_labels() {
        let facts = vec![
            fact(
                "E09000012",
                "Hackney",
                "LA",
                "2022-23",
                "12m",
                "DTaP_IPV_Hib_HepB_12m",
                90.0,
                100.0,
            ),
            fact(
                "E09000012", "Hackney", "LA", "2022-23", "12m", "MenB_12m", 80.0, 100.0,
            ),
        ];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            measure: Measure::Population,
            rows: columns(&["Org_Name", "Vac_Type"]),
            kind: OutputKind::CsvLong,
            ..OutputSpec::default()
        };
        let table = build_csv_long(&facts, &spec, &config()).unwrap();
        // Only the population-defining vaccine survives, relabeled.
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].labels, vec!["Hackney", "12m_Eligible_Pop"]);
        assert_eq!(table.rows[0].values, vec![Cell::Number(100.0)]);
    }

    #[test]
    fn dashboard_long_melts_population_and_coverage() {
        let facts = vec![fact(
            "E09000012",
            "Hackney",
            "LA",
            "2022-23",
            "12m",
            "DTaP_IPV_Hib_HepB_12m",
            75.0,
            100.0,
        )];
        let spec = OutputSpec {
            org_type: Some("LA".to_string()),
            rows: columns(&["FinancialYear", "Org_Level", "Org_Code", "Vac_Type"]),
            kind: OutputKind::DashboardLong {
                output_type: "National".to_string(),
            },
            ..OutputSpec::default()
        };
        let table = build_dashboard_long(&facts, &spec, "National", &config()).unwrap();
        assert_eq!(table.rows.len(), 2);
        // Population row first, with the synthetic national org and the
        // eligible-population label.
        assert_eq!(
            table.rows[0].labels,
            vec!["2022-23", "Country", "E92000001", "12m_Eligible_Pop"]
        );
        assert_eq!(table.rows[0].values, vec![Cell::Number(100.0)]);
        assert_eq!(
            table.rows[1].labels,
            vec!["2022-23", "Country", "E92000001", "DTaP_IPV_Hib_HepB_12m"]
        );
        assert_eq!(table.rows[1].values, vec![Cell::Number(75.0)]);
    }

    #[test]
    fn dashboard_rejects_unknown_output_type() {
        let spec = OutputSpec::default();
        let err = build_dashboard_long(&[], &spec, "Galaxy", &config()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument { .. }));
    }
}

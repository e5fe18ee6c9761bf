// Data model: fact rows, the dynamic result table, and the typed
// configuration records consumed by the crosstab engine.
use crate::config::Config;
use crate::error::PipelineError;
use serde::Deserialize;

/// One row of the vaccination coverage fact extract, exactly as it
/// arrives from the ingestion collaborator. Everything is optional text
/// at this stage; cleaning happens in the loader.
#[derive(Debug, Deserialize)]
pub struct RawFactRow {
    #[serde(rename = "Org_Code")]
    pub org_code: Option<String>,
    #[serde(rename = "Org_Name")]
    pub org_name: Option<String>,
    #[serde(rename = "Parent_Org_Code")]
    pub parent_org_code: Option<String>,
    #[serde(rename = "Parent_Org_Name")]
    pub parent_org_name: Option<String>,
    #[serde(rename = "Org_Type")]
    pub org_type: Option<String>,
    #[serde(rename = "FinancialYear")]
    pub financial_year: Option<String>,
    #[serde(rename = "Child_Age")]
    pub child_age: Option<String>,
    #[serde(rename = "Vac_Type")]
    pub vac_type: Option<String>,
    #[serde(rename = "Vaccine_Status", default)]
    pub vaccine_status: Option<String>,
    #[serde(rename = "Number_Vaccinated")]
    pub number_vaccinated: Option<String>,
    #[serde(rename = "Number_Population")]
    pub number_population: Option<String>,
}

/// A cleaned fact row: one organisation/year/vaccine/age combination with
/// its vaccinated and eligible-population counts.
///
/// Counts are `f64` because multipliers (e.g. thousands) are applied to
/// them before measure derivation.
#[derive(Debug, Clone)]
pub struct FactRecord {
    pub org_code: String,
    pub org_name: String,
    pub parent_org_code: String,
    pub parent_org_name: String,
    pub org_type: String,
    pub financial_year: String,
    pub child_age: String,
    pub vac_type: String,
    /// Submission status flag. Empty when no status was reported.
    pub vaccine_status: String,
    pub number_vaccinated: f64,
    pub number_population: f64,
}

impl FactRecord {
    /// Label (non-count) columns that grouping, filtering and pivoting
    /// may refer to by name.
    pub const LABEL_COLUMNS: [&'static str; 9] = [
        "Org_Code",
        "Org_Name",
        "Parent_Org_Code",
        "Parent_Org_Name",
        "Org_Type",
        "FinancialYear",
        "Child_Age",
        "Vac_Type",
        "Vaccine_Status",
    ];

    /// Look up a label column by its dataset column name.
    pub fn label(&self, column: &str) -> Option<&str> {
        match column {
            "Org_Code" => Some(&self.org_code),
            "Org_Name" => Some(&self.org_name),
            "Parent_Org_Code" => Some(&self.parent_org_code),
            "Parent_Org_Name" => Some(&self.parent_org_name),
            "Org_Type" => Some(&self.org_type),
            "FinancialYear" => Some(&self.financial_year),
            "Child_Age" => Some(&self.child_age),
            "Vac_Type" => Some(&self.vac_type),
            "Vaccine_Status" => Some(&self.vaccine_status),
            _ => None,
        }
    }

    pub fn is_label_column(column: &str) -> bool {
        Self::LABEL_COLUMNS.contains(&column)
    }
}

/// A single value in a result table. Nulls are first class so that a
/// 0/0 coverage survives pivoting as a true null rather than a zero, and
/// suppression/not-available markers replace the numeric type entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Null,
}

impl Cell {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Render for output, substituting the configured not-available
    /// symbol for nulls. Whole numbers drop the trailing ".0" so counts
    /// look like counts.
    pub fn render(&self, not_available: &str) -> String {
        match self {
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Cell::Text(s) => s.clone(),
            Cell::Null => not_available.to_string(),
        }
    }
}

/// One row of a result table: the row-label values followed by one cell
/// per value column.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub labels: Vec<String>,
    pub values: Vec<Cell>,
}

/// A wide, ordered, labeled result table. `index_columns` name the
/// row-label columns (in display order) and `value_columns` the measure
/// columns; every row carries values parallel to those two lists.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub index_columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn new(index_columns: Vec<String>, value_columns: Vec<String>) -> Self {
        Table {
            index_columns,
            value_columns,
            rows: Vec::new(),
        }
    }

    pub fn index_position(&self, column: &str) -> Option<usize> {
        self.index_columns.iter().position(|c| c == column)
    }

    pub fn value_position(&self, column: &str) -> Option<usize> {
        self.value_columns.iter().position(|c| c == column)
    }

    /// Insert a value column at a fixed position with the same cell in
    /// every row (placeholder columns for retired indicators etc).
    pub fn insert_value_column(&mut self, position: usize, name: &str, cell: Cell) {
        let position = position.min(self.value_columns.len());
        self.value_columns.insert(position, name.to_string());
        for row in &mut self.rows {
            row.values.insert(position, cell.clone());
        }
    }

    /// Move a row-label column to the end of the value columns, e.g. a
    /// status flag that should display after the measures.
    pub fn move_index_to_values_end(&mut self, column: &str) {
        if let Some(pos) = self.index_position(column) {
            self.index_columns.remove(pos);
            self.value_columns.push(column.to_string());
            for row in &mut self.rows {
                let label = row.labels.remove(pos);
                row.values.push(Cell::Text(label));
            }
        }
    }

    /// Drop the named row-label columns (used to discard sort-only keys).
    pub fn drop_index_columns(&mut self, columns: &[String]) {
        let mut positions: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.index_position(c))
            .collect();
        positions.sort_unstable();
        positions.reverse();
        for pos in positions {
            self.index_columns.remove(pos);
            for row in &mut self.rows {
                row.labels.remove(pos);
            }
        }
    }

    /// Stable sort of rows by the named row-label columns, ascending.
    pub fn sort_by_index(&mut self, columns: &[String]) {
        let positions: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.index_position(c))
            .collect();
        self.rows.sort_by(|a, b| {
            let ka: Vec<&String> = positions.iter().map(|&p| &a.labels[p]).collect();
            let kb: Vec<&String> = positions.iter().map(|&p| &b.labels[p]).collect();
            ka.cmp(&kb)
        });
    }

    /// Rename index and value columns from a (from, to) mapping.
    pub fn rename_columns(&mut self, renames: &[(String, String)]) {
        let rename = |name: &mut String| {
            if let Some((_, to)) = renames.iter().find(|(from, _)| from == &*name) {
                *name = to.clone();
            }
        };
        self.index_columns.iter_mut().for_each(rename);
        self.value_columns.iter_mut().for_each(rename);
    }

    /// Replace row-label values in one column (merged small-area display
    /// names and similar presentational relabels).
    pub fn rename_index_values(&mut self, column: &str, renames: &[(String, String)]) {
        if let Some(pos) = self.index_position(column) {
            for row in &mut self.rows {
                if let Some((_, to)) = renames.iter().find(|(from, _)| from == &row.labels[pos]) {
                    row.labels[pos] = to.clone();
                }
            }
        }
    }
}

/// The statistical measure a crosstab derives from the aggregated
/// numerator/denominator counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Coverage,
    Vaccinated,
    Population,
}

impl Measure {
    pub const VALID: [&'static str; 3] = ["Coverage", "Vaccinated", "Population"];

    /// Parse a configured measure name, failing with `InvalidArgument`
    /// for anything outside the permitted set.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value {
            "Coverage" => Ok(Measure::Coverage),
            "Vaccinated" => Ok(Measure::Vaccinated),
            "Population" => Ok(Measure::Population),
            other => Err(PipelineError::InvalidArgument {
                name: "output_type".to_string(),
                value: other.to_string(),
                valid: Self::VALID.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    /// Name of the derived measure column when no pivot column is used.
    pub fn column_name(self) -> &'static str {
        match self {
            Measure::Coverage => "Coverage",
            Measure::Vaccinated => "Number_Vaccinated",
            Measure::Population => "Number_Population",
        }
    }
}

/// Row ordering strategy. The two options are mutually exclusive, so the
/// configuration carries one or the other, never both.
#[derive(Debug, Clone)]
pub enum RowOrdering {
    /// Ascending lexical sort on the named columns. Columns listed here
    /// but not in `rows` are used for sorting only and dropped from the
    /// output afterwards. A sentinel total row, if present, is moved to
    /// the end of the output instead of being sorted in place.
    SortOn {
        columns: Vec<String>,
        include_row_total: bool,
        total_name: String,
    },
    /// A literal ordered list of values per row-label column. Output
    /// contains exactly the listed values in the listed sequence; rows
    /// with values outside the lists are excluded.
    Explicit(Vec<(String, Vec<String>)>),
}

impl RowOrdering {
    pub fn sort_on(columns: &[&str]) -> Self {
        RowOrdering::SortOn {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            include_row_total: false,
            total_name: "Grand_Total".to_string(),
        }
    }

    pub fn explicit(orders: &[(&str, &[&str])]) -> Self {
        RowOrdering::Explicit(
            orders
                .iter()
                .map(|(col, values)| {
                    (
                        col.to_string(),
                        values.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

/// Typed filter over fact label columns, replacing free-text query
/// strings. Referencing a column that does not exist in the fact data is
/// a schema error.
#[derive(Debug, Clone)]
pub enum FilterCondition {
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Equals(String, String),
    All(Vec<FilterCondition>),
}

impl FilterCondition {
    pub fn is_in(column: &str, values: &[&str]) -> Self {
        FilterCondition::In(
            column.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        )
    }

    pub fn equals(column: &str, value: &str) -> Self {
        FilterCondition::Equals(column.to_string(), value.to_string())
    }

    pub fn matches(&self, fact: &FactRecord) -> Result<bool, PipelineError> {
        let lookup = |column: &str| -> Result<String, PipelineError> {
            fact.label(column)
                .map(|v| v.to_string())
                .ok_or_else(|| PipelineError::SchemaMismatch {
                    input: "filter condition".to_string(),
                    missing: vec![column.to_string()],
                })
        };
        match self {
            FilterCondition::In(column, values) => {
                let v = lookup(column)?;
                Ok(values.iter().any(|x| x == &v))
            }
            FilterCondition::NotIn(column, values) => {
                let v = lookup(column)?;
                Ok(!values.iter().any(|x| x == &v))
            }
            FilterCondition::Equals(column, value) => Ok(&lookup(column)? == value),
            FilterCondition::All(conditions) => {
                for c in conditions {
                    if !c.matches(fact)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Row subgroup definition: for one target column, new labels computed as
/// sums over sets of member values.
#[derive(Debug, Clone)]
pub struct RowSubgroup {
    pub column: String,
    pub groups: Vec<(String, Vec<String>)>,
}

impl RowSubgroup {
    pub fn new(column: &str, groups: &[(&str, &[&str])]) -> Self {
        RowSubgroup {
            column: column.to_string(),
            groups: groups
                .iter()
                .map(|(label, members)| {
                    (
                        label.to_string(),
                        members.iter().map(|m| m.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

/// Whether organisations with no data in the reporting window appear in
/// the output with not-available markers or are left out entirely. Varies
/// by output, so it is configuration rather than a universal rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingOrgs {
    #[default]
    Include,
    Exclude,
}

/// Trailing financial-year window of an output. Most tables show the
/// reporting year only; time-series charts and the dashboard feeds take
/// their lengths from the run configuration so an analyst can extend
/// the series without touching the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowYears {
    #[default]
    Single,
    Fixed(usize),
    PublicationSeries,
    DashboardSeries,
}

impl WindowYears {
    pub fn resolve(self, config: &Config) -> usize {
        match self {
            WindowYears::Single => 1,
            WindowYears::Fixed(n) => n.max(1),
            WindowYears::PublicationSeries => config.ts_years_publication.max(1),
            WindowYears::DashboardSeries => config.ts_years_dashboard.max(1),
        }
    }
}

/// The shape of output an entry in the registry produces.
#[derive(Debug, Clone)]
pub enum OutputKind {
    /// A single-measure crosstab (the centerpiece engine).
    Crosstab,
    /// Several no-pivot crosstabs over the same rows, joined side by
    /// side with the measure columns renamed (population + vaccinated +
    /// coverage tables).
    Joined(Vec<(Measure, String)>),
    /// Long-format csv rows (one value column, no pivot).
    CsvLong,
    /// Long-format dashboard feed with population and coverage melted
    /// into a single value column.
    DashboardLong { output_type: String },
}

/// Declarative specification of one publication output. Constructed once
/// as static configuration, consumed once per run, never mutated.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    /// Worksheet name for Excel outputs, file name for csv outputs. Also
    /// the key for output-specific post-processing.
    pub name: String,
    pub kind: OutputKind,
    pub org_type: Option<String>,
    pub measure: Measure,
    /// Row-label columns, in display order.
    pub rows: Vec<String>,
    /// Optional single column whose distinct values become the output
    /// columns.
    pub pivot_column: Option<String>,
    pub ordering: Option<RowOrdering>,
    /// Explicit display order of value columns. When absent, pivoted
    /// columns appear in ascending order.
    pub column_order: Option<Vec<String>>,
    pub column_rename: Vec<(String, String)>,
    pub filter: Option<FilterCondition>,
    pub row_subgroup: Vec<RowSubgroup>,
    /// New pivot values summed from sets of existing pivot values.
    pub column_subgroup: Vec<(String, Vec<String>)>,
    /// Scale applied to both counts before measure derivation, e.g.
    /// 0.001 for thousands.
    pub count_multiplier: Option<f64>,
    /// Trailing financial-year window, resolved against the run
    /// configuration for the series classes.
    pub window: WindowYears,
    /// Decimal places for round-half-up of the value columns. None means
    /// no rounding.
    pub rounding: Option<u32>,
    pub missing_orgs: MissingOrgs,
}

impl Default for OutputSpec {
    fn default() -> Self {
        OutputSpec {
            name: String::new(),
            kind: OutputKind::Crosstab,
            org_type: None,
            measure: Measure::Coverage,
            rows: Vec::new(),
            pivot_column: None,
            ordering: None,
            column_order: None,
            column_rename: Vec::new(),
            filter: None,
            row_subgroup: Vec::new(),
            column_subgroup: Vec::new(),
            count_multiplier: None,
            window: WindowYears::Single,
            rounding: None,
            missing_orgs: MissingOrgs::Include,
        }
    }
}

pub fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

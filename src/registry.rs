// The publication output registry.
//
// Every output the run produces is declared here as data. Adding a new
// table or csv to the publication means adding an entry; the engine and
// the writers never change. Names double as the post-processing key and
// the output file name.
use crate::types::{
    columns, FilterCondition, Measure, MissingOrgs, OutputKind, OutputSpec, RowOrdering,
    RowSubgroup, WindowYears,
};
use once_cell::sync::Lazy;

/// Vaccines offered selectively rather than universally. Excluded from
/// the all-vaccine csv and dashboard outputs, which have their own
/// dedicated tables.
pub const SELECTIVE_VACCS: [&str; 4] = ["BCG_12m", "BCG_3m", "HepB_Group2_12m", "HepB_Group2_24m"];

const REGION_CODES: [&str; 9] = [
    "E12000001",
    "E12000002",
    "E12000003",
    "E12000004",
    "E12000005",
    "E12000006",
    "E12000007",
    "E12000008",
    "E12000009",
];

fn not_selective() -> FilterCondition {
    FilterCondition::NotIn(
        "Vac_Type".to_string(),
        SELECTIVE_VACCS.iter().map(|v| v.to_string()).collect(),
    )
}

fn dashboard_renames() -> Vec<(String, String)> {
    [
        ("FinancialYear", "Year"),
        ("Org_Code", "OrgCode"),
        ("Org_Name", "OrgName"),
        ("Org_Level", "OrgType"),
        ("Vac_Type", "VacCode"),
    ]
    .iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

pub static PUBLICATION_OUTPUTS: Lazy<Vec<OutputSpec>> = Lazy::new(|| {
    vec![
        // England coverage of the 12m vaccines, one row per year. The
        // retired-vaccine columns are inserted in post-processing.
        OutputSpec {
            name: "Table 1".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            column_order: Some(columns(&[
                "DTaP_IPV_Hib_HepB_12m",
                "PCV_12m",
                "Rota_12m",
                "MenB_12m",
            ])),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        OutputSpec {
            name: "Table 2".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            column_order: Some(columns(&[
                "DTaP_IPV_Hib_HepB_24m",
                "MMR_24m",
                "Hib_MenC_24m",
                "PCV_24m",
                "MenB_booster_24m",
            ])),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        OutputSpec {
            name: "Table 3".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            column_order: Some(columns(&[
                "DTaP_IPV_Hib_5y",
                "DTaP_IPV_5y",
                "MMR1_5y",
                "MMR2_5y",
                "Hib_MenC_5y",
            ])),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // England eligible population (thousands) of the 12m cohort.
        OutputSpec {
            name: "Table 1 population".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Population,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            filter: Some(FilterCondition::is_in(
                "Vac_Type",
                &["DTaP_IPV_Hib_HepB_12m"],
            )),
            count_multiplier: Some(0.001),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // DTaP 24m coverage, one column per region.
        OutputSpec {
            name: "Table 4a".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Parent_Org_Code".to_string()),
            column_order: Some(columns(&REGION_CODES)),
            filter: Some(FilterCondition::is_in(
                "Vac_Type",
                &["DTaP_IPV_Hib_HepB_24m"],
            )),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // Devolved-nation rows in a fixed presentation order.
        OutputSpec {
            name: "Table 5 nations".to_string(),
            org_type: Some("NAT".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            ordering: Some(RowOrdering::explicit(&[(
                "Org_Name",
                &["Wales", "Scotland", "Northern Ireland"],
            )])),
            column_order: Some(columns(&[
                "DTaP_IPV_Hib_HepB_12m",
                "PCV_12m",
                "Rota_12m",
                "MenB_12m",
            ])),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // All LAs, coverage of every vaccine, sorted under their region.
        OutputSpec {
            name: "Table 10a".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["Org_Code", "Org_Name", "Parent_Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            ordering: Some(RowOrdering::sort_on(&["Parent_Org_Code", "Org_Name"])),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // HepB selective-programme tables: population, vaccinated and
        // coverage side by side, suppressed in post-processing. Only LAs
        // running the programme report, so missing LAs are excluded.
        OutputSpec {
            name: "Table 11b".to_string(),
            kind: OutputKind::Joined(vec![
                (Measure::Population, "Population".to_string()),
                (Measure::Vaccinated, "Vaccinated".to_string()),
                (Measure::Coverage, "Coverage".to_string()),
            ]),
            org_type: Some("LA".to_string()),
            rows: columns(&[
                "Org_Code",
                "Org_Name",
                "Parent_Org_Name",
                "Vaccine_Status",
            ]),
            ordering: Some(RowOrdering::sort_on(&["Parent_Org_Name", "Org_Name"])),
            filter: Some(FilterCondition::is_in("Vac_Type", &["HepB_Group2_12m"])),
            rounding: Some(1),
            missing_orgs: MissingOrgs::Exclude,
            ..OutputSpec::default()
        },
        OutputSpec {
            name: "Table 11c".to_string(),
            kind: OutputKind::Joined(vec![
                (Measure::Population, "Population".to_string()),
                (Measure::Vaccinated, "Vaccinated".to_string()),
                (Measure::Coverage, "Coverage".to_string()),
            ]),
            org_type: Some("LA".to_string()),
            rows: columns(&[
                "Org_Code",
                "Org_Name",
                "Parent_Org_Name",
                "Vaccine_Status",
            ]),
            ordering: Some(RowOrdering::sort_on(&["Parent_Org_Name", "Org_Name"])),
            filter: Some(FilterCondition::is_in("Vac_Type", &["HepB_Group2_24m"])),
            rounding: Some(1),
            missing_orgs: MissingOrgs::Exclude,
            ..OutputSpec::default()
        },
        // Long-run national time series for the chart source data, with
        // merged early/late age bands as an extra row.
        OutputSpec {
            name: "DTaP_12m_TSeries".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            column_order: Some(columns(&["DTaP_IPV_Hib_HepB_12m"])),
            window: WindowYears::PublicationSeries,
            rounding: Some(1),
            ..OutputSpec::default()
        },
        OutputSpec {
            name: "MMR_24m_TSeries".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["FinancialYear"]),
            pivot_column: Some("Vac_Type".to_string()),
            column_order: Some(columns(&["MMR_24m"])),
            window: WindowYears::PublicationSeries,
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // Age-band subgroup example: combined 12m and 24m DTaP cohorts
        // reported alongside the individual bands.
        OutputSpec {
            name: "DTaP_combined_ages".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["Child_Age"]),
            pivot_column: Some("Vac_Type".to_string()),
            row_subgroup: vec![RowSubgroup::new(
                "Child_Age",
                &[("12m_24m", &["12m", "24m"])],
            )],
            column_subgroup: vec![(
                "DTaP_all".to_string(),
                vec![
                    "DTaP_IPV_Hib_HepB_12m".to_string(),
                    "DTaP_IPV_Hib_HepB_24m".to_string(),
                ],
            )],
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // Tidy csv of LA numerators and denominators for every universal
        // vaccine. Population rows are relabeled to the eligible-pop
        // indicators; LA display names and ordering are finished in
        // post-processing.
        OutputSpec {
            name: "childhood-vaccination-la-num-denom".to_string(),
            kind: OutputKind::CsvLong,
            org_type: Some("LA".to_string()),
            measure: Measure::Population,
            rows: columns(&[
                "FinancialYear",
                "Parent_Org_Code",
                "Parent_Org_Name",
                "Org_Code",
                "Org_Name",
                "Child_Age",
                "Vac_Type",
            ]),
            ordering: Some(RowOrdering::sort_on(&[
                "Parent_Org_Code",
                "Org_Name",
                "Child_Age",
                "Vac_Type",
            ])),
            column_rename: vec![
                ("Vac_Type".to_string(), "Indicator".to_string()),
                ("Number_Population".to_string(), "Value".to_string()),
                ("FinancialYear".to_string(), "CollectionYearRange".to_string()),
            ],
            filter: Some(not_selective()),
            ..OutputSpec::default()
        },
        OutputSpec {
            name: "childhood-vaccination-la-num-denom-vaccinated".to_string(),
            kind: OutputKind::CsvLong,
            org_type: Some("LA".to_string()),
            measure: Measure::Vaccinated,
            rows: columns(&[
                "FinancialYear",
                "Parent_Org_Code",
                "Parent_Org_Name",
                "Org_Code",
                "Org_Name",
                "Child_Age",
                "Vac_Type",
            ]),
            ordering: Some(RowOrdering::sort_on(&[
                "Parent_Org_Code",
                "Org_Name",
                "Child_Age",
                "Vac_Type",
            ])),
            column_rename: vec![
                ("Vac_Type".to_string(), "Indicator".to_string()),
                ("Number_Vaccinated".to_string(), "Value".to_string()),
                ("FinancialYear".to_string(), "CollectionYearRange".to_string()),
            ],
            filter: Some(not_selective()),
            ..OutputSpec::default()
        },
        // Map source for the dashboard report.
        OutputSpec {
            name: "childhood_vaccination_map_data".to_string(),
            org_type: Some("LA".to_string()),
            measure: Measure::Coverage,
            rows: columns(&["FinancialYear", "Parent_Org_Code", "Org_Code", "Org_Name"]),
            pivot_column: Some("Vac_Type".to_string()),
            ordering: Some(RowOrdering::sort_on(&["Parent_Org_Code", "Org_Code"])),
            column_rename: vec![(
                "FinancialYear".to_string(),
                "CollectionYearRange".to_string(),
            )],
            filter: Some(FilterCondition::is_in(
                "Vac_Type",
                &["DTaP_IPV_Hib_HepB_12m", "MMR_24m"],
            )),
            rounding: Some(1),
            ..OutputSpec::default()
        },
        // Published dashboard feed, one section per organisation level.
        OutputSpec {
            name: "dashboard-data-england".to_string(),
            kind: OutputKind::DashboardLong {
                output_type: "National".to_string(),
            },
            org_type: Some("LA".to_string()),
            rows: columns(&[
                "FinancialYear",
                "Org_Code",
                "Org_Name",
                "Org_Level",
                "Vac_Type",
            ]),
            ordering: Some(RowOrdering::sort_on(&["Vac_Type", "Org_Code"])),
            column_rename: dashboard_renames(),
            filter: Some(not_selective()),
            window: WindowYears::DashboardSeries,
            ..OutputSpec::default()
        },
        OutputSpec {
            name: "dashboard-data-regions".to_string(),
            kind: OutputKind::DashboardLong {
                output_type: "Region".to_string(),
            },
            org_type: Some("LA".to_string()),
            rows: columns(&[
                "FinancialYear",
                "Parent_Org_Code",
                "Parent_Org_Name",
                "Org_Level",
                "Vac_Type",
            ]),
            ordering: Some(RowOrdering::sort_on(&["Vac_Type", "Parent_Org_Code"])),
            column_rename: vec![
                ("FinancialYear".to_string(), "Year".to_string()),
                ("Parent_Org_Code".to_string(), "OrgCode".to_string()),
                ("Parent_Org_Name".to_string(), "OrgName".to_string()),
                ("Org_Level".to_string(), "OrgType".to_string()),
                ("Vac_Type".to_string(), "VacCode".to_string()),
            ],
            filter: Some(not_selective()),
            window: WindowYears::DashboardSeries,
            ..OutputSpec::default()
        },
        OutputSpec {
            name: "dashboard-data-las".to_string(),
            kind: OutputKind::DashboardLong {
                output_type: "LA".to_string(),
            },
            org_type: Some("LA".to_string()),
            rows: columns(&[
                "FinancialYear",
                "Org_Code",
                "Org_Name",
                "Org_Level",
                "Vac_Type",
            ]),
            ordering: Some(RowOrdering::sort_on(&["Vac_Type", "Org_Code"])),
            column_rename: dashboard_renames(),
            filter: Some(not_selective()),
            window: WindowYears::DashboardSeries,
            ..OutputSpec::default()
        },
    ]
});

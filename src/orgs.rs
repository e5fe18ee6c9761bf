// Organisation reference data: code-prefix classification, the per-run
// snapshot, and the resolver that guarantees complete organisation
// coverage for local-level outputs.
use crate::config::Config;
use crate::error::{validate_value_with_list, PipelineError};
use crate::types::columns;
use crate::util::fyear_start_end;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;

/// Geographic level of an organisation, derived from its code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgLevel {
    National,
    Regional,
    Local,
    Lsoa,
}

impl OrgLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            OrgLevel::National => "National",
            OrgLevel::Regional => "Regional",
            OrgLevel::Local => "Local",
            OrgLevel::Lsoa => "LSOA",
        }
    }
}

/// Classification of an organisation code: its reporting type and level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgClass {
    pub org_type: &'static str,
    pub org_level: OrgLevel,
}

/// Prefix table covering every organisation type processed by the
/// pipeline. Extend as new entity codes appear.
const ORG_CODE_CLASSES: &[(&str, OrgClass)] = &[
    (
        "E01",
        OrgClass {
            org_type: "LSOA",
            org_level: OrgLevel::Lsoa,
        },
    ),
    (
        "E06",
        OrgClass {
            org_type: "LA",
            org_level: OrgLevel::Local,
        },
    ),
    (
        "E07",
        OrgClass {
            org_type: "LA",
            org_level: OrgLevel::Local,
        },
    ),
    (
        "E08",
        OrgClass {
            org_type: "LA",
            org_level: OrgLevel::Local,
        },
    ),
    (
        "E09",
        OrgClass {
            org_type: "LA",
            org_level: OrgLevel::Local,
        },
    ),
    (
        "E10",
        OrgClass {
            org_type: "LA",
            org_level: OrgLevel::Local,
        },
    ),
    (
        "E12",
        OrgClass {
            org_type: "LA_parent",
            org_level: OrgLevel::Regional,
        },
    ),
    (
        "E38",
        OrgClass {
            org_type: "CCG",
            org_level: OrgLevel::Local,
        },
    ),
    (
        "E40",
        OrgClass {
            org_type: "ICB_parent",
            org_level: OrgLevel::Regional,
        },
    ),
    (
        "E54",
        OrgClass {
            org_type: "ICB",
            org_level: OrgLevel::Local,
        },
    ),
    (
        "E92",
        OrgClass {
            org_type: "National",
            org_level: OrgLevel::National,
        },
    ),
];

/// Legacy lower-tier local authority prefix, excluded from local-level
/// outputs (upper-tier LAs are reported instead).
const LOWER_TIER_LA_PREFIX: &str = "E07";

/// Classify an organisation code by longest matching prefix.
pub fn classify_org_code(code: &str) -> Option<OrgClass> {
    ORG_CODE_CLASSES
        .iter()
        .filter(|(prefix, _)| code.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, class)| *class)
}

/// One row of the organisation reference extract as supplied by the
/// corporate reference source.
#[derive(Debug, Deserialize)]
pub struct RawOrgRow {
    #[serde(rename = "Org_Code")]
    pub org_code: Option<String>,
    #[serde(rename = "Org_Name")]
    pub org_name: Option<String>,
    #[serde(rename = "Parent_Org_Code", default)]
    pub parent_org_code: Option<String>,
    #[serde(rename = "Open_Date", default)]
    pub open_date: Option<String>,
}

/// One resolved organisation: canonical name, parent linkage and the
/// derived type/level classification.
#[derive(Debug, Clone)]
pub struct OrgRecord {
    pub code: String,
    pub name: String,
    pub parent_code: String,
    pub parent_name: String,
    pub class: Option<OrgClass>,
    pub open_date: Option<NaiveDate>,
}

/// The organisation hierarchy snapshot for one pipeline run. Built once
/// near the start of the run and read-only thereafter: exactly one
/// active record per organisation code, duplicates resolved by most
/// recent open date.
#[derive(Debug, Clone)]
pub struct OrgRefSnapshot {
    records: Vec<OrgRecord>,
}

impl OrgRefSnapshot {
    /// Build the snapshot from the raw reference extract: parse, resolve
    /// duplicates, fill parent names by self-join, classify by code
    /// prefix, and drop the small LAs whose data is combined into larger
    /// neighbours.
    pub fn build(raw: Vec<RawOrgRow>, config: &Config) -> Result<Self, PipelineError> {
        let mut by_code: HashMap<String, OrgRecord> = HashMap::new();
        let mut skipped = 0usize;

        for row in raw {
            let (Some(code), Some(name)) = (row.org_code, row.org_name) else {
                skipped += 1;
                continue;
            };
            let open_date = row
                .open_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());
            let record = OrgRecord {
                class: classify_org_code(&code),
                code: code.clone(),
                name: name.trim().to_string(),
                parent_code: row.parent_org_code.unwrap_or_default().trim().to_string(),
                parent_name: String::new(),
                open_date,
            };
            match by_code.get(&code) {
                // Keep the most recently opened record for each code.
                Some(existing) if existing.open_date >= record.open_date => {}
                _ => {
                    by_code.insert(code, record);
                }
            }
        }
        if skipped > 0 {
            log::warn!("organisation reference: skipped {skipped} rows with missing code or name");
        }

        // Self-join for parent names now that duplicates are resolved.
        let names: HashMap<String, String> = by_code
            .iter()
            .map(|(code, r)| (code.clone(), r.name.clone()))
            .collect();
        let mut records: Vec<OrgRecord> = by_code
            .into_values()
            .map(|mut r| {
                r.parent_name = names.get(&r.parent_code).cloned().unwrap_or_default();
                r
            })
            .collect();

        // Small LAs are reported under their combining neighbour, so
        // they are removed from the snapshot entirely.
        records.retain(|r| !config.la_merges.iter().any(|m| m.from_code == r.code));

        records.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(OrgRefSnapshot { records })
    }

    pub fn records(&self) -> &[OrgRecord] {
        &self.records
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.records.iter().any(|r| r.code == code)
    }

    /// Resolve the valid local-level organisations of one type, with the
    /// requested detail columns, for joining to output data.
    ///
    /// Organisations opened after the end of the reporting year are
    /// excluded; they cannot have submitted data for it. The reference
    /// snapshot is not year-versioned in storage, so a requested
    /// `FinancialYear` column is synthesized from the run's reporting
    /// year. Requested columns the reference cannot supply are dropped
    /// (the caller keeps its own values for those).
    ///
    /// Returns the kept column names plus one row of values per valid
    /// organisation, ordered by organisation code.
    pub fn organisations_for(
        &self,
        org_type: &str,
        requested_columns: &[String],
        reporting_year: &str,
        valid_org_types: &[String],
    ) -> Result<(Vec<String>, Vec<Vec<String>>), PipelineError> {
        validate_value_with_list("Org_Type", org_type, valid_org_types)?;
        let (_, year_end) = fyear_start_end(reporting_year)?;

        let available = [
            "Org_Code",
            "Org_Name",
            "Parent_Org_Code",
            "Parent_Org_Name",
            "FinancialYear",
        ];
        let kept: Vec<String> = requested_columns
            .iter()
            .filter(|c| available.contains(&c.as_str()))
            .cloned()
            .collect();

        let rows = self
            .records
            .iter()
            .filter(|r| {
                r.class.map_or(false, |c| {
                    c.org_type == org_type && c.org_level == OrgLevel::Local
                }) && !r.code.starts_with(LOWER_TIER_LA_PREFIX)
                    && r.open_date.map_or(true, |d| d <= year_end)
            })
            .map(|r| {
                kept.iter()
                    .map(|column| match column.as_str() {
                        "Org_Code" => r.code.clone(),
                        "Org_Name" => r.name.clone(),
                        "Parent_Org_Code" => r.parent_code.clone(),
                        "Parent_Org_Name" => r.parent_name.clone(),
                        "FinancialYear" => reporting_year.to_string(),
                        _ => unreachable!("column filtered above"),
                    })
                    .collect()
            })
            .collect();

        Ok((kept, rows))
    }
}

/// Load the organisation reference extract from csv and build the
/// snapshot for this run.
pub fn load_org_ref(path: &str, config: &Config) -> Result<OrgRefSnapshot, PipelineError> {
    log::info!("Importing organisation reference data from {path}");
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut raw = Vec::new();
    for result in rdr.deserialize::<RawOrgRow>() {
        raw.push(result?);
    }
    OrgRefSnapshot::build(raw, config)
}

// Run parameters for the publication pipeline.
//
// Everything an analyst adjusts between runs lives here: the reporting
// period, time-series window lengths, disclosure-control thresholds, the
// small-LA merge table and the output symbols. Values can be overridden
// from a JSON file; the defaults describe the current publication.
use crate::error::PipelineError;
use serde::Deserialize;
use std::path::Path;

/// Disclosure-control thresholds for the HES-style suppression rule.
#[derive(Debug, Clone, Deserialize)]
pub struct SuppressionBounds {
    pub lower: f64,
    pub upper: f64,
    pub base: u32,
}

impl Default for SuppressionBounds {
    fn default() -> Self {
        SuppressionBounds {
            lower: 1.0,
            upper: 7.0,
            base: 5,
        }
    }
}

/// One small local authority whose data is combined into a larger
/// neighbour for publication.
#[derive(Debug, Clone, Deserialize)]
pub struct LaMerge {
    pub from_code: String,
    pub to_code: String,
    pub from_name: String,
    pub to_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Start of the current reporting financial year as recorded in the
    /// source data (DDMMMYYYY).
    pub fyear_start: String,

    /// Input/output locations.
    pub facts_file: String,
    pub org_ref_file: String,
    pub output_dir: String,
    pub validation_dir: String,

    /// Years of data in the publication time series and in the
    /// dashboard feed, consumed by the series window classes.
    pub ts_years_publication: usize,
    pub ts_years_dashboard: usize,

    /// Symbols for not-available and not-applicable values in outputs.
    pub not_available: String,
    pub not_applicable: String,

    /// Local-level organisation types valid for sub-regional outputs.
    pub local_level_org_types: Vec<String>,

    pub suppression: SuppressionBounds,

    /// Which vaccine's denominator defines the eligible population for
    /// each child age, as (population label, vaccine code) pairs.
    pub population_vaccines: Vec<(String, String)>,

    /// Small LAs combined with larger LAs for publication outputs.
    pub la_merges: Vec<LaMerge>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fyear_start: "01APR2022".to_string(),
            facts_file: "childhood_vaccination_facts.csv".to_string(),
            org_ref_file: "org_ref.csv".to_string(),
            output_dir: "outputs".to_string(),
            validation_dir: "validations".to_string(),
            ts_years_publication: 10,
            ts_years_dashboard: 7,
            not_available: ":".to_string(),
            not_applicable: "z".to_string(),
            local_level_org_types: vec!["LA".to_string(), "ICB".to_string()],
            suppression: SuppressionBounds::default(),
            population_vaccines: vec![
                (
                    "12m_Eligible_Pop".to_string(),
                    "DTaP_IPV_Hib_HepB_12m".to_string(),
                ),
                (
                    "24m_Eligible_Pop".to_string(),
                    "DTaP_IPV_Hib_HepB_24m".to_string(),
                ),
                ("5y_Eligible_Pop".to_string(), "MMR1_5y".to_string()),
            ],
            la_merges: vec![
                LaMerge {
                    from_code: "E09000001".to_string(),
                    to_code: "E09000012".to_string(),
                    from_name: "City of London".to_string(),
                    to_name: "Hackney".to_string(),
                },
                LaMerge {
                    from_code: "E06000053".to_string(),
                    to_code: "E06000052".to_string(),
                    from_name: "Isles of Scilly".to_string(),
                    to_name: "Cornwall".to_string(),
                },
                LaMerge {
                    from_code: "E06000017".to_string(),
                    to_code: "E10000018".to_string(),
                    from_name: "Rutland".to_string(),
                    to_name: "Leicestershire".to_string(),
                },
            ],
        }
    }
}

impl Config {
    /// Load overrides from a JSON file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// The current reporting financial year label (YYYY-YY).
    pub fn reporting_year(&self) -> Result<String, PipelineError> {
        crate::util::fyear_from_start(&self.fyear_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reporting_year_label() {
        let config = Config::default();
        assert_eq!(config.reporting_year().unwrap(), "2022-23");
    }

    #[test]
    fn partial_json_overrides_keep_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"fyear_start": "01APR2023", "ts_years_publication": 3}"#)
                .unwrap();
        assert_eq!(config.reporting_year().unwrap(), "2023-24");
        assert_eq!(config.ts_years_publication, 3);
        assert_eq!(config.not_available, ":");
        assert_eq!(config.la_merges.len(), 3);
    }
}

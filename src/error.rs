// Error taxonomy for the publication pipeline.
//
// Every fatal condition names the offending value and, where applicable,
// the set it should have belonged to. Non-fatal data-integrity warnings
// are not errors: they are logged and the offending rows exported to a
// side file (see `validate`), after which processing continues.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An argument (org type, measure, output type...) is outside the
    /// permitted enumerated set. Always fatal, no partial output.
    #[error("invalid value '{value}' entered in the {name} input; only {valid:?} are valid values")]
    InvalidArgument {
        name: String,
        value: String,
        valid: Vec<String>,
    },

    /// An input dataset is missing columns the process expects.
    #[error("{input} does not contain expected columns {missing:?}")]
    SchemaMismatch {
        input: String,
        missing: Vec<String>,
    },

    /// An anomaly severe enough to invalidate the whole run, e.g. a
    /// source containing data for the wrong reporting period.
    #[error("data integrity check failed: {0}")]
    DataIntegrity(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Check a value against the list of valid values for an input, aborting
/// the run with `InvalidArgument` if it is not found.
pub fn validate_value_with_list(
    check_name: &str,
    value: &str,
    valid_values: &[String],
) -> Result<(), PipelineError> {
    if valid_values.iter().any(|v| v == value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidArgument {
            name: check_name.to_string(),
            value: value.to_string(),
            valid: valid_values.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_member_of_list() {
        let valid = vec!["LA".to_string(), "ICB".to_string()];
        assert!(validate_value_with_list("Org_Type", "LA", &valid).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_value_and_names_the_valid_set() {
        let valid = vec!["LA".to_string(), "ICB".to_string()];
        let err = validate_value_with_list("Org_Type", "PCT", &valid).unwrap_err();
        match err {
            PipelineError::InvalidArgument { name, value, valid } => {
                assert_eq!(name, "Org_Type");
                assert_eq!(value, "PCT");
                assert_eq!(valid, vec!["LA".to_string(), "ICB".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

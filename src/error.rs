//! Typed error kinds returned by the engine's fallible entry points.
//!
//! Every public operation that can fail returns `Result<T, EngineError>`
//! rather than panicking. Silent exclusions (static positions, NMDs without
//! behavioural parameters) are not errors — see `ExclusionCounts` in
//! `contracts`.

use thiserror::Error;

/// The closed set of failure kinds the engine can surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// A required column/attribute is blank, a `side` is neither A nor L,
    /// a daycount is unrecognised, or a frequency token is malformed in
    /// strict mode.
    #[error("invalid input for contract {contract_id:?}: {message}")]
    InvalidInput {
        contract_id: Option<String>,
        message: String,
    },

    /// `maturity_date < start_date`, a floating row with no `index_name`,
    /// or a scheduled position with no flows supplied.
    #[error("inconsistent schedule for contract {contract_id:?}: {message}")]
    InconsistentSchedule {
        contract_id: Option<String>,
        message: String,
    },

    /// A position references an `index_name` absent from the curve set.
    #[error("missing curve {index_name:?} (required by contract {contract_id:?})")]
    MissingCurve {
        contract_id: Option<String>,
        index_name: String,
    },

    /// Margin lookup found no match and no default was supplied.
    #[error("no margin found for request {request}")]
    MissingMargin { request: String },

    /// Scenario id outside the closed regulatory catalog.
    #[error("unsupported scenario id: {0}")]
    UnsupportedScenario(String),

    /// Currency outside the Annex Part A table.
    #[error("no regulatory shock parameters for currency: {0}")]
    MissingCurrencyShock(String),

    /// Mixed spec without `mixed_fixed_years`, or variable spec without
    /// `variable_index`.
    #[error("cannot decompose loan spec: {0}")]
    DecompositionError(String),

    /// Any worker error, tagged by scenario id, propagated as a single
    /// aggregated failure — no partial scenario result is returned. The
    /// message is rendered once at construction time rather than inside
    /// the `#[error(...)]` attribute, so the variant only ever needs the
    /// plain field-interpolation `thiserror` supports everywhere else in
    /// this enum.
    #[error("{summary}")]
    WorkerAggregatedError {
        failures: Vec<(String, Box<EngineError>)>,
        summary: String,
    },
}

impl EngineError {
    pub fn invalid_input(contract_id: impl Into<Option<String>>, message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            contract_id: contract_id.into(),
            message: message.into(),
        }
    }

    pub fn inconsistent_schedule(
        contract_id: impl Into<Option<String>>,
        message: impl Into<String>,
    ) -> Self {
        EngineError::InconsistentSchedule {
            contract_id: contract_id.into(),
            message: message.into(),
        }
    }

    /// Build an aggregated failure from per-scenario errors, tagged by
    /// scenario id. Panics are never used for this — an empty `failures`
    /// list is a caller bug, not something this constructor should hide.
    pub fn worker_aggregated(failures: Vec<(String, EngineError)>) -> Self {
        let summary = format!(
            "{} scenario(s) failed: {}",
            failures.len(),
            failures
                .iter()
                .map(|(scenario, err)| format!("{scenario}: {err}"))
                .collect::<Vec<_>>()
                .join("; ")
        );
        EngineError::WorkerAggregatedError {
            failures: failures
                .into_iter()
                .map(|(scenario, err)| (scenario, Box::new(err)))
                .collect(),
            summary,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_aggregated_error_summarises_all_tags() {
        let err = EngineError::worker_aggregated(vec![
            (
                "parallel-up".to_string(),
                EngineError::MissingCurve {
                    contract_id: Some("A1".to_string()),
                    index_name: "EUR_EURIBOR_3M".to_string(),
                },
            ),
            (
                "short-down".to_string(),
                EngineError::UnsupportedScenario("foo".to_string()),
            ),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("parallel-up"));
        assert!(msg.contains("short-down"));
        assert!(msg.contains("2 scenario(s) failed"));
    }
}

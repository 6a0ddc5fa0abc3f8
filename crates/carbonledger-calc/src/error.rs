use carbonledger_core::Scope;
use serde::Serialize;
use thiserror::Error;

/// Pipeline stage a record was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Row could not be read into an activity record.
    Import,
    Sanitize,
    Normalize,
    Resolve,
    Calculate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Sanitize => "sanitize",
            Self::Normalize => "normalize",
            Self::Resolve => "resolve",
            Self::Calculate => "calculate",
        }
    }
}

/// Per-record failure. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalcError {
    #[error("cannot parse {input:?} as a number: {reason}")]
    Parse { input: String, reason: String },

    #[error("unknown unit {unit:?}, did you mean {suggestion:?}?")]
    UnknownUnit { unit: String, suggestion: String },

    #[error("no conversion context for {key:?} from {from} to {to}")]
    MissingConversionContext {
        key: String,
        from: String,
        to: String,
    },

    #[error(
        "no emission factor for {scope} / {category} / {activity_type} in {country_code} {year} (datasets: {datasets})"
    )]
    FactorNotFound {
        scope: Scope,
        category: String,
        activity_type: String,
        country_code: String,
        year: i32,
        datasets: String,
    },

    #[error("invalid emission factor {id}: {reason}")]
    InvalidFactor { id: String, reason: String },

    #[error("arithmetic overflow computing {0}")]
    Arithmetic(&'static str),
}

impl CalcError {
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Import column the failure is attributed to.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Parse { .. } | Self::Arithmetic(_) => "amount",
            Self::UnknownUnit { .. } | Self::MissingConversionContext { .. } => "unit",
            Self::FactorNotFound { .. } => "activity_type",
            Self::InvalidFactor { .. } => "emission_factor",
        }
    }
}

/// A record that stopped at `stage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRecord {
    pub record_id: String,
    pub stage: Stage,
    pub error: CalcError,
}

impl FailedRecord {
    pub fn column(&self) -> &'static str {
        self.error.column()
    }
}

/// Batch-level failure report for one input row (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub record_id: Option<String>,
    pub stage: Stage,
    pub column: String,
    pub message: String,
}

impl RowFailure {
    pub fn from_failed(row: usize, failed: &FailedRecord) -> Self {
        Self {
            row,
            record_id: Some(failed.record_id.clone()),
            stage: failed.stage,
            column: failed.column().to_string(),
            message: failed.error.to_string(),
        }
    }

    /// Row that never became a record, e.g. a malformed CSV line.
    pub fn import(row: usize, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row,
            record_id: None,
            stage: Stage::Import,
            column: column.into(),
            message: message.into(),
        }
    }
}

//! Emission calculation pipeline: sanitize supplier numbers, normalize units,
//! resolve emission factors, then calculate, score and aggregate CO2e.

pub mod aggregate;
pub mod context;
mod error;
pub mod pipeline;
pub mod quality;
pub mod reference;
pub mod resolve;
pub mod sanitize;
pub mod uncertainty;
pub mod units;

pub use aggregate::{EmissionsAggregate, ScopeSubtotal};
pub use context::{ConversionContext, ConversionContexts, ExchangeRate};
pub use error::{CalcError, FailedRecord, RowFailure, Stage};
pub use pipeline::{BatchResult, Pipeline, RecordOutcome};
pub use quality::score_quality;
pub use reference::{FactorUnit, ReferenceData, ReferenceError};
pub use resolve::{FactorQuery, resolve_factor};
pub use sanitize::{detect_locale, sanitize_number, sanitize_str};
pub use uncertainty::estimate_uncertainty;
pub use units::{Normalized, UnitDef, UnitNormalizer, lookup_unit, suggest_unit};

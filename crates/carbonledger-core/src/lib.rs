pub mod activity;
pub mod config;
pub mod factor;
pub mod result;
pub mod schema;
pub mod unit;

pub use activity::{ActivityRecord, LocaleHint, RawAmount, ReportingPeriod, Scope};
pub use config::{
    CalcConfig, ConfigError, FactorUncertaintyDefaults, QualityConfig, QualityWeights,
    UncertaintyConfig,
};
pub use factor::{
    DatasetKind, EmissionFactor, ExtensionKey, ExtensionValue, FactorExtensions, FactorId, Gas,
    GwpSet, GLOBAL_REGION,
};
pub use result::{CalculationResult, MatchTier, QualityScore, UncertaintyResult};
pub use schema::emissions;
pub use unit::{AppliedConversion, CanonicalUnit, Dimension, Quantity};

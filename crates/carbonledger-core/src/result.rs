//! Calculated outputs: per-record results, quality breakdowns, uncertainty.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::activity::Scope;
use crate::factor::FactorId;
use crate::unit::{AppliedConversion, Quantity};

/// Waterfall level at which a factor lookup succeeded, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTier {
    Override,
    Specific,
    Exact,
    NearestYear,
    Regional,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "OVERRIDE",
            Self::Specific => "SPECIFIC",
            Self::Exact => "EXACT",
            Self::NearestYear => "NEAREST_YEAR",
            Self::Regional => "REGIONAL",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data quality breakdown. Every sub-score is on the 1–5 scale, 5 best.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub source: f64,
    pub temporal: f64,
    pub geographic: f64,
    pub completeness: f64,
    /// Weighted composite, rounded and clamped to 1..=5.
    pub composite: u8,
}

/// Monte Carlo uncertainty bounds in kgCO2e.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyResult {
    pub iterations: u32,
    /// Combined coefficient of variation, as a fraction.
    pub combined_cv: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub ci90: (f64, f64),
    pub ci95: (f64, f64),
}

/// Result of calculating one activity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub record_id: String,
    pub tenant_id: String,
    pub scope: Scope,
    pub category: String,
    pub activity_type: String,
    pub normalized: Quantity,
    /// Every unit, density, and currency step applied on the way to `normalized`
    /// and to the factor's denominator unit.
    pub conversions: Vec<AppliedConversion>,
    pub factor_id: FactorId,
    pub dataset: String,
    pub tier: MatchTier,
    /// GWP multiplier applied for per-gas factors; 1 for CO2e factors.
    pub gwp: Decimal,
    pub co2e_kg: Decimal,
    pub co2e_tonnes: Decimal,
    pub quality: QualityScore,
    pub uncertainty: Option<UncertaintyResult>,
}

impl CalculationResult {
    /// CO2e in kg rounded to 4 decimal places for reporting.
    pub fn co2e_kg_rounded(&self) -> Decimal {
        self.co2e_kg.round_dp(4)
    }
}

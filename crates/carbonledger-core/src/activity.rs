//! Supplier-submitted activity lines as they arrive from import or manual entry.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::factor::FactorId;

/// GHG Protocol scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Scope {
    Scope1,
    Scope2,
    Scope3,
}

impl Scope {
    pub fn number(self) -> u8 {
        match self {
            Self::Scope1 => 1,
            Self::Scope2 => 2,
            Self::Scope3 => 3,
        }
    }
}

impl TryFrom<u8> for Scope {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Scope1),
            2 => Ok(Self::Scope2),
            3 => Ok(Self::Scope3),
            other => Err(format!("scope must be 1, 2 or 3, got {other}")),
        }
    }
}

impl From<Scope> for u8 {
    fn from(scope: Scope) -> Self {
        scope.number()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope {}", self.number())
    }
}

/// Number formatting convention of the submitting supplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LocaleHint {
    /// `1,234.56`
    Us,
    /// `1.234,56`
    Eu,
    #[default]
    Auto,
}

/// Amount exactly as submitted: spreadsheet text or an already-typed number.
///
/// In JSON a string is always `Text`, so it goes through the locale-aware
/// sanitizer; only JSON numbers become `Decimal` (or `Float` when out of
/// decimal range).
#[derive(Debug, Clone, PartialEq)]
pub enum RawAmount {
    Decimal(Decimal),
    Float(f64),
    Text(String),
}

impl Serialize for RawAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Float(v) => serializer.serialize_f64(*v),
            // Typed amounts stay numbers. Beyond f64 precision the plain decimal
            // string is the only lossless form.
            Self::Decimal(d) => match d
                .to_f64()
                .filter(|f| Decimal::from_str(&f.to_string()).ok() == Some(*d))
            {
                Some(f) => serializer.serialize_f64(f),
                None => serializer.serialize_str(&d.to_string()),
            },
        }
    }
}

impl<'de> Deserialize<'de> for RawAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawAmountVisitor;

        impl Visitor<'_> for RawAmountVisitor {
            type Value = RawAmount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or numeric text")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<RawAmount, E> {
                Ok(RawAmount::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<RawAmount, E> {
                Ok(RawAmount::Text(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawAmount, E> {
                Ok(RawAmount::Decimal(Decimal::from(v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawAmount, E> {
                Ok(RawAmount::Decimal(Decimal::from(v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawAmount, E> {
                // Shortest round-trip text, so 0.1 stays 0.1.
                Ok(Decimal::from_str(&v.to_string())
                    .map(RawAmount::Decimal)
                    .unwrap_or(RawAmount::Float(v)))
            }
        }

        deserializer.deserialize_any(RawAmountVisitor)
    }
}

impl From<&str> for RawAmount {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Decimal> for RawAmount {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl fmt::Display for RawAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Reporting period. The year drives factor selection; dates are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingPeriod {
    pub year: i32,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl ReportingPeriod {
    pub fn year(year: i32) -> Self {
        Self {
            year,
            start: None,
            end: None,
        }
    }
}

/// One reported activity line, owned by a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub tenant_id: String,
    pub scope: Scope,
    pub category: String,
    /// Substance or activity, e.g. `diesel`, `electricity`, `purchased_goods`.
    pub activity_type: String,
    pub raw_amount: RawAmount,
    pub raw_unit: String,
    /// ISO 3166-1 alpha-2, or `GLOBAL`.
    pub country_code: String,
    pub period: ReportingPeriod,
    #[serde(default)]
    pub locale: LocaleHint,
    /// Manual factor in kgCO2e per canonical unit; bypasses lookup.
    #[serde(default)]
    pub factor_override: Option<Decimal>,
    /// Supplier/tenant-specific factor linked by id.
    #[serde(default)]
    pub specific_factor_id: Option<FactorId>,
    /// Preferred dataset; the configured priority list is used when absent.
    #[serde(default)]
    pub dataset: Option<String>,

    // Optional completeness fields.
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub facility_id: Option<String>,
    #[serde(default)]
    pub evidence_ref: Option<String>,
    /// Coefficient of variation of the reported amount, in percent.
    #[serde(default)]
    pub activity_uncertainty_pct: Option<Decimal>,
}

impl ActivityRecord {
    /// Minimal record; optional fields start empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        scope: Scope,
        category: impl Into<String>,
        activity_type: impl Into<String>,
        raw_amount: impl Into<RawAmount>,
        raw_unit: impl Into<String>,
        country_code: impl Into<String>,
        year: i32,
    ) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            scope,
            category: category.into(),
            activity_type: activity_type.into(),
            raw_amount: raw_amount.into(),
            raw_unit: raw_unit.into(),
            country_code: country_code.into(),
            period: ReportingPeriod::year(year),
            locale: LocaleHint::Auto,
            factor_override: None,
            specific_factor_id: None,
            dataset: None,
            supplier_id: None,
            facility_id: None,
            evidence_ref: None,
            activity_uncertainty_pct: None,
        }
    }

    /// Number of optional completeness fields left empty.
    pub fn missing_optional_fields(&self) -> usize {
        [
            self.supplier_id.is_none(),
            self.facility_id.is_none(),
            self.evidence_ref.is_none(),
            self.period.start.is_none() || self.period.end.is_none(),
        ]
        .iter()
        .filter(|missing| **missing)
        .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> ActivityRecord {
        ActivityRecord::new(
            "r1",
            "tenant-a",
            Scope::Scope2,
            "electricity",
            "grid_electricity",
            "1.234,56",
            "kWh",
            "DE",
            2024,
        )
    }

    #[test]
    fn scope_from_integer() {
        assert_eq!(Scope::try_from(1).unwrap(), Scope::Scope1);
        assert_eq!(Scope::try_from(3).unwrap(), Scope::Scope3);
        assert!(Scope::try_from(4).is_err());
    }

    #[test]
    fn scope_serialises_as_number() {
        assert_eq!(serde_json::to_string(&Scope::Scope2).unwrap(), "2");
        let parsed: Scope = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, Scope::Scope3);
        assert!(serde_json::from_str::<Scope>("0").is_err());
    }

    #[test]
    fn raw_amount_strings_stay_text() {
        for input in ["1,234.5", "1.234", "1234", "1.234,56", "5e28"] {
            let parsed: RawAmount = serde_json::from_str(&format!("{input:?}")).unwrap();
            assert_eq!(parsed, RawAmount::Text(input.into()), "{input:?}");
        }
    }

    #[test]
    fn raw_amount_numbers_are_decimal() {
        let num: RawAmount = serde_json::from_str("12.5").unwrap();
        assert_eq!(num, RawAmount::Decimal(dec!(12.5)));
        let int: RawAmount = serde_json::from_str("1234").unwrap();
        assert_eq!(int, RawAmount::Decimal(dec!(1234)));
        let tiny: RawAmount = serde_json::from_str("0.1").unwrap();
        assert_eq!(tiny, RawAmount::Decimal(dec!(0.1)));
        let huge: RawAmount = serde_json::from_str("1e300").unwrap();
        assert_eq!(huge, RawAmount::Float(1e300));
    }

    #[test]
    fn decimal_amount_serialises_as_number() {
        let json = serde_json::to_string(&RawAmount::Decimal(dec!(1.234))).unwrap();
        assert_eq!(json, "1.234");
        let back: RawAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RawAmount::Decimal(dec!(1.234)));
        assert_eq!(
            serde_json::to_string(&RawAmount::Text("1.234".into())).unwrap(),
            r#""1.234""#
        );
    }

    #[test]
    fn eu_record_keeps_string_amount_as_text() {
        let json = r#"{
            "id": "r1",
            "tenant_id": "t1",
            "scope": 2,
            "category": "electricity",
            "activity_type": "grid_electricity",
            "raw_amount": "1.234",
            "raw_unit": "kWh",
            "country_code": "DE",
            "period": { "year": 2024 },
            "locale": "EU"
        }"#;
        let record: ActivityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.locale, LocaleHint::Eu);
        assert_eq!(record.raw_amount, RawAmount::Text("1.234".into()));
    }

    #[test]
    fn record_json_defaults_optional_fields() {
        let json = r#"{
            "id": "r9",
            "tenant_id": "t1",
            "scope": 1,
            "category": "stationary_combustion",
            "activity_type": "diesel",
            "raw_amount": "1000",
            "raw_unit": "L",
            "country_code": "GB",
            "period": { "year": 2024 }
        }"#;
        let record: ActivityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.locale, LocaleHint::Auto);
        assert!(record.factor_override.is_none());
        assert_eq!(record.missing_optional_fields(), 4);
    }

    #[test]
    fn completeness_counts_filled_fields() {
        let mut record = sample();
        record.supplier_id = Some("sup-1".into());
        record.evidence_ref = Some("invoice-77".into());
        assert_eq!(record.missing_optional_fields(), 2);
        record.facility_id = Some("plant-3".into());
        record.period.start = NaiveDate::from_ymd_opt(2024, 1, 1);
        record.period.end = NaiveDate::from_ymd_opt(2024, 12, 31);
        assert_eq!(record.missing_optional_fields(), 0);
    }
}

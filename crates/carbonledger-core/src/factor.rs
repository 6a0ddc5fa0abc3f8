//! Emission factor reference entities.
//!
//! Factors are global reference data: loaded once, validated, then read-only.
//! Tenant- or supplier-specific factors live in the same set and carry an
//! owning tenant.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::activity::Scope;

/// Country code used for dataset-wide defaults.
pub const GLOBAL_REGION: &str = "GLOBAL";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorId(pub String);

impl FactorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the factor's underlying data was obtained, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Measured,
    Calculated,
    Estimated,
    Default,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Measured => "measured",
            Self::Calculated => "calculated",
            Self::Estimated => "estimated",
            Self::Default => "default",
        }
    }
}

/// Greenhouse gas a factor is expressed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gas {
    #[default]
    #[serde(rename = "CO2e", alias = "co2e")]
    Co2e,
    #[serde(rename = "CO2", alias = "co2")]
    Co2,
    #[serde(rename = "CH4", alias = "ch4")]
    Ch4,
    #[serde(rename = "N2O", alias = "n2o")]
    N2o,
    #[serde(rename = "SF6", alias = "sf6")]
    Sf6,
    #[serde(rename = "NF3", alias = "nf3")]
    Nf3,
    #[serde(rename = "HFC-134a", alias = "hfc-134a")]
    Hfc134a,
}

/// IPCC assessment report used for 100-year GWP values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GwpSet {
    #[serde(rename = "AR5")]
    Ar5,
    #[default]
    #[serde(rename = "AR6")]
    Ar6,
}

impl Gas {
    /// 100-year global warming potential. CO2e factors are already equivalent.
    pub fn gwp(self, set: GwpSet) -> Decimal {
        let value: u32 = match (self, set) {
            (Self::Co2e | Self::Co2, _) => 1,
            (Self::Ch4, GwpSet::Ar5) => 28,
            // Fossil methane.
            (Self::Ch4, GwpSet::Ar6) => return Decimal::new(298, 1),
            (Self::N2o, GwpSet::Ar5) => 265,
            (Self::N2o, GwpSet::Ar6) => 273,
            (Self::Sf6, GwpSet::Ar5) => 23_500,
            (Self::Sf6, GwpSet::Ar6) => 25_200,
            (Self::Nf3, GwpSet::Ar5) => 16_100,
            (Self::Nf3, GwpSet::Ar6) => 17_400,
            (Self::Hfc134a, GwpSet::Ar5) => 1_300,
            (Self::Hfc134a, GwpSet::Ar6) => 1_530,
        };
        Decimal::from(value)
    }
}

/// Known metadata keys for factor extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKey {
    /// Coefficient of variation of the factor, in percent.
    UncertaintyPct,
    SourceUrl,
    Methodology,
    ValidFrom,
    ValidTo,
    Notes,
}

impl ExtensionKey {
    /// Keys whose values are numbers; every other key holds text.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::UncertaintyPct)
    }

    /// Bring a loosely typed value to the shape this key holds.
    fn coerce(self, value: ExtensionValue) -> Result<ExtensionValue, String> {
        match (self.is_numeric(), value) {
            (true, ExtensionValue::Text(s)) => s
                .trim()
                .parse::<Decimal>()
                .map(ExtensionValue::Number)
                .map_err(|e| format!("{self:?} {s:?}: {e}")),
            (false, ExtensionValue::Number(n)) => Ok(ExtensionValue::Text(n.to_string())),
            (_, value) => Ok(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    Text(String),
    Number(Decimal),
}

/// Typed factor metadata. Unknown keys are rejected on deserialization, and
/// each value is read as the type its key holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FactorExtensions(BTreeMap<ExtensionKey, ExtensionValue>);

impl<'de> Deserialize<'de> for FactorExtensions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<ExtensionKey, ExtensionValue>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| Ok((key, key.coerce(value).map_err(de::Error::custom)?)))
            .collect::<Result<BTreeMap<_, _>, D::Error>>()
            .map(Self)
    }
}

impl FactorExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ExtensionKey, value: ExtensionValue) -> Self {
        self.0.insert(key, value);
        self
    }

    pub fn get(&self, key: ExtensionKey) -> Option<&ExtensionValue> {
        self.0.get(&key)
    }

    pub fn number(&self, key: ExtensionKey) -> Option<Decimal> {
        match self.0.get(&key)? {
            ExtensionValue::Number(n) => Some(*n),
            ExtensionValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn text(&self, key: ExtensionKey) -> Option<&str> {
        match self.0.get(&key)? {
            ExtensionValue::Text(s) => Some(s),
            ExtensionValue::Number(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExtensionKey, &ExtensionValue)> {
        self.0.iter()
    }
}

/// One emission factor row from a reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionFactor {
    pub id: FactorId,
    /// Dataset name, e.g. `DEFRA_2024`, `EPA_2024`, `EXIOBASE_2020`, `CBAM_DEFAULT`.
    pub dataset: String,
    pub dataset_kind: DatasetKind,
    pub scope: Scope,
    pub category: String,
    pub activity_type: String,
    /// ISO country, region code, or [`GLOBAL_REGION`].
    pub country_code: String,
    pub year: i32,
    pub value: Decimal,
    /// `<mass>[gas]/<unit>`, e.g. `kgCO2e/kWh` or `g/km`.
    pub unit: String,
    #[serde(default)]
    pub gas: Gas,
    /// Publisher and table reference.
    pub source: String,
    /// Set for tenant- or supplier-specific factors.
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub extensions: FactorExtensions,
}

impl EmissionFactor {
    pub fn is_global(&self) -> bool {
        self.country_code.eq_ignore_ascii_case(GLOBAL_REGION)
    }

    /// Factor uncertainty in percent when the dataset publishes one.
    pub fn uncertainty_pct(&self) -> Option<Decimal> {
        self.extensions.number(ExtensionKey::UncertaintyPct)
    }

    /// True when the value is usable as a multiplier.
    pub fn has_valid_value(&self) -> bool {
        self.value >= Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn gwp_values_by_assessment_report() {
        assert_eq!(Gas::Co2e.gwp(GwpSet::Ar6), dec!(1));
        assert_eq!(Gas::Ch4.gwp(GwpSet::Ar5), dec!(28));
        assert_eq!(Gas::Ch4.gwp(GwpSet::Ar6), dec!(29.8));
        assert_eq!(Gas::N2o.gwp(GwpSet::Ar6), dec!(273));
        assert_eq!(Gas::Sf6.gwp(GwpSet::Ar5), dec!(23500));
    }

    #[test]
    fn gas_names_round_trip_through_serde() {
        let gas: Gas = serde_json::from_str(r#""HFC-134a""#).unwrap();
        assert_eq!(gas, Gas::Hfc134a);
        assert_eq!(serde_json::to_string(&Gas::N2o).unwrap(), r#""N2O""#);
        let lower: Gas = serde_json::from_str(r#""ch4""#).unwrap();
        assert_eq!(lower, Gas::Ch4);
    }

    #[test]
    fn extensions_reject_unknown_keys() {
        let ok: FactorExtensions =
            serde_json::from_str(r#"{"uncertainty_pct": 7.5, "source_url": "https://x"}"#).unwrap();
        assert_eq!(ok.number(ExtensionKey::UncertaintyPct), Some(dec!(7.5)));
        assert_eq!(ok.text(ExtensionKey::SourceUrl), Some("https://x"));

        let bad = serde_json::from_str::<FactorExtensions>(r#"{"colour": "green"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn extension_values_follow_their_key() {
        let ext: FactorExtensions = serde_json::from_str(
            r#"{"notes": "2024", "valid_from": 2024, "uncertainty_pct": "8.5"}"#,
        )
        .unwrap();
        assert_eq!(ext.text(ExtensionKey::Notes), Some("2024"));
        assert_eq!(ext.text(ExtensionKey::ValidFrom), Some("2024"));
        assert_eq!(
            ext.get(ExtensionKey::UncertaintyPct),
            Some(&ExtensionValue::Number(dec!(8.5)))
        );

        let bad = serde_json::from_str::<FactorExtensions>(r#"{"uncertainty_pct": "high"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn extensions_survive_json_round_trip() {
        let ext = FactorExtensions::new()
            .with(ExtensionKey::UncertaintyPct, ExtensionValue::Number(dec!(12)))
            .with(ExtensionKey::Notes, ExtensionValue::Text("1.5".into()));
        let json = serde_json::to_string(&ext).unwrap();
        assert_eq!(serde_json::from_str::<FactorExtensions>(&json).unwrap(), ext);
    }

    #[test]
    fn numeric_extension_accepts_text_numbers() {
        let ext = FactorExtensions::new().with(
            ExtensionKey::UncertaintyPct,
            ExtensionValue::Text(" 12 ".into()),
        );
        assert_eq!(ext.number(ExtensionKey::UncertaintyPct), Some(dec!(12)));
    }
}

//! Physical dimensions and their canonical units.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Mass,
    Energy,
    Volume,
    Distance,
    Currency,
}

impl Dimension {
    pub fn canonical(self) -> CanonicalUnit {
        match self {
            Self::Mass => CanonicalUnit::Kg,
            Self::Energy => CanonicalUnit::KWh,
            Self::Volume => CanonicalUnit::L,
            Self::Distance => CanonicalUnit::Km,
            Self::Currency => CanonicalUnit::Eur,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mass => "mass",
            Self::Energy => "energy",
            Self::Volume => "volume",
            Self::Distance => "distance",
            Self::Currency => "currency",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The base unit every quantity of a dimension is normalized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalUnit {
    #[serde(rename = "kg")]
    Kg,
    #[serde(rename = "kWh")]
    KWh,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "km")]
    Km,
    #[serde(rename = "EUR")]
    Eur,
}

impl CanonicalUnit {
    pub fn dimension(self) -> Dimension {
        match self {
            Self::Kg => Dimension::Mass,
            Self::KWh => Dimension::Energy,
            Self::L => Dimension::Volume,
            Self::Km => Dimension::Distance,
            Self::Eur => Dimension::Currency,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::KWh => "kWh",
            Self::L => "L",
            Self::Km => "km",
            Self::Eur => "EUR",
        }
    }
}

impl fmt::Display for CanonicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A value in a canonical unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: CanonicalUnit,
}

impl Quantity {
    pub fn new(value: Decimal, unit: CanonicalUnit) -> Self {
        Self { value, unit }
    }

    pub fn dimension(&self) -> Dimension {
        self.unit.dimension()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Audit entry for one conversion step that used external context
/// (a unit definition, a density, a calorific value, or an exchange rate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedConversion {
    /// Substance or currency the context is keyed by; the unit symbol for plain rescaling.
    pub key: String,
    pub from: String,
    pub to: String,
    /// Multiplier applied to the `from` value.
    pub factor: Decimal,
    pub source: String,
}

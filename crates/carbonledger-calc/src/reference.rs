//! Immutable reference data handle: emission factors plus conversion contexts.
//!
//! Built once at startup and passed explicitly to the pipeline. Malformed
//! reference data fails here, loudly, instead of per record.

use std::collections::{BTreeSet, HashMap};

use carbonledger_core::{EmissionFactor, FactorId, Scope};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::context::ConversionContexts;
use crate::units::{UnitDef, lookup_unit};

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("factor {id} has negative value {value}")]
    NegativeFactor { id: FactorId, value: Decimal },

    #[error("factor {id} has unparseable unit {unit:?}: {reason}")]
    BadFactorUnit {
        id: FactorId,
        unit: String,
        reason: String,
    },

    #[error("duplicate factor id {0}")]
    DuplicateId(FactorId),

    #[error("factors {first} and {second} share dataset, scope, category, activity, country and year")]
    AmbiguousFactor { first: FactorId, second: FactorId },

    #[error("conversion context for {substance} must be positive, got {value}")]
    NonPositiveContext { substance: String, value: Decimal },

    #[error("exchange rate for {currency} must be positive, got {value}")]
    NonPositiveRate { currency: String, value: Decimal },

    #[error("unknown currency {0:?} in exchange rates")]
    UnknownCurrency(String),
}

/// Parsed factor unit: `<mass>[gas]/<unit>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorUnit {
    /// kg per one numerator mass unit.
    pub mass_kg: Decimal,
    pub per: &'static UnitDef,
}

const GAS_MARKERS: &[&str] = &["co2e", "co2eq", "co2", "ch4", "n2o", "sf6", "nf3", "hfc"];

impl FactorUnit {
    pub fn parse(unit: &str) -> Result<Self, String> {
        let (numerator, denominator) = unit
            .split_once('/')
            .ok_or_else(|| "expected <mass>/<unit>".to_string())?;

        let folded = numerator.trim().to_lowercase();
        let mass_token = GAS_MARKERS
            .iter()
            .filter_map(|m| folded.find(m))
            .min()
            .map_or(folded.as_str(), |pos| &folded[..pos])
            .trim();

        let mass = lookup_unit(mass_token, None)
            .ok_or_else(|| format!("unknown mass unit {mass_token:?}"))?;
        let mass_kg = match (mass.dimension, mass.to_canonical) {
            (carbonledger_core::Dimension::Mass, Some(kg)) => kg,
            _ => return Err(format!("{mass_token:?} is not a mass unit")),
        };

        let per = lookup_unit(denominator.trim(), None)
            .ok_or_else(|| format!("unknown activity unit {:?}", denominator.trim()))?;

        Ok(Self { mass_kg, per })
    }
}

/// Lookup key for dataset tiers. Category and activity are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FactorKey {
    dataset: String,
    scope: Scope,
    category: String,
    activity_type: String,
}

impl FactorKey {
    fn new(dataset: &str, scope: Scope, category: &str, activity_type: &str) -> Self {
        Self {
            dataset: dataset.to_uppercase(),
            scope,
            category: category.to_lowercase(),
            activity_type: activity_type.to_lowercase(),
        }
    }
}

/// Read-only reference set threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    factors: Vec<EmissionFactor>,
    by_id: HashMap<FactorId, usize>,
    /// Shared (non-tenant) factors per key, ordered by (country, year).
    by_key: HashMap<FactorKey, Vec<usize>>,
    contexts: ConversionContexts,
}

impl ReferenceData {
    /// Validate and index reference data.
    pub fn new(
        mut factors: Vec<EmissionFactor>,
        contexts: ConversionContexts,
    ) -> Result<Self, ReferenceError> {
        validate_contexts(&contexts)?;

        factors.sort_by(|a, b| a.id.cmp(&b.id));

        let mut by_id = HashMap::with_capacity(factors.len());
        let mut by_key: HashMap<FactorKey, Vec<usize>> = HashMap::new();
        for (idx, factor) in factors.iter().enumerate() {
            validate_factor(factor)?;
            if by_id.insert(factor.id.clone(), idx).is_some() {
                return Err(ReferenceError::DuplicateId(factor.id.clone()));
            }
            if factor.tenant_id.is_none() {
                let key = FactorKey::new(
                    &factor.dataset,
                    factor.scope,
                    &factor.category,
                    &factor.activity_type,
                );
                by_key.entry(key).or_default().push(idx);
            }
        }

        for indices in by_key.values_mut() {
            indices.sort_by(|&a, &b| {
                let (fa, fb) = (&factors[a], &factors[b]);
                (fa.country_code.to_uppercase(), fa.year)
                    .cmp(&(fb.country_code.to_uppercase(), fb.year))
            });
            for pair in indices.windows(2) {
                let (fa, fb) = (&factors[pair[0]], &factors[pair[1]]);
                if fa.year == fb.year && fa.country_code.eq_ignore_ascii_case(&fb.country_code) {
                    return Err(ReferenceError::AmbiguousFactor {
                        first: fa.id.clone(),
                        second: fb.id.clone(),
                    });
                }
            }
        }

        let datasets: BTreeSet<&str> = factors.iter().map(|f| f.dataset.as_str()).collect();
        info!(
            factors = factors.len(),
            datasets = datasets.len(),
            contexts = contexts.context_count(),
            rates = contexts.rate_count(),
            "reference data loaded"
        );

        Ok(Self {
            factors,
            by_id,
            by_key,
            contexts,
        })
    }

    pub fn factor(&self, id: &FactorId) -> Option<&EmissionFactor> {
        self.by_id.get(id).map(|&idx| &self.factors[idx])
    }

    /// Shared factors for a lookup key, ordered by (country, year).
    pub fn candidates<'a>(
        &'a self,
        dataset: &str,
        scope: Scope,
        category: &str,
        activity_type: &str,
    ) -> impl Iterator<Item = &'a EmissionFactor> + use<'a> {
        let key = FactorKey::new(dataset, scope, category, activity_type);
        self.by_key
            .get(&key)
            .map(|v| v.as_slice())
            .unwrap_or_default()
            .iter()
            .map(move |&idx| &self.factors[idx])
    }

    pub fn factors(&self) -> &[EmissionFactor] {
        &self.factors
    }

    pub fn contexts(&self) -> &ConversionContexts {
        &self.contexts
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Distinct dataset names, sorted.
    pub fn datasets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factors.iter().map(|f| f.dataset.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

fn validate_factor(factor: &EmissionFactor) -> Result<(), ReferenceError> {
    if !factor.has_valid_value() {
        return Err(ReferenceError::NegativeFactor {
            id: factor.id.clone(),
            value: factor.value,
        });
    }
    FactorUnit::parse(&factor.unit).map_err(|reason| ReferenceError::BadFactorUnit {
        id: factor.id.clone(),
        unit: factor.unit.clone(),
        reason,
    })?;
    Ok(())
}

fn validate_contexts(contexts: &ConversionContexts) -> Result<(), ReferenceError> {
    for c in contexts.contexts() {
        if c.value <= Decimal::ZERO {
            return Err(ReferenceError::NonPositiveContext {
                substance: c.substance.clone(),
                value: c.value,
            });
        }
    }
    for r in contexts.rates() {
        if r.eur_per_unit <= Decimal::ZERO {
            return Err(ReferenceError::NonPositiveRate {
                currency: r.currency.clone(),
                value: r.eur_per_unit,
            });
        }
        match lookup_unit(&r.currency, None) {
            Some(def) if def.dimension == carbonledger_core::Dimension::Currency => {}
            _ => return Err(ReferenceError::UnknownCurrency(r.currency.clone())),
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use carbonledger_core::{DatasetKind, EmissionFactor, FactorExtensions, FactorId, Gas, Scope};
    use rust_decimal::Decimal;

    #[allow(clippy::too_many_arguments)]
    pub fn factor(
        id: &str,
        dataset: &str,
        scope: Scope,
        category: &str,
        activity_type: &str,
        country: &str,
        year: i32,
        value: Decimal,
        unit: &str,
    ) -> EmissionFactor {
        EmissionFactor {
            id: FactorId::new(id),
            dataset: dataset.into(),
            dataset_kind: DatasetKind::Calculated,
            scope,
            category: category.into(),
            activity_type: activity_type.into(),
            country_code: country.into(),
            year,
            value,
            unit: unit.into(),
            gas: Gas::Co2e,
            source: format!("{dataset} test table"),
            tenant_id: None,
            extensions: FactorExtensions::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::factor;
    use super::*;
    use crate::context::ExchangeRate;
    use rust_decimal_macros::dec;

    fn elec(id: &str, country: &str, year: i32) -> EmissionFactor {
        factor(
            id,
            "DEFRA_2024",
            Scope::Scope2,
            "electricity",
            "grid_electricity",
            country,
            year,
            dec!(0.233),
            "kgCO2e/kWh",
        )
    }

    #[test]
    fn parses_factor_units() {
        let u = FactorUnit::parse("kgCO2e/kWh").unwrap();
        assert_eq!(u.mass_kg, dec!(1));
        assert_eq!(u.per.symbol, "kWh");

        let g = FactorUnit::parse("g CO2e / km").unwrap();
        assert_eq!(g.mass_kg, dec!(0.001));
        assert_eq!(g.per.symbol, "km");

        let t = FactorUnit::parse("tCO2e/t").unwrap();
        assert_eq!(t.mass_kg, dec!(1000));
        assert_eq!(t.per.symbol, "t");

        let ch4 = FactorUnit::parse("kgCH4/GJ").unwrap();
        assert_eq!(ch4.per.symbol, "GJ");

        let plain = FactorUnit::parse("kg/L").unwrap();
        assert_eq!(plain.per.symbol, "L");
    }

    #[test]
    fn rejects_bad_factor_units() {
        assert!(FactorUnit::parse("kgCO2e").is_err());
        assert!(FactorUnit::parse("kWhCO2e/kg").is_err());
        assert!(FactorUnit::parse("kgCO2e/furlong").is_err());
    }

    #[test]
    fn negative_factor_fails_at_load() {
        let mut bad = elec("f1", "DE", 2024);
        bad.value = dec!(-0.1);
        let err = ReferenceData::new(vec![bad], ConversionContexts::default()).unwrap_err();
        assert!(matches!(err, ReferenceError::NegativeFactor { .. }));
    }

    #[test]
    fn duplicate_ids_fail_at_load() {
        let err = ReferenceData::new(
            vec![elec("f1", "DE", 2024), elec("f1", "FR", 2024)],
            ConversionContexts::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReferenceError::DuplicateId(_)));
    }

    #[test]
    fn ambiguous_keys_fail_at_load() {
        let err = ReferenceData::new(
            vec![elec("f1", "DE", 2024), elec("f2", "de", 2024)],
            ConversionContexts::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReferenceError::AmbiguousFactor { .. }));
    }

    #[test]
    fn bad_contexts_fail_at_load() {
        let mut ctx = ConversionContexts::default();
        ctx.add_rate(ExchangeRate {
            currency: "USD".into(),
            eur_per_unit: dec!(0),
            source: "x".into(),
        });
        assert!(matches!(
            ReferenceData::new(vec![], ctx).unwrap_err(),
            ReferenceError::NonPositiveRate { .. }
        ));

        let mut ctx = ConversionContexts::default();
        ctx.add_rate(ExchangeRate {
            currency: "XYZ".into(),
            eur_per_unit: dec!(1),
            source: "x".into(),
        });
        assert!(matches!(
            ReferenceData::new(vec![], ctx).unwrap_err(),
            ReferenceError::UnknownCurrency(_)
        ));
    }

    #[test]
    fn candidates_ordered_by_country_and_year() {
        let data = ReferenceData::new(
            vec![
                elec("c", "FR", 2022),
                elec("a", "DE", 2024),
                elec("b", "DE", 2021),
            ],
            ConversionContexts::default(),
        )
        .unwrap();
        let ids: Vec<&str> = data
            .candidates("defra_2024", Scope::Scope2, "Electricity", "GRID_ELECTRICITY")
            .map(|f| f.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(data.datasets(), vec!["DEFRA_2024"]);
    }

    #[test]
    fn tenant_factors_only_reachable_by_id() {
        let mut specific = elec("supplier-7", "DE", 2024);
        specific.tenant_id = Some("tenant-a".into());
        let data =
            ReferenceData::new(vec![specific], ConversionContexts::default()).unwrap();
        assert!(data.factor(&FactorId::new("supplier-7")).is_some());
        assert_eq!(
            data.candidates("DEFRA_2024", Scope::Scope2, "electricity", "grid_electricity")
                .count(),
            0
        );
    }
}

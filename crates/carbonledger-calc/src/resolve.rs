//! Factor resolution waterfall.
//!
//! First match wins: override, linked specific factor, exact key, nearest
//! year, regional fallback. When the record names no dataset the dataset
//! tiers are tried tier-major over the configured priority list, so an exact
//! match in a lower-priority dataset beats a nearest-year match in a higher one.

use carbonledger_core::{
    ActivityRecord, CalcConfig, CanonicalUnit, DatasetKind, EmissionFactor, FactorExtensions,
    FactorId, GLOBAL_REGION, Gas, MatchTier, Scope,
};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::CalcError;
use crate::reference::ReferenceData;

pub const OVERRIDE_FACTOR_ID: &str = "override";
pub const OVERRIDE_DATASET: &str = "MANUAL";

/// What to resolve a factor for.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorQuery<'a> {
    pub tenant_id: &'a str,
    pub scope: Scope,
    pub category: &'a str,
    pub activity_type: &'a str,
    pub country_code: &'a str,
    pub year: i32,
    pub dataset: Option<&'a str>,
    pub specific_factor_id: Option<&'a FactorId>,
    pub factor_override: Option<Decimal>,
    /// Canonical unit an override value is stated per.
    pub per: CanonicalUnit,
}

impl<'a> FactorQuery<'a> {
    pub fn for_record(record: &'a ActivityRecord, per: CanonicalUnit) -> Self {
        Self {
            tenant_id: &record.tenant_id,
            scope: record.scope,
            category: &record.category,
            activity_type: &record.activity_type,
            country_code: &record.country_code,
            year: record.period.year,
            dataset: record.dataset.as_deref(),
            specific_factor_id: record.specific_factor_id.as_ref(),
            factor_override: record.factor_override,
            per,
        }
    }

    fn override_factor(&self, value: Decimal) -> EmissionFactor {
        EmissionFactor {
            id: FactorId::new(OVERRIDE_FACTOR_ID),
            dataset: OVERRIDE_DATASET.to_string(),
            dataset_kind: DatasetKind::Estimated,
            scope: self.scope,
            category: self.category.to_string(),
            activity_type: self.activity_type.to_string(),
            country_code: self.country_code.to_string(),
            year: self.year,
            value,
            unit: format!("kgCO2e/{}", self.per.symbol()),
            gas: Gas::Co2e,
            source: "manual override on activity record".to_string(),
            tenant_id: Some(self.tenant_id.to_string()),
            extensions: FactorExtensions::new(),
        }
    }
}

/// Resolve the factor for `query`, reporting which tier matched.
pub fn resolve_factor(
    query: &FactorQuery<'_>,
    reference: &ReferenceData,
    config: &CalcConfig,
) -> Result<(EmissionFactor, MatchTier), CalcError> {
    if let Some(value) = query.factor_override {
        if value < Decimal::ZERO {
            return Err(CalcError::InvalidFactor {
                id: OVERRIDE_FACTOR_ID.to_string(),
                reason: format!("override value {value} is negative"),
            });
        }
        debug!(activity_type = query.activity_type, %value, "factor override");
        return Ok((query.override_factor(value), MatchTier::Override));
    }

    if let Some(id) = query.specific_factor_id {
        match reference.factor(id) {
            Some(factor) if owned_by_other_tenant(factor, query.tenant_id) => {
                warn!(
                    factor_id = %id,
                    tenant = query.tenant_id,
                    "linked factor belongs to another tenant, falling back"
                );
            }
            Some(factor) => {
                debug!(factor_id = %id, "specific factor");
                return Ok((factor.clone(), MatchTier::Specific));
            }
            None => {
                warn!(factor_id = %id, "linked factor id not in reference data, falling back");
            }
        }
    }

    let datasets: Vec<&str> = match query.dataset {
        Some(dataset) => vec![dataset],
        None => config.dataset_priority.iter().map(String::as_str).collect(),
    };
    let regions = config.regions_for(query.country_code);

    let found = datasets
        .iter()
        .find_map(|d| exact(query, reference, d, query.country_code).map(|f| (f, MatchTier::Exact)))
        .or_else(|| {
            datasets.iter().find_map(|d| {
                nearest_year(query, reference, d, query.country_code)
                    .map(|f| (f, MatchTier::NearestYear))
            })
        })
        .or_else(|| {
            datasets.iter().find_map(|d| {
                regions
                    .iter()
                    .copied()
                    .chain(std::iter::once(GLOBAL_REGION))
                    .filter(|region| !region.eq_ignore_ascii_case(query.country_code))
                    .find_map(|region| {
                        exact(query, reference, d, region)
                            .or_else(|| nearest_year(query, reference, d, region))
                    })
                    .map(|f| (f, MatchTier::Regional))
            })
        });

    match found {
        Some((factor, tier)) => {
            debug!(
                factor_id = %factor.id,
                dataset = %factor.dataset,
                tier = tier.as_str(),
                "resolved factor"
            );
            Ok((factor.clone(), tier))
        }
        None => Err(CalcError::FactorNotFound {
            scope: query.scope,
            category: query.category.to_string(),
            activity_type: query.activity_type.to_string(),
            country_code: query.country_code.to_string(),
            year: query.year,
            datasets: datasets.join(", "),
        }),
    }
}

fn owned_by_other_tenant(factor: &EmissionFactor, tenant: &str) -> bool {
    factor.tenant_id.as_deref().is_some_and(|owner| owner != tenant)
}

fn in_country<'r>(
    query: &FactorQuery<'_>,
    reference: &'r ReferenceData,
    dataset: &str,
    country: &str,
) -> impl Iterator<Item = &'r EmissionFactor> + use<'r> {
    let country = country.to_string();
    reference
        .candidates(dataset, query.scope, query.category, query.activity_type)
        .filter(move |f| f.country_code.eq_ignore_ascii_case(&country))
}

fn exact<'r>(
    query: &FactorQuery<'_>,
    reference: &'r ReferenceData,
    dataset: &str,
    country: &str,
) -> Option<&'r EmissionFactor> {
    in_country(query, reference, dataset, country).find(|f| f.year == query.year)
}

/// Closest year to the query; the earlier year wins a tie.
fn nearest_year<'r>(
    query: &FactorQuery<'_>,
    reference: &'r ReferenceData,
    dataset: &str,
    country: &str,
) -> Option<&'r EmissionFactor> {
    in_country(query, reference, dataset, country)
        .min_by_key(|f| ((f.year - query.year).unsigned_abs(), f.year))
}

//! Record pipeline: sanitize → normalize → resolve → calculate.
//!
//! Each record either reaches `Calculated` or stops at the first failing
//! stage with a typed error. Batches never abort on a bad row.

use carbonledger_core::{
    ActivityRecord, CalcConfig, CalculationResult, EmissionFactor, LocaleHint, MatchTier,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::EmissionsAggregate;
use crate::error::{CalcError, FailedRecord, RowFailure, Stage};
use crate::quality::score_quality;
use crate::reference::{FactorUnit, ReferenceData};
use crate::resolve::{FactorQuery, resolve_factor};
use crate::sanitize::sanitize_number;
use crate::uncertainty::estimate_uncertainty;
use crate::units::{Normalized, UnitNormalizer};

const KG_PER_TONNE: Decimal = Decimal::ONE_THOUSAND;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Calculated(Box<CalculationResult>),
    Failed(FailedRecord),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub results: Vec<CalculationResult>,
    pub failures: Vec<RowFailure>,
}

impl BatchResult {
    /// Total input rows accounted for.
    pub fn len(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.failures.is_empty()
    }

    /// Fold in rows rejected before they became records.
    pub fn extend_failures(&mut self, failures: impl IntoIterator<Item = RowFailure>) {
        self.failures.extend(failures);
        self.failures.sort_by_key(|f| f.row);
    }

    pub fn aggregate(&self) -> EmissionsAggregate {
        EmissionsAggregate::from_results(&self.results, self.failures.iter().cloned())
    }
}

/// Stateless calculator over an immutable reference set.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    reference: &'a ReferenceData,
    config: &'a CalcConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(reference: &'a ReferenceData, config: &'a CalcConfig) -> Self {
        Self { reference, config }
    }

    pub fn reference(&self) -> &'a ReferenceData {
        self.reference
    }

    pub fn config(&self) -> &'a CalcConfig {
        self.config
    }

    fn normalizer(&self) -> UnitNormalizer<'a> {
        UnitNormalizer::new(self.reference.contexts())
    }

    pub fn process_activity_record(&self, record: &ActivityRecord) -> RecordOutcome {
        match self.try_process(record) {
            Ok(result) => RecordOutcome::Calculated(Box::new(result)),
            Err((stage, error)) => {
                debug!(record = %record.id, stage = stage.as_str(), %error, "record failed");
                RecordOutcome::Failed(FailedRecord {
                    record_id: record.id.clone(),
                    stage,
                    error,
                })
            }
        }
    }

    fn try_process(&self, record: &ActivityRecord) -> Result<CalculationResult, (Stage, CalcError)> {
        let locale = match record.locale {
            LocaleHint::Auto => self.config.default_locale,
            explicit => explicit,
        };
        let value = sanitize_number(&record.raw_amount, locale).map_err(|e| (Stage::Sanitize, e))?;

        let hint = format!("{} {}", record.category, record.activity_type);
        let normalized = self
            .normalizer()
            .normalize_unit(value, &record.raw_unit, Some(&hint))
            .map_err(|e| (Stage::Normalize, e))?;

        let query = FactorQuery::for_record(record, normalized.quantity.unit);
        let (factor, tier) =
            resolve_factor(&query, self.reference, self.config).map_err(|e| (Stage::Resolve, e))?;

        self.calculate(record, &normalized, &factor, tier)
            .map_err(|e| (Stage::Calculate, e))
    }

    /// Apply `factor` to a normalized quantity.
    pub fn calculate(
        &self,
        record: &ActivityRecord,
        normalized: &Normalized,
        factor: &EmissionFactor,
        tier: MatchTier,
    ) -> Result<CalculationResult, CalcError> {
        let invalid = |reason: String| CalcError::InvalidFactor {
            id: factor.id.to_string(),
            reason,
        };
        if factor.value < Decimal::ZERO {
            return Err(invalid(format!("negative value {}", factor.value)));
        }
        let factor_unit = FactorUnit::parse(&factor.unit).map_err(invalid)?;
        let normalizer = self.normalizer();

        let mut conversions = vec![normalized.conversion.clone()];
        let mut quantity = normalized.quantity;
        if quantity.dimension() != factor_unit.per.dimension {
            let (bridged, applied) = normalizer.convert_dimension(
                quantity,
                factor_unit.per.dimension,
                &record.activity_type,
            )?;
            quantity = bridged;
            conversions.push(applied);
        }

        // kg per canonical unit of the factor's denominator dimension.
        let (per_scale, per_conversion) = normalizer.scale(factor_unit.per)?;
        if per_scale != Decimal::ONE {
            conversions.push(per_conversion);
        }
        let per_canonical = factor
            .value
            .checked_mul(factor_unit.mass_kg)
            .and_then(|v| v.checked_div(per_scale))
            .ok_or(CalcError::Arithmetic("factor scaling"))?;

        let gwp = factor.gas.gwp(self.config.gwp_set);
        let co2e_kg = quantity
            .value
            .checked_mul(per_canonical)
            .and_then(|v| v.checked_mul(gwp))
            .ok_or(CalcError::Arithmetic("co2e"))?;
        let co2e_tonnes = co2e_kg
            .checked_div(KG_PER_TONNE)
            .ok_or(CalcError::Arithmetic("co2e tonnes"))?;

        let quality = score_quality(record, factor, tier, &self.config.quality);
        let uncertainty = self
            .config
            .uncertainty
            .enabled
            .then(|| estimate_uncertainty(record, factor, co2e_kg, &self.config.uncertainty));

        debug!(
            record = %record.id,
            factor_id = %factor.id,
            tier = tier.as_str(),
            %co2e_kg,
            quality = quality.composite,
            "calculated"
        );

        Ok(CalculationResult {
            record_id: record.id.clone(),
            tenant_id: record.tenant_id.clone(),
            scope: record.scope,
            category: record.category.clone(),
            activity_type: record.activity_type.clone(),
            normalized: quantity,
            conversions,
            factor_id: factor.id.clone(),
            dataset: factor.dataset.clone(),
            tier,
            gwp,
            co2e_kg,
            co2e_tonnes,
            quality,
            uncertainty,
        })
    }

    /// Process records numbered from 1.
    pub fn process_batch(&self, records: &[ActivityRecord]) -> BatchResult {
        self.process_rows(records.iter().enumerate().map(|(i, r)| (i + 1, r)))
    }

    /// Process records carrying their own row numbers, e.g. CSV line numbers.
    pub fn process_rows<'r>(
        &self,
        rows: impl IntoIterator<Item = (usize, &'r ActivityRecord)>,
    ) -> BatchResult {
        let mut batch = BatchResult::default();
        for (row, record) in rows {
            match self.process_activity_record(record) {
                RecordOutcome::Calculated(result) => batch.results.push(*result),
                RecordOutcome::Failed(failed) => {
                    batch.failures.push(RowFailure::from_failed(row, &failed));
                }
            }
        }
        info!(
            succeeded = batch.results.len(),
            failed = batch.failures.len(),
            "batch processed"
        );
        batch
    }
}

//! Data quality scoring on a 1–5 scale, 5 best.

use carbonledger_core::{
    ActivityRecord, DatasetKind, EmissionFactor, MatchTier, QualityConfig, QualityScore,
};

const BEST: f64 = 5.0;
const WORST: f64 = 1.0;

fn tier_score(tier: MatchTier) -> f64 {
    match tier {
        MatchTier::Specific => 5.0,
        MatchTier::Override | MatchTier::Exact => 4.0,
        MatchTier::NearestYear => 3.0,
        MatchTier::Regional => 2.0,
    }
}

fn kind_score(kind: DatasetKind) -> f64 {
    match kind {
        DatasetKind::Measured => 5.0,
        DatasetKind::Calculated => 4.0,
        DatasetKind::Estimated => 3.0,
        DatasetKind::Default => 2.0,
    }
}

/// Full marks while the factor is within the allowed age, one point per year
/// beyond it. Factors newer than the reporting year are not penalized.
fn temporal_score(record_year: i32, factor_year: i32, max_age: u32) -> f64 {
    let age = u32::try_from(record_year.saturating_sub(factor_year)).unwrap_or(0);
    let excess = age.saturating_sub(max_age);
    (BEST - f64::from(excess)).max(WORST)
}

fn geographic_score(record: &ActivityRecord, factor: &EmissionFactor) -> f64 {
    if factor.country_code.eq_ignore_ascii_case(&record.country_code) {
        BEST
    } else if factor.is_global() {
        2.0
    } else if factor.tenant_id.is_none() {
        // Reached through a configured region.
        3.0
    } else {
        WORST
    }
}

fn completeness_score(record: &ActivityRecord) -> f64 {
    (BEST - record.missing_optional_fields() as f64).max(WORST)
}

pub fn score_quality(
    record: &ActivityRecord,
    factor: &EmissionFactor,
    tier: MatchTier,
    config: &QualityConfig,
) -> QualityScore {
    let source = (tier_score(tier) + kind_score(factor.dataset_kind)) / 2.0;
    let temporal = temporal_score(record.period.year, factor.year, config.max_factor_age_years);
    let geographic = geographic_score(record, factor);
    let completeness = completeness_score(record);

    let w = &config.weights;
    let weighted = source * w.source
        + temporal * w.temporal
        + geographic * w.geographic
        + completeness * w.completeness;
    let composite = weighted.round().clamp(WORST, BEST) as u8;

    QualityScore {
        source,
        temporal,
        geographic,
        completeness,
        composite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::fixtures::factor;
    use carbonledger_core::{QualityWeights, Scope};
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn record(country: &str, year: i32) -> ActivityRecord {
        ActivityRecord::new(
            "r1",
            "t1",
            Scope::Scope2,
            "electricity",
            "grid_electricity",
            "10",
            "kWh",
            country,
            year,
        )
    }

    fn elec(country: &str, year: i32) -> EmissionFactor {
        factor(
            "f",
            "DEFRA_2024",
            Scope::Scope2,
            "electricity",
            "grid_electricity",
            country,
            year,
            dec!(0.2),
            "kgCO2e/kWh",
        )
    }

    #[test]
    fn complete_exact_record_scores_high() {
        let mut r = record("DE", 2024);
        r.supplier_id = Some("s1".into());
        r.facility_id = Some("plant-3".into());
        r.evidence_ref = Some("invoice-889".into());
        r.period.start = NaiveDate::from_ymd_opt(2024, 1, 1);
        r.period.end = NaiveDate::from_ymd_opt(2024, 12, 31);
        let mut f = elec("DE", 2024);
        f.dataset_kind = DatasetKind::Measured;

        let q = score_quality(&r, &f, MatchTier::Exact, &QualityConfig::default());
        assert_eq!(q.source, 4.5);
        assert_eq!(q.temporal, 5.0);
        assert_eq!(q.geographic, 5.0);
        assert_eq!(q.completeness, 5.0);
        assert_eq!(q.composite, 5);
    }

    #[test]
    fn stale_global_factor_scores_low() {
        let r = record("DE", 2024);
        let mut f = elec("GLOBAL", 2015);
        f.dataset_kind = DatasetKind::Default;

        let q = score_quality(&r, &f, MatchTier::Regional, &QualityConfig::default());
        assert_eq!(q.source, 2.0);
        assert_eq!(q.temporal, 1.0);
        assert_eq!(q.geographic, 2.0);
        assert_eq!(q.completeness, 1.0);
        assert_eq!(q.composite, 2);
    }

    #[test]
    fn temporal_penalty_starts_after_allowed_age() {
        assert_eq!(temporal_score(2024, 2022, 2), 5.0);
        assert_eq!(temporal_score(2024, 2021, 2), 4.0);
        assert_eq!(temporal_score(2024, 2026, 2), 5.0);
        assert_eq!(temporal_score(2024, 2030, 2), 5.0);
        assert_eq!(temporal_score(2020, 2024, 0), 5.0);
        assert_eq!(temporal_score(2024, 1990, 2), 1.0);
    }

    #[test]
    fn regional_factor_scores_middle() {
        let r = record("AT", 2024);
        let f = elec("EU", 2024);
        let q = score_quality(&r, &f, MatchTier::Regional, &QualityConfig::default());
        assert_eq!(q.geographic, 3.0);
    }

    proptest! {
        #[test]
        fn composite_always_in_range(
            tier in prop_oneof![
                Just(MatchTier::Override),
                Just(MatchTier::Specific),
                Just(MatchTier::Exact),
                Just(MatchTier::NearestYear),
                Just(MatchTier::Regional),
            ],
            kind in prop_oneof![
                Just(DatasetKind::Measured),
                Just(DatasetKind::Calculated),
                Just(DatasetKind::Estimated),
                Just(DatasetKind::Default),
            ],
            factor_year in 1950i32..2100,
            global in any::<bool>(),
            split in 0.0f64..1.0,
        ) {
            let r = record("DE", 2024);
            let mut f = elec(if global { "GLOBAL" } else { "FR" }, factor_year);
            f.dataset_kind = kind;
            let mut config = QualityConfig::default();
            config.weights = QualityWeights {
                source: split,
                temporal: 1.0 - split,
                geographic: 0.0,
                completeness: 0.0,
            };
            let q = score_quality(&r, &f, tier, &config);
            prop_assert!((1..=5).contains(&q.composite));
            for sub in [q.source, q.temporal, q.geographic, q.completeness] {
                prop_assert!((1.0..=5.0).contains(&sub));
            }
        }
    }
}

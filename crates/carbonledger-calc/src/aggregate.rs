//! Roll-up of calculation results into scope subtotals and a grand total.
//!
//! Merging is commutative and associative: partial aggregates built from any
//! split of a batch combine into the same totals. Failures ride along so a
//! report never hides rows that did not calculate.

use std::collections::BTreeMap;

use carbonledger_core::{CalculationResult, Scope};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::error::RowFailure;

const KG_PER_TONNE: Decimal = Decimal::ONE_THOUSAND;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeSubtotal {
    pub co2e_kg: Decimal,
    pub records: usize,
    /// kgCO2e per category, keyed by lowercased category.
    pub by_category: BTreeMap<String, Decimal>,
}

impl ScopeSubtotal {
    pub fn co2e_tonnes(&self) -> Decimal {
        self.co2e_kg / KG_PER_TONNE
    }

    /// Returns true when any sum saturated.
    fn merge(&mut self, other: ScopeSubtotal) -> bool {
        let mut overflowed = accumulate(&mut self.co2e_kg, other.co2e_kg);
        self.records += other.records;
        for (category, kg) in other.by_category {
            overflowed |= accumulate(self.by_category.entry(category).or_default(), kg);
        }
        overflowed
    }
}

/// Add `kg` into `total`, saturating at the decimal range. Returns true on
/// saturation.
fn accumulate(total: &mut Decimal, kg: Decimal) -> bool {
    match total.checked_add(kg) {
        Some(sum) => {
            *total = sum;
            false
        }
        None => {
            *total = total.saturating_add(kg);
            true
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmissionsAggregate {
    pub scopes: BTreeMap<Scope, ScopeSubtotal>,
    pub total_kg: Decimal,
    pub succeeded: usize,
    /// Set when a subtotal or the total hit the decimal range and saturated.
    /// Saturated totals are lower bounds and must not be reported as exact.
    pub overflowed: bool,
    /// Ordered by row.
    pub failures: Vec<RowFailure>,
}

impl EmissionsAggregate {
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a CalculationResult>,
        failures: impl IntoIterator<Item = RowFailure>,
    ) -> Self {
        let mut agg = Self::default();
        for result in results {
            agg.add(result);
        }
        for failure in failures {
            agg.add_failure(failure);
        }
        agg
    }

    pub fn add(&mut self, result: &CalculationResult) {
        let subtotal = self.scopes.entry(result.scope).or_default();
        let mut overflowed = accumulate(&mut subtotal.co2e_kg, result.co2e_kg);
        subtotal.records += 1;
        overflowed |= accumulate(
            subtotal
                .by_category
                .entry(result.category.to_lowercase())
                .or_default(),
            result.co2e_kg,
        );
        overflowed |= accumulate(&mut self.total_kg, result.co2e_kg);
        self.succeeded += 1;
        if overflowed && !self.overflowed {
            warn!(record = %result.record_id, "emissions total saturated");
        }
        self.overflowed |= overflowed;
    }

    pub fn add_failure(&mut self, failure: RowFailure) {
        let at = self
            .failures
            .partition_point(|f| (f.row, &f.record_id) <= (failure.row, &failure.record_id));
        self.failures.insert(at, failure);
    }

    /// Combine two partial aggregates.
    pub fn merge(mut self, other: EmissionsAggregate) -> Self {
        let mut overflowed = other.overflowed;
        for (scope, subtotal) in other.scopes {
            overflowed |= self.scopes.entry(scope).or_default().merge(subtotal);
        }
        overflowed |= accumulate(&mut self.total_kg, other.total_kg);
        self.overflowed |= overflowed;
        self.succeeded += other.succeeded;
        for failure in other.failures {
            self.add_failure(failure);
        }
        self
    }

    pub fn total_tonnes(&self) -> Decimal {
        self.total_kg / KG_PER_TONNE
    }

    pub fn scope_kg(&self, scope: Scope) -> Decimal {
        self.scopes.get(&scope).map_or(Decimal::ZERO, |s| s.co2e_kg)
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use carbonledger_core::{
        CanonicalUnit, FactorId, MatchTier, Quantity, QualityScore,
    };
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn result(id: &str, scope: Scope, category: &str, kg: Decimal) -> CalculationResult {
        CalculationResult {
            record_id: id.into(),
            tenant_id: "t1".into(),
            scope,
            category: category.into(),
            activity_type: "x".into(),
            normalized: Quantity::new(dec!(1), CanonicalUnit::KWh),
            conversions: vec![],
            factor_id: FactorId::new("f"),
            dataset: "DEFRA_2024".into(),
            tier: MatchTier::Exact,
            gwp: Decimal::ONE,
            co2e_kg: kg,
            co2e_tonnes: kg / dec!(1000),
            quality: QualityScore {
                source: 4.0,
                temporal: 5.0,
                geographic: 5.0,
                completeness: 1.0,
                composite: 4,
            },
            uncertainty: None,
        }
    }

    fn failure(row: usize) -> RowFailure {
        RowFailure::import(row, "amount", "bad")
    }

    #[test]
    fn subtotals_by_scope_and_category() {
        let results = vec![
            result("a", Scope::Scope1, "fuel", dec!(100)),
            result("b", Scope::Scope2, "Electricity", dec!(287.6525)),
            result("c", Scope::Scope2, "electricity", dec!(12.3475)),
            result("d", Scope::Scope3, "travel", dec!(1500)),
        ];
        let agg = EmissionsAggregate::from_results(&results, vec![failure(5)]);

        assert_eq!(agg.scope_kg(Scope::Scope2), dec!(300));
        assert_eq!(agg.scopes[&Scope::Scope2].by_category["electricity"], dec!(300));
        assert_eq!(agg.scopes[&Scope::Scope2].records, 2);
        assert_eq!(agg.total_kg, dec!(1900));
        assert_eq!(agg.total_tonnes(), dec!(1.9));
        assert_eq!(agg.succeeded, 4);
        assert_eq!(agg.failed(), 1);
        assert_eq!(agg.failures[0].stage, Stage::Import);
    }

    #[test]
    fn overflowing_total_saturates_and_is_flagged() {
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);
        let results = vec![
            result("a", Scope::Scope2, "electricity", huge),
            result("b", Scope::Scope2, "electricity", huge),
        ];
        let agg = EmissionsAggregate::from_results(&results, vec![]);

        assert!(agg.overflowed);
        assert_eq!(agg.succeeded, 2);
        assert_eq!(agg.total_kg, Decimal::MAX);
        assert_eq!(agg.scope_kg(Scope::Scope2), Decimal::MAX);

        let single = EmissionsAggregate::from_results(&results[..1], vec![]);
        assert!(!single.overflowed);
        let merged = single.clone().merge(single);
        assert!(merged.overflowed);
        assert_eq!(merged.total_kg, Decimal::MAX);
    }

    #[test]
    fn empty_aggregate_is_zero() {
        let agg = EmissionsAggregate::default();
        assert_eq!(agg.total_kg, Decimal::ZERO);
        assert_eq!(agg.scope_kg(Scope::Scope1), Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn merge_is_order_independent(
            cents in prop::collection::vec((1u8..=3, 0i64..10_000_000), 0..40),
            split in 0usize..40,
            rows in prop::collection::vec(1usize..100, 0..6),
        ) {
            let results: Vec<CalculationResult> = cents
                .iter()
                .enumerate()
                .map(|(i, (scope, c))| {
                    result(
                        &i.to_string(),
                        Scope::try_from(*scope).unwrap(),
                        if i % 2 == 0 { "even" } else { "odd" },
                        Decimal::new(*c, 2),
                    )
                })
                .collect();
            let split = split.min(results.len());
            let (left, right) = results.split_at(split);
            let fail_split = rows.len() / 2;

            let a = EmissionsAggregate::from_results(left, rows[..fail_split].iter().map(|r| failure(*r)));
            let b = EmissionsAggregate::from_results(right, rows[fail_split..].iter().map(|r| failure(*r)));
            let whole = EmissionsAggregate::from_results(&results, rows.iter().map(|r| failure(*r)));

            prop_assert_eq!(a.clone().merge(b.clone()), b.merge(a.clone()));
            prop_assert_eq!(a.merge(EmissionsAggregate::from_results(right, rows[fail_split..].iter().map(|r| failure(*r)))), whole);
        }
    }
}

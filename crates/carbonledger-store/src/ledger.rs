//! Append-only calculation ledger.
//!
//! Every calculation is appended with a sequence number and timestamp.
//! Recalculating a record appends a new entry and points the old one at it
//! through `superseded_by`. Stored results are never rewritten or removed, so
//! the full history of a reported number stays auditable.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, TimestampNanosecondArray, UInt64Array};
use arrow::record_batch::RecordBatch;
use carbonledger_core::{CalculationResult, emissions};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
    pub superseded_by: Option<u64>,
    pub result: CalculationResult,
}

impl LedgerEntry {
    pub fn is_current(&self) -> bool {
        self.superseded_by.is_none()
    }
}

/// Records are keyed by (tenant, record id).
type RecordKey = (String, String);

#[derive(Debug, Default)]
pub struct CalculationLedger {
    entries: Vec<LedgerEntry>,
    current: HashMap<RecordKey, usize>,
}

impl CalculationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result stamped now.
    pub fn append(&mut self, result: CalculationResult) -> u64 {
        self.append_at(result, Utc::now())
    }

    /// Append a result with an explicit timestamp. Returns its sequence number.
    pub fn append_at(&mut self, result: CalculationResult, recorded_at: DateTime<Utc>) -> u64 {
        let seq = self.entries.len() as u64 + 1;
        let key = (result.tenant_id.clone(), result.record_id.clone());
        let idx = self.entries.len();

        if let Some(&previous) = self.current.get(&key) {
            self.entries[previous].superseded_by = Some(seq);
            debug!(
                record = %result.record_id,
                superseded = self.entries[previous].seq,
                seq,
                "superseded calculation"
            );
        }
        self.entries.push(LedgerEntry {
            seq,
            recorded_at,
            superseded_by: None,
            result,
        });
        self.current.insert(key, idx);
        seq
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = CalculationResult>) {
        let now = Utc::now();
        for result in results {
            self.append_at(result, now);
        }
    }

    /// The result currently reported for a record.
    pub fn current(&self, tenant_id: &str, record_id: &str) -> Option<&LedgerEntry> {
        self.current
            .get(&(tenant_id.to_string(), record_id.to_string()))
            .map(|&idx| &self.entries[idx])
    }

    /// Every calculation of a record, oldest first.
    pub fn history(&self, tenant_id: &str, record_id: &str) -> Vec<&LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.result.tenant_id == tenant_id && e.result.record_id == record_id)
            .collect()
    }

    pub fn current_results(&self) -> impl Iterator<Item = &CalculationResult> {
        self.entries
            .iter()
            .filter(|e| e.is_current())
            .map(|e| &e.result)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries as a batch in the ledger schema.
    pub fn to_batch(&self) -> Result<RecordBatch, StoreError> {
        let results: Vec<CalculationResult> =
            self.entries.iter().map(|e| e.result.clone()).collect();

        let mut columns: Vec<ArrayRef> = vec![Arc::new(UInt64Array::from_iter_values(
            self.entries.iter().map(|e| e.seq),
        ))];
        columns.extend(emissions::calculation_columns(&results)?);
        columns.push(Arc::new(
            TimestampNanosecondArray::from_iter_values(
                self.entries
                    .iter()
                    .map(|e| e.recorded_at.timestamp_nanos_opt().unwrap_or(i64::MAX)),
            )
            .with_timezone("UTC"),
        ));
        columns.push(Arc::new(UInt64Array::from(
            self.entries
                .iter()
                .map(|e| e.superseded_by)
                .collect::<Vec<_>>(),
        )));

        Ok(RecordBatch::try_new(
            Arc::new(emissions::ledger_schema()),
            columns,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use carbonledger_core::{
        CanonicalUnit, FactorId, MatchTier, Quantity, QualityScore, Scope,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn result(record: &str, kg: Decimal) -> CalculationResult {
        CalculationResult {
            record_id: record.into(),
            tenant_id: "t1".into(),
            scope: Scope::Scope2,
            category: "electricity".into(),
            activity_type: "grid_electricity".into(),
            normalized: Quantity::new(dec!(1000), CanonicalUnit::KWh),
            conversions: vec![],
            factor_id: FactorId::new("f1"),
            dataset: "DEFRA_2024".into(),
            tier: MatchTier::Exact,
            gwp: Decimal::ONE,
            co2e_kg: kg,
            co2e_tonnes: kg / dec!(1000),
            quality: QualityScore {
                source: 4.0,
                temporal: 5.0,
                geographic: 5.0,
                completeness: 2.0,
                composite: 4,
            },
            uncertainty: None,
        }
    }

    #[test]
    fn recalculation_supersedes_without_removing() {
        let mut ledger = CalculationLedger::new();
        let first = ledger.append(result("r1", dec!(233)));
        ledger.append(result("r2", dec!(50)));
        let second = ledger.append(result("r1", dec!(240)));

        assert_eq!(ledger.len(), 3);
        let current = ledger.current("t1", "r1").unwrap();
        assert_eq!(current.seq, second);
        assert_eq!(current.result.co2e_kg, dec!(240));

        let history = ledger.history("t1", "r1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].seq, first);
        assert_eq!(history[0].superseded_by, Some(second));
        assert_eq!(history[0].result.co2e_kg, dec!(233));
        assert!(history[1].is_current());

        assert_eq!(ledger.current_results().count(), 2);
    }

    #[test]
    fn tenants_do_not_collide() {
        let mut ledger = CalculationLedger::new();
        ledger.append(result("r1", dec!(1)));
        let mut other = result("r1", dec!(2));
        other.tenant_id = "t2".into();
        ledger.append(other);

        assert!(ledger.entries().iter().all(LedgerEntry::is_current));
        assert_eq!(ledger.current("t2", "r1").unwrap().result.co2e_kg, dec!(2));
    }

    #[test]
    fn batch_matches_ledger_schema() {
        let mut ledger = CalculationLedger::new();
        ledger.extend([result("r1", dec!(233)), result("r1", dec!(240))]);
        let batch = ledger.to_batch().unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().as_ref(), &emissions::ledger_schema());
        let superseded = batch
            .column_by_name("superseded_by")
            .unwrap()
            .as_any()
            .downcast_ref::<UInt64Array>()
            .unwrap();
        assert_eq!(superseded.value(0), 2);
        assert!(superseded.is_null(1));
        let ids = batch
            .column_by_name("record_id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(1), "r1");
    }
}

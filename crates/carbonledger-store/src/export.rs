//! Parquet export of calculation results and the ledger.

use std::fs::File;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use carbonledger_core::{CalculationResult, emissions};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::StoreError;
use crate::ledger::CalculationLedger;

/// Write one batch to a Parquet file, replacing it.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    info!(rows = batch.num_rows(), path = %path.display(), "wrote parquet");
    Ok(())
}

/// Read a Parquet file into Arrow RecordBatches.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches: Result<Vec<RecordBatch>, _> = reader.collect();
    Ok(batches?)
}

pub fn export_results(path: &Path, results: &[CalculationResult]) -> Result<(), StoreError> {
    write_parquet(path, &emissions::results_to_batch(results)?)
}

pub fn export_ledger(path: &Path, ledger: &CalculationLedger) -> Result<(), StoreError> {
    write_parquet(path, &ledger.to_batch()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Decimal128Array};
    use carbonledger_core::{
        CanonicalUnit, FactorId, MatchTier, Quantity, QualityScore, Scope,
    };
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn result() -> CalculationResult {
        CalculationResult {
            record_id: "r1".into(),
            tenant_id: "t1".into(),
            scope: Scope::Scope2,
            category: "electricity".into(),
            activity_type: "grid_electricity".into(),
            normalized: Quantity::new(dec!(1234.56), CanonicalUnit::KWh),
            conversions: vec![],
            factor_id: FactorId::new("defra-elec-de-2024"),
            dataset: "DEFRA_2024".into(),
            tier: MatchTier::Exact,
            gwp: dec!(1),
            co2e_kg: dec!(287.65248),
            co2e_tonnes: dec!(0.28765248),
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

    #[test]
    fn results_round_trip_through_parquet() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("results.parquet");
        export_results(&path, &[result()]).unwrap();

        let batches = read_parquet(&path).unwrap();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 1);
        let co2e = batches[0]
            .column_by_name("co2e_kg")
            .unwrap()
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(co2e.value(0), 287_652_480);
        assert!(!co2e.is_null(0));
    }

    #[test]
    fn ledger_exports_with_history() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ledger.parquet");
        let mut ledger = CalculationLedger::new();
        ledger.append(result());
        ledger.append(result());
        export_ledger(&path, &ledger).unwrap();

        let batches = read_parquet(&path).unwrap();
        assert_eq!(batches[0].num_rows(), 2);
        assert!(batches[0].column_by_name("superseded_by").is_some());
    }

    #[test]
    fn missing_parquet_is_not_found() {
        let err = read_parquet(Path::new("/nonexistent/file.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}

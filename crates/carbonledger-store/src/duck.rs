//! DuckDB-backed factor loading from Parquet.
//!
//! Published factor datasets (DEFRA, EPA, EXIOBASE exports) are large and
//! usually shipped as Parquet. DuckDB reads them directly; rows come back as
//! Arrow batches and go through the same row parser as the CSV loader.

use std::path::Path;

use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use carbonledger_core::EmissionFactor;
use duckdb::Connection;
use tracing::info;

use crate::StoreError;
use crate::factors::factor_from_record;

const REQUIRED_COLUMNS: &[&str] = &[
    "id",
    "dataset",
    "dataset_kind",
    "scope",
    "category",
    "activity_type",
    "country_code",
    "year",
    "value",
    "unit",
];

const OPTIONAL_COLUMNS: &[&str] = &[
    "gas",
    "source",
    "tenant_id",
    "uncertainty_pct",
    "source_url",
    "methodology",
    "valid_from",
    "valid_to",
    "notes",
];

/// In-memory or file-backed DuckDB holding a `factors` table.
pub struct FactorStore {
    conn: Connection,
}

impl FactorStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Whether a `factors` table exists.
    pub fn has_factors(&self) -> bool {
        self.factor_count().is_ok()
    }

    /// Load a Parquet file into the `factors` table, replacing it.
    pub fn load_parquet(&self, path: &Path) -> Result<(), StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let sql = format!(
            "CREATE OR REPLACE TABLE factors AS SELECT * FROM read_parquet('{}')",
            path.display().to_string().replace('\'', "''")
        );
        self.conn.execute_batch(&sql)?;
        let count = self.factor_count()?;
        info!(count, path = %path.display(), "loaded factors table");
        Ok(())
    }

    /// Number of rows in the `factors` table.
    pub fn factor_count(&self) -> Result<usize, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT count(*)::BIGINT AS cnt FROM factors")?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<arrow::array::Int64Array>()
            .ok_or(StoreError::NoResults)?;
        Ok(col.value(0) as usize)
    }

    fn columns(&self) -> Result<Vec<String>, StoreError> {
        let batches = self.query_arrow(
            "SELECT column_name FROM information_schema.columns WHERE table_name = 'factors'",
        )?;
        let mut names = Vec::new();
        for batch in &batches {
            let col = utf8(batch, 0)?;
            names.extend((0..col.len()).map(|i| col.value(i).to_ascii_lowercase()));
        }
        Ok(names)
    }

    /// Every row of the `factors` table as an [`EmissionFactor`], ordered by id.
    pub fn factors(&self) -> Result<Vec<EmissionFactor>, StoreError> {
        let present = self.columns()?;
        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|c| !present.iter().any(|p| p == *c))
        {
            return Err(StoreError::Row {
                row: 0,
                message: format!("factors table has no {missing} column"),
            });
        }

        let wanted: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .chain(OPTIONAL_COLUMNS)
            .copied()
            .collect();
        let select = wanted
            .iter()
            .map(|c| {
                if present.iter().any(|p| p == c) {
                    format!("CAST(\"{c}\" AS VARCHAR) AS {c}")
                } else {
                    format!("NULL::VARCHAR AS {c}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let batches = self.query_arrow(&format!("SELECT {select} FROM factors ORDER BY id"))?;

        let headers = csv::StringRecord::from(wanted.clone());
        let mut factors = Vec::new();
        for batch in &batches {
            let columns = (0..wanted.len())
                .map(|i| utf8(batch, i))
                .collect::<Result<Vec<_>, _>>()?;
            for row in 0..batch.num_rows() {
                let record: csv::StringRecord = columns
                    .iter()
                    .map(|col| if col.is_null(row) { "" } else { col.value(row) })
                    .collect();
                let line = factors.len() as u64 + 1;
                factors.push(factor_from_record(&record, &headers, line)?);
            }
        }
        Ok(factors)
    }

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Column `idx` as plain UTF-8, casting view or large string layouts.
fn utf8(batch: &RecordBatch, idx: usize) -> Result<StringArray, StoreError> {
    let casted = cast(batch.column(idx), &DataType::Utf8)?;
    casted
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or(StoreError::NoResults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbonledger_core::{ExtensionKey, Gas, Scope};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn write_fixture(dir: &Path, with_optional: bool) -> std::path::PathBuf {
        let path = dir.join("factors.parquet");
        let extra = if with_optional {
            ", 'CH4' AS gas, 'EPA GHGRP' AS source, 12.5 AS uncertainty_pct"
        } else {
            ""
        };
        let store = FactorStore::open().unwrap();
        store
            .connection()
            .execute_batch(&format!(
                "COPY (
                    SELECT 'epa-ch4-us-2024' AS id, 'EPA_2024' AS dataset, 'estimated' AS dataset_kind,
                           1 AS scope, 'fugitive' AS category, 'landfill_gas' AS activity_type,
                           'US' AS country_code, 2024 AS year, 2.000 AS value, 'kgCH4/t' AS unit{extra}
                    UNION ALL
                    SELECT 'defra-elec-de-2024', 'DEFRA_2024', 'calculated', 2, 'electricity',
                           'grid_electricity', 'DE', 2024, 0.233, 'kgCO2e/kWh'{}
                ) TO '{}' (FORMAT PARQUET)",
                if with_optional { ", NULL, 'DESNZ', NULL" } else { "" },
                path.display()
            ))
            .unwrap();
        path
    }

    #[test]
    fn open_in_memory() {
        let store = FactorStore::open().unwrap();
        let batches = store.query_arrow("SELECT 1 AS x").unwrap();
        assert_eq!(batches[0].num_rows(), 1);
        assert!(!store.has_factors());
    }

    #[test]
    fn load_missing_file_errors() {
        let store = FactorStore::open().unwrap();
        let result = store.load_parquet(Path::new("/nonexistent/factors.parquet"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn reads_factors_from_parquet() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), true);
        let store = FactorStore::open().unwrap();
        store.load_parquet(&path).unwrap();
        assert_eq!(store.factor_count().unwrap(), 2);

        let factors = store.factors().unwrap();
        assert_eq!(factors[0].id.as_str(), "defra-elec-de-2024");
        assert_eq!(factors[0].value, dec!(0.233));
        assert_eq!(factors[0].gas, Gas::Co2e);
        assert_eq!(factors[1].scope, Scope::Scope1);
        assert_eq!(factors[1].gas, Gas::Ch4);
        assert_eq!(
            factors[1].extensions.number(ExtensionKey::UncertaintyPct),
            Some(dec!(12.5))
        );
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), false);
        let factors = crate::load_factors(&path).unwrap();
        assert_eq!(factors.len(), 2);
        assert!(factors.iter().all(|f| f.source.is_empty()));
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = write_fixture(tmp.path(), true);
        let db_path = tmp.path().join("factors.duckdb");

        let store = FactorStore::open_persistent(&db_path).unwrap();
        store.load_parquet(&path).unwrap();
        drop(store);

        let store = FactorStore::open_persistent(&db_path).unwrap();
        assert!(store.has_factors());
        assert_eq!(store.factors().unwrap().len(), 2);
    }
}

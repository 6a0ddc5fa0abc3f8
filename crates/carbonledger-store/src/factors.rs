//! Emission factor loaders: CSV, JSON, and Parquet through DuckDB.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use carbonledger_core::{
    DatasetKind, EmissionFactor, ExtensionKey, ExtensionValue, FactorExtensions, FactorId, Gas,
    Scope,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::StoreError;

/// One line of a factor CSV. Metadata columns are optional and land in the
/// factor's extension map.
#[derive(Debug, Deserialize)]
pub(crate) struct FactorRow {
    id: String,
    dataset: String,
    dataset_kind: DatasetKind,
    scope: Scope,
    category: String,
    activity_type: String,
    country_code: String,
    year: i32,
    value: String,
    unit: String,
    #[serde(default)]
    gas: Option<Gas>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    uncertainty_pct: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    methodology: Option<String>,
    #[serde(default)]
    valid_from: Option<String>,
    #[serde(default)]
    valid_to: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

fn parse_decimal(row: u64, column: &str, text: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(text.trim()).map_err(|e| StoreError::Row {
        row,
        message: format!("{column} {text:?}: {e}"),
    })
}

impl FactorRow {
    pub(crate) fn into_factor(self, row: u64) -> Result<EmissionFactor, StoreError> {
        let value = parse_decimal(row, "value", &self.value)?;

        let mut extensions = FactorExtensions::new();
        if let Some(pct) = self.uncertainty_pct.as_deref().filter(|s| !s.trim().is_empty()) {
            extensions = extensions.with(
                ExtensionKey::UncertaintyPct,
                ExtensionValue::Number(parse_decimal(row, "uncertainty_pct", pct)?),
            );
        }
        for (key, text) in [
            (ExtensionKey::SourceUrl, self.source_url),
            (ExtensionKey::Methodology, self.methodology),
            (ExtensionKey::ValidFrom, self.valid_from),
            (ExtensionKey::ValidTo, self.valid_to),
            (ExtensionKey::Notes, self.notes),
        ] {
            if let Some(text) = text.filter(|s| !s.trim().is_empty()) {
                extensions = extensions.with(key, ExtensionValue::Text(text));
            }
        }

        Ok(EmissionFactor {
            id: FactorId::new(self.id),
            dataset: self.dataset,
            dataset_kind: self.dataset_kind,
            scope: self.scope,
            category: self.category,
            activity_type: self.activity_type,
            country_code: self.country_code,
            year: self.year,
            value,
            unit: self.unit,
            gas: self.gas.unwrap_or_default(),
            source: self.source,
            tenant_id: self.tenant_id.filter(|t| !t.trim().is_empty()),
            extensions,
        })
    }
}

/// Parse one tabular row by header name. Shared with the Parquet path so
/// both formats accept the same columns.
pub(crate) fn factor_from_record(
    record: &csv::StringRecord,
    headers: &csv::StringRecord,
    line: u64,
) -> Result<EmissionFactor, StoreError> {
    let row: FactorRow = record.deserialize(Some(headers))?;
    row.into_factor(line)
}

/// Parse factors from CSV with a header row.
pub fn read_factors_csv<R: Read>(reader: R) -> Result<Vec<EmissionFactor>, StoreError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut factors = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(factors.len() as u64 + 2, |p| p.line());
        factors.push(factor_from_record(&record, &headers, line)?);
    }
    Ok(factors)
}

/// Parse factors from a JSON array.
pub fn read_factors_json<R: Read>(reader: R) -> Result<Vec<EmissionFactor>, StoreError> {
    Ok(serde_json::from_reader(reader)?)
}

/// Load factors from a file, choosing the format by extension.
pub fn load_factors(path: &Path) -> Result<Vec<EmissionFactor>, StoreError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let factors = match ext.as_deref() {
        Some("csv") => read_factors_csv(open(path)?)?,
        Some("json") => read_factors_json(open(path)?)?,
        #[cfg(feature = "duckdb")]
        Some("parquet") => {
            let store = crate::duck::FactorStore::open()?;
            store.load_parquet(path)?;
            store.factors()?
        }
        _ => return Err(StoreError::UnsupportedFormat(path.to_path_buf())),
    };
    info!(count = factors.len(), path = %path.display(), "loaded emission factors");
    Ok(factors)
}

pub(crate) fn open(path: &Path) -> Result<std::io::BufReader<std::fs::File>, StoreError> {
    let file = std::fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    Ok(std::io::BufReader::new(file))
}

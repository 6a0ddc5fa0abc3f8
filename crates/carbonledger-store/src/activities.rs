//! Activity record import from CSV.
//!
//! Amounts are kept as raw text so the sanitizer sees exactly what the
//! supplier typed. Rows that cannot be read become row failures instead of
//! aborting the import.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use carbonledger_calc::RowFailure;
use carbonledger_core::{ActivityRecord, FactorId, LocaleHint, RawAmount, ReportingPeriod, Scope};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::StoreError;

/// A CSV row as text. Typed parsing happens in [`ActivityRow::into_record`] so
/// a failure can name its column.
#[derive(Debug, Deserialize)]
struct ActivityRow {
    id: String,
    tenant_id: String,
    scope: String,
    category: String,
    activity_type: String,
    amount: String,
    unit: String,
    country_code: String,
    year: String,
    #[serde(default)]
    period_start: Option<String>,
    #[serde(default)]
    period_end: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    factor_override: Option<String>,
    #[serde(default)]
    specific_factor_id: Option<String>,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    supplier_id: Option<String>,
    #[serde(default)]
    facility_id: Option<String>,
    #[serde(default)]
    evidence_ref: Option<String>,
    #[serde(default)]
    activity_uncertainty_pct: Option<String>,
}

/// Column name and reason.
type FieldError = (&'static str, String);

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_field<T>(column: &'static str, value: Option<String>) -> Result<Option<T>, FieldError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    non_empty(value)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| (column, format!("invalid {column} {v:?}: {e}")))
        })
        .transpose()
}

fn parse_locale(value: Option<String>) -> Result<LocaleHint, FieldError> {
    match non_empty(value).map(|v| v.to_ascii_uppercase()).as_deref() {
        None | Some("AUTO") => Ok(LocaleHint::Auto),
        Some("US") => Ok(LocaleHint::Us),
        Some("EU") => Ok(LocaleHint::Eu),
        Some(other) => Err(("locale", format!("unknown locale {other:?}, expected US, EU or AUTO"))),
    }
}

impl ActivityRow {
    fn into_record(self) -> Result<ActivityRecord, FieldError> {
        let scope = parse_field::<u8>("scope", Some(self.scope))?
            .ok_or(("scope", "missing scope".to_string()))?;
        let scope = Scope::try_from(scope).map_err(|e| ("scope", e.to_string()))?;
        let year = parse_field::<i32>("year", Some(self.year))?
            .ok_or(("year", "missing year".to_string()))?;

        Ok(ActivityRecord {
            id: self.id,
            tenant_id: self.tenant_id,
            scope,
            category: self.category,
            activity_type: self.activity_type,
            raw_amount: RawAmount::Text(self.amount),
            raw_unit: self.unit,
            country_code: self.country_code,
            period: ReportingPeriod {
                year,
                start: parse_field::<NaiveDate>("period_start", self.period_start)?,
                end: parse_field::<NaiveDate>("period_end", self.period_end)?,
            },
            locale: parse_locale(self.locale)?,
            factor_override: parse_field::<Decimal>("factor_override", self.factor_override)?,
            specific_factor_id: non_empty(self.specific_factor_id).map(FactorId::new),
            dataset: non_empty(self.dataset),
            supplier_id: non_empty(self.supplier_id),
            facility_id: non_empty(self.facility_id),
            evidence_ref: non_empty(self.evidence_ref),
            activity_uncertainty_pct: parse_field::<Decimal>(
                "activity_uncertainty_pct",
                self.activity_uncertainty_pct,
            )?,
        })
    }
}

/// Records read from a CSV, each with its file line number, plus the rows
/// that could not be read.
#[derive(Debug, Default)]
pub struct ActivityImport {
    pub records: Vec<(usize, ActivityRecord)>,
    pub failures: Vec<RowFailure>,
}

impl ActivityImport {
    pub fn rows(&self) -> impl Iterator<Item = (usize, &ActivityRecord)> {
        self.records.iter().map(|(row, record)| (*row, record))
    }
}

/// Read activity records from CSV with a header row.
///
/// Errors in the header itself are fatal; errors in a data row are reported
/// against that row's line number and the column that failed.
pub fn read_activities_csv<R: Read>(reader: R) -> Result<ActivityImport, StoreError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut import = ActivityImport::default();
    for (idx, result) in rdr.records().enumerate() {
        // Header is line 1.
        let fallback_line = idx + 2;
        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                let line = e
                    .position()
                    .map_or(fallback_line, |p| p.line() as usize);
                import.failures.push(RowFailure::import(line, "", e.to_string()));
                continue;
            }
        };
        let line = raw.position().map_or(fallback_line, |p| p.line() as usize);

        let row = match raw.deserialize::<ActivityRow>(Some(&headers)) {
            Ok(row) => row.into_record(),
            Err(e) => Err(("", e.to_string())),
        };
        match row {
            Ok(record) => import.records.push((line, record)),
            Err((column, message)) => {
                warn!(line, column, %message, "skipping unreadable activity row");
                import.failures.push(RowFailure::import(line, column, message));
            }
        }
    }
    Ok(import)
}

pub fn load_activities(path: &Path) -> Result<ActivityImport, StoreError> {
    let import = read_activities_csv(crate::factors::open(path)?)?;
    info!(
        records = import.records.len(),
        rejected = import.failures.len(),
        path = %path.display(),
        "imported activity records"
    );
    Ok(import)
}

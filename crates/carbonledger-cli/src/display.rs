//! Terminal rendering for calculation results, resolved factors and batch
//! summaries.

use arrow::array::*;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use carbonledger_calc::{EmissionsAggregate, RowFailure};
use carbonledger_core::{EmissionFactor, MatchTier};
use rust_decimal::Decimal;

const MAX_FAILURES: usize = 20;

// ── Result card sections ──

const IDENTITY: &[&str] = &[
    "record_id",
    "tenant_id",
    "scope",
    "category",
    "activity_type",
];

const ACTIVITY: &[&str] = &["normalized_value", "normalized_unit"];

const FACTOR: &[&str] = &["factor_id", "dataset", "tier", "gwp"];

const EMISSIONS: &[&str] = &["co2e_kg", "co2e_tonnes"];

const QUALITY: &[&str] = &[
    "quality_source",
    "quality_temporal",
    "quality_geographic",
    "quality_completeness",
    "quality_composite",
];

const UNCERTAINTY: &[&str] = &[
    "uncertainty_iterations",
    "uncertainty_mean",
    "uncertainty_std_dev",
    "ci95_low",
    "ci95_high",
];

const TABLE: &[&str] = &[
    "record_id",
    "scope",
    "activity_type",
    "factor_id",
    "tier",
    "co2e_kg",
    "quality_composite",
];

// ── Public API ──

/// Print one row of a results batch as a vertical card.
pub fn print_result_card(batch: &RecordBatch, row: usize) {
    let id = cell(batch, "record_id", row).unwrap_or_default();
    println!("=== {id} ===");
    println!();

    print_section(batch, row, "Activity", IDENTITY);
    print_section(batch, row, "Normalized", ACTIVITY);
    print_section(batch, row, "Factor", FACTOR);
    print_section(batch, row, "Emissions", EMISSIONS);
    print_section(batch, row, "Data Quality", QUALITY);
    print_section(batch, row, "Uncertainty (kgCO2e)", UNCERTAINTY);
}

/// Print the headline columns of a results batch as a table.
pub fn print_results_table(batch: &RecordBatch) -> anyhow::Result<()> {
    let schema = batch.schema();
    let indices: Vec<usize> = TABLE
        .iter()
        .filter_map(|c| schema.index_of(c).ok())
        .collect();
    let projected = batch.project(&indices)?;
    println!("{}", arrow::util::pretty::pretty_format_batches(&[projected])?);
    Ok(())
}

pub fn print_summary(agg: &EmissionsAggregate) {
    println!("Totals");
    for (scope, subtotal) in &agg.scopes {
        println!(
            "  {:<26} {} t  ({} records)",
            scope.to_string(),
            tonnes(subtotal.co2e_tonnes()),
            subtotal.records
        );
        for (category, kg) in &subtotal.by_category {
            println!("    {:<24} {} kg", category, kg.round_dp(4));
        }
    }
    println!("  {:<26} {} t", "total", tonnes(agg.total_tonnes()));
    if agg.overflowed {
        println!("  {:<26} totals exceed the decimal range and are capped", "warning");
    }
    println!("  {:<26} {}", "succeeded", agg.succeeded);
    println!("  {:<26} {}", "failed", agg.failed());
    println!();

    print_failures(&agg.failures);
}

pub fn print_failures(failures: &[RowFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("Failures ({})", failures.len());
    for f in failures.iter().take(MAX_FAILURES) {
        let column = if f.column.is_empty() { "-" } else { &f.column };
        println!(
            "  row {:<6} {:<10} {:<16} {}",
            f.row,
            f.stage.as_str(),
            column,
            f.message
        );
    }
    if failures.len() > MAX_FAILURES {
        println!("  ... and {} more", failures.len() - MAX_FAILURES);
    }
    println!();
}

pub fn print_factor_card(factor: &EmissionFactor, tier: MatchTier) {
    println!("=== {} ===", factor.id);
    println!();
    println!("Match");
    println!("  {:<26} {}", "tier", tier);
    println!("  {:<26} {}", "dataset", factor.dataset);
    println!("  {:<26} {}", "dataset_kind", factor.dataset_kind.as_str());
    println!();
    println!("Factor");
    println!("  {:<26} {} {}", "value", factor.value, factor.unit);
    println!("  {:<26} {:?}", "gas", factor.gas);
    println!("  {:<26} {}", "country_code", factor.country_code);
    println!("  {:<26} {}", "year", factor.year);
    if !factor.source.is_empty() {
        println!("  {:<26} {}", "source", factor.source);
    }
    if let Some(tenant) = &factor.tenant_id {
        println!("  {:<26} {}", "tenant_id", tenant);
    }
    if !factor.extensions.is_empty() {
        println!();
        println!("Metadata");
        for (key, value) in factor.extensions.iter() {
            let key = serde_json::to_value(key)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            let value = serde_json::to_value(value)
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_default();
            println!("  {:<26} {}", key, value);
        }
    }
    println!();
}

// ── Section rendering ──

fn print_section(batch: &RecordBatch, row: usize, header: &str, cols: &[&str]) {
    let has_data = cols.iter().any(|&col| {
        batch
            .column_by_name(col)
            .is_some_and(|c| !c.is_null(row))
    });
    if !has_data {
        return;
    }

    println!("{header}");
    for &col_name in cols {
        if let Some(value) = cell(batch, col_name, row) {
            println!("  {:<26} {}", col_name, value);
        }
    }
    println!();
}

// ── Helpers ──

/// A cell rendered with Arrow's display formatting; `None` when null or absent.
fn cell(batch: &RecordBatch, col_name: &str, row: usize) -> Option<String> {
    let col = batch.column_by_name(col_name)?;
    if col.is_null(row) {
        return None;
    }
    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(col.as_ref(), &options).ok()?;
    Some(formatter.value(row).to_string())
}

fn tonnes(value: Decimal) -> Decimal {
    value.round_dp(6).normalize()
}

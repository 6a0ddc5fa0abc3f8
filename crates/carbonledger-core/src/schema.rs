/// Arrow schema definitions for calculated emissions.
pub mod emissions {
    use std::sync::Arc;

    use arrow::array::{
        ArrayRef, Decimal128Array, Float64Array, StringArray, UInt8Array, UInt32Array,
    };
    use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
    use arrow::error::ArrowError;
    use arrow::record_batch::RecordBatch;
    use rust_decimal::Decimal;

    use crate::result::CalculationResult;

    /// Precision and scale of every decimal column.
    pub const DECIMAL_PRECISION: u8 = 38;
    pub const DECIMAL_SCALE: i8 = 6;

    fn decimal_type() -> DataType {
        DataType::Decimal128(DECIMAL_PRECISION, DECIMAL_SCALE)
    }

    /// Columns shared by the results table and the ledger.
    pub fn calculation_fields() -> Vec<Field> {
        vec![
            Field::new("record_id", DataType::Utf8, false),
            Field::new("tenant_id", DataType::Utf8, false),
            Field::new("scope", DataType::UInt8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("activity_type", DataType::Utf8, false),
            Field::new("normalized_value", decimal_type(), false),
            Field::new("normalized_unit", DataType::Utf8, false),
            Field::new("factor_id", DataType::Utf8, false),
            Field::new("dataset", DataType::Utf8, false),
            Field::new("tier", DataType::Utf8, false),
            Field::new("gwp", decimal_type(), false),
            Field::new("co2e_kg", decimal_type(), false),
            Field::new("co2e_tonnes", decimal_type(), false),
            Field::new("quality_source", DataType::Float64, false),
            Field::new("quality_temporal", DataType::Float64, false),
            Field::new("quality_geographic", DataType::Float64, false),
            Field::new("quality_completeness", DataType::Float64, false),
            Field::new("quality_composite", DataType::UInt8, false),
            Field::new("uncertainty_iterations", DataType::UInt32, true),
            Field::new("uncertainty_mean", DataType::Float64, true),
            Field::new("uncertainty_std_dev", DataType::Float64, true),
            Field::new("ci95_low", DataType::Float64, true),
            Field::new("ci95_high", DataType::Float64, true),
        ]
    }

    /// Schema for one row per calculated activity record.
    pub fn calculation_schema() -> Schema {
        Schema::new(calculation_fields())
    }

    /// Schema for the append-only calculation ledger.
    pub fn ledger_schema() -> Schema {
        let mut fields = vec![Field::new("seq", DataType::UInt64, false)];
        fields.extend(calculation_fields());
        fields.push(Field::new(
            "recorded_at",
            DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
            false,
        ));
        fields.push(Field::new("superseded_by", DataType::UInt64, true));
        Schema::new(fields)
    }

    /// Scale a decimal to the column scale and return its mantissa. Values too
    /// large to carry six fractional digits are rejected.
    pub fn decimal_to_i128(value: Decimal) -> Result<i128, ArrowError> {
        let mut scaled = value.round_dp(DECIMAL_SCALE as u32);
        scaled.rescale(DECIMAL_SCALE as u32);
        if scaled.scale() != DECIMAL_SCALE as u32 {
            return Err(ArrowError::InvalidArgumentError(format!(
                "{value} cannot be stored at scale {DECIMAL_SCALE}"
            )));
        }
        Ok(scaled.mantissa())
    }

    fn decimal_column(values: impl Iterator<Item = Decimal>) -> Result<ArrayRef, ArrowError> {
        let mantissas = values.map(decimal_to_i128).collect::<Result<Vec<_>, _>>()?;
        let array = Decimal128Array::from_iter_values(mantissas)
            .with_precision_and_scale(DECIMAL_PRECISION, DECIMAL_SCALE)?;
        Ok(Arc::new(array))
    }

    fn utf8_column<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
        Arc::new(StringArray::from_iter_values(values))
    }

    /// Columns for `results`, in [`calculation_fields`] order.
    pub fn calculation_columns(results: &[CalculationResult]) -> Result<Vec<ArrayRef>, ArrowError> {
        let unc = |f: fn(&crate::result::UncertaintyResult) -> f64| -> ArrayRef {
            Arc::new(Float64Array::from(
                results
                    .iter()
                    .map(|r| r.uncertainty.as_ref().map(f))
                    .collect::<Vec<_>>(),
            ))
        };

        Ok(vec![
            utf8_column(results.iter().map(|r| r.record_id.as_str())),
            utf8_column(results.iter().map(|r| r.tenant_id.as_str())),
            Arc::new(UInt8Array::from_iter_values(
                results.iter().map(|r| r.scope.number()),
            )),
            utf8_column(results.iter().map(|r| r.category.as_str())),
            utf8_column(results.iter().map(|r| r.activity_type.as_str())),
            decimal_column(results.iter().map(|r| r.normalized.value))?,
            utf8_column(results.iter().map(|r| r.normalized.unit.symbol())),
            utf8_column(results.iter().map(|r| r.factor_id.as_str())),
            utf8_column(results.iter().map(|r| r.dataset.as_str())),
            utf8_column(results.iter().map(|r| r.tier.as_str())),
            decimal_column(results.iter().map(|r| r.gwp))?,
            decimal_column(results.iter().map(|r| r.co2e_kg))?,
            decimal_column(results.iter().map(|r| r.co2e_tonnes))?,
            Arc::new(Float64Array::from_iter_values(
                results.iter().map(|r| r.quality.source),
            )),
            Arc::new(Float64Array::from_iter_values(
                results.iter().map(|r| r.quality.temporal),
            )),
            Arc::new(Float64Array::from_iter_values(
                results.iter().map(|r| r.quality.geographic),
            )),
            Arc::new(Float64Array::from_iter_values(
                results.iter().map(|r| r.quality.completeness),
            )),
            Arc::new(UInt8Array::from_iter_values(
                results.iter().map(|r| r.quality.composite),
            )),
            Arc::new(UInt32Array::from(
                results
                    .iter()
                    .map(|r| r.uncertainty.as_ref().map(|u| u.iterations))
                    .collect::<Vec<_>>(),
            )),
            unc(|u| u.mean),
            unc(|u| u.std_dev),
            unc(|u| u.ci95.0),
            unc(|u| u.ci95.1),
        ])
    }

    /// Build a RecordBatch of calculation results.
    pub fn results_to_batch(results: &[CalculationResult]) -> Result<RecordBatch, ArrowError> {
        RecordBatch::try_new(
            Arc::new(calculation_schema()),
            calculation_columns(results)?,
        )
    }
}

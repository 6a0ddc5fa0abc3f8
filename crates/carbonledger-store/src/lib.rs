//! Storage layer: reference data loading (CSV, JSON, Parquet via DuckDB),
//! activity import, the append-only calculation ledger and Parquet export.

mod error;
pub use error::StoreError;

pub mod activities;
pub mod contexts;
pub mod factors;
pub mod ledger;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::FactorStore;

#[cfg(feature = "parquet")]
pub mod export;
#[cfg(feature = "parquet")]
pub use export::{export_ledger, export_results, read_parquet, write_parquet};

pub use activities::{ActivityImport, load_activities, read_activities_csv};
pub use contexts::{load_contexts, read_contexts};
pub use factors::{load_factors, read_factors_csv, read_factors_json};
pub use ledger::{CalculationLedger, LedgerEntry};

use std::path::Path;

use carbonledger_calc::{ConversionContexts, ReferenceData};

/// Load every factor file and an optional context file into validated
/// reference data. Without a context file the built-in fuel properties are
/// used; with one, its entries are layered over them.
pub fn load_reference(
    factor_paths: &[impl AsRef<Path>],
    contexts_path: Option<&Path>,
) -> Result<ReferenceData, StoreError> {
    let mut factors = Vec::new();
    for path in factor_paths {
        factors.extend(load_factors(path.as_ref())?);
    }
    let contexts = match contexts_path {
        Some(path) => load_contexts(path, true)?,
        None => ConversionContexts::standard(),
    };
    Ok(ReferenceData::new(factors, contexts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbonledger_calc::ReferenceError;
    use carbonledger_core::{Dimension, FactorId};
    use tempfile::TempDir;

    const DEFRA: &str = "\
id,dataset,dataset_kind,scope,category,activity_type,country_code,year,value,unit
defra-elec-gb-2024,DEFRA_2024,calculated,2,electricity,grid_electricity,GB,2024,0.207,kgCO2e/kWh
";
    const EPA: &str = "\
id,dataset,dataset_kind,scope,category,activity_type,country_code,year,value,unit
epa-elec-us-2024,EPA_2024,calculated,2,electricity,grid_electricity,US,2024,0.386,kgCO2e/kWh
";

    #[test]
    fn combines_factor_files_and_contexts() {
        let tmp = TempDir::new().unwrap();
        let defra = tmp.path().join("defra.csv");
        let epa = tmp.path().join("epa.csv");
        let ctx = tmp.path().join("contexts.toml");
        std::fs::write(&defra, DEFRA).unwrap();
        std::fs::write(&epa, EPA).unwrap();
        std::fs::write(
            &ctx,
            "[[rate]]\ncurrency = \"USD\"\neur_per_unit = 0.92\nsource = \"ECB\"\n",
        )
        .unwrap();

        let reference = load_reference(&[&defra, &epa], Some(ctx.as_path())).unwrap();
        assert_eq!(reference.len(), 2);
        assert!(reference.factor(&FactorId::new("epa-elec-us-2024")).is_some());
        assert!(reference.contexts().rate("USD").is_some());
        assert!(
            reference
                .contexts()
                .context("diesel", Dimension::Volume, Dimension::Mass)
                .is_some()
        );
    }

    #[test]
    fn duplicate_ids_across_files_rejected() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.csv");
        let b = tmp.path().join("b.csv");
        std::fs::write(&a, DEFRA).unwrap();
        std::fs::write(&b, DEFRA).unwrap();

        let err = load_reference(&[a, b], None).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Reference(ReferenceError::DuplicateId(_))
        ));
    }
}

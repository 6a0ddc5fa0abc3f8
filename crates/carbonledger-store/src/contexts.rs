//! Conversion contexts and exchange rates from TOML.
//!
//! ```toml
//! [[context]]
//! substance = "diesel"
//! numerator = "mass"
//! denominator = "volume"
//! value = 0.835
//! source = "DESNZ 2024"
//!
//! [[rate]]
//! currency = "USD"
//! eur_per_unit = 0.92
//! source = "ECB 2024 annual average"
//! ```

use std::path::Path;

use carbonledger_calc::{ConversionContext, ConversionContexts, ExchangeRate};
use serde::Deserialize;
use tracing::info;

use crate::StoreError;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ContextFile {
    context: Vec<ConversionContext>,
    rate: Vec<ExchangeRate>,
}

/// Parse contexts from TOML text, layered over `base`.
pub fn read_contexts(text: &str, base: ConversionContexts) -> Result<ConversionContexts, StoreError> {
    let file: ContextFile = toml::from_str(text)?;
    let mut contexts = base;
    for context in file.context {
        contexts.add_context(context);
    }
    for rate in file.rate {
        contexts.add_rate(rate);
    }
    Ok(contexts)
}

/// Load a context file. With `standard`, file entries are layered over the
/// built-in fuel properties and replace them per substance and dimension pair.
pub fn load_contexts(path: &Path, standard: bool) -> Result<ConversionContexts, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let base = if standard {
        ConversionContexts::standard()
    } else {
        ConversionContexts::default()
    };
    let contexts = read_contexts(&text, base)?;
    info!(
        contexts = contexts.context_count(),
        rates = contexts.rate_count(),
        path = %path.display(),
        "loaded conversion contexts"
    );
    Ok(contexts)
}

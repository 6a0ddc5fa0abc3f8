//! Unit registry and normalization to canonical units.
//!
//! Every unit carries the factor that takes it to its dimension's canonical
//! unit and the reference that factor comes from, so each conversion in a
//! calculation can be traced back for audit. Currencies other than EUR have
//! no static factor; they need an exchange-rate context.

use carbonledger_core::{AppliedConversion, Dimension, Quantity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::context::ConversionContexts;
use crate::error::CalcError;

const SI: &str = "SI / BIPM SI Brochure, 9th edition";
const NIST: &str = "NIST SP 811, Appendix B";
const DESNZ: &str = "UK DESNZ GHG conversion factors, unit conversions";

/// A registered unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDef {
    pub symbol: &'static str,
    pub aliases: &'static [&'static str],
    pub dimension: Dimension,
    /// Canonical units per one of this unit; `None` for currencies other than EUR.
    pub to_canonical: Option<Decimal>,
    pub source: &'static str,
}

const fn unit(
    symbol: &'static str,
    aliases: &'static [&'static str],
    dimension: Dimension,
    to_canonical: Decimal,
    source: &'static str,
) -> UnitDef {
    UnitDef {
        symbol,
        aliases,
        dimension,
        to_canonical: Some(to_canonical),
        source,
    }
}

const fn currency(symbol: &'static str, aliases: &'static [&'static str]) -> UnitDef {
    UnitDef {
        symbol,
        aliases,
        dimension: Dimension::Currency,
        to_canonical: None,
        source: "exchange rate context",
    }
}

pub static UNITS: &[UnitDef] = &[
    // Mass → kg
    unit("kg", &["kilogram", "kilograms", "kgs"], Dimension::Mass, dec!(1), SI),
    unit("g", &["gram", "grams"], Dimension::Mass, dec!(0.001), SI),
    unit("mg", &["milligram", "milligrams"], Dimension::Mass, dec!(0.000001), SI),
    unit("t", &["tonne", "tonnes", "metric ton", "metric tons", "mt"], Dimension::Mass, dec!(1000), SI),
    unit("kt", &["kilotonne", "kilotonnes"], Dimension::Mass, dec!(1000000), SI),
    unit("lb", &["lbs", "pound", "pounds"], Dimension::Mass, dec!(0.45359237), NIST),
    unit("oz", &["ounce", "ounces"], Dimension::Mass, dec!(0.028349523125), NIST),
    unit("short_ton", &["short ton", "short tons", "us ton"], Dimension::Mass, dec!(907.18474), NIST),
    unit("long_ton", &["long ton", "long tons", "imperial ton"], Dimension::Mass, dec!(1016.0469088), NIST),
    // Energy → kWh
    unit("kWh", &["kilowatt hour", "kilowatt hours", "kilowatt-hour", "kw h"], Dimension::Energy, dec!(1), SI),
    unit("Wh", &["watt hour", "watt hours"], Dimension::Energy, dec!(0.001), SI),
    unit("MWh", &["megawatt hour", "megawatt hours"], Dimension::Energy, dec!(1000), SI),
    unit("GWh", &["gigawatt hour", "gigawatt hours"], Dimension::Energy, dec!(1000000), SI),
    unit("MJ", &["megajoule", "megajoules"], Dimension::Energy, dec!(0.2777777777777777777777777778), SI),
    unit("GJ", &["gigajoule", "gigajoules"], Dimension::Energy, dec!(277.77777777777777777777777778), SI),
    unit("TJ", &["terajoule", "terajoules"], Dimension::Energy, dec!(277777.77777777777777777777778), SI),
    unit("therm", &["therms", "thm"], Dimension::Energy, dec!(29.3071), DESNZ),
    unit("MMBtu", &["mmbtu", "million btu"], Dimension::Energy, dec!(293.07107), NIST),
    unit("Btu", &["btu", "btus"], Dimension::Energy, dec!(0.00029307107), NIST),
    // Volume → L
    unit("L", &["l", "litre", "litres", "liter", "liters", "ltr"], Dimension::Volume, dec!(1), SI),
    unit("mL", &["millilitre", "millilitres", "milliliter", "milliliters"], Dimension::Volume, dec!(0.001), SI),
    unit("m3", &["m³", "cubic metre", "cubic metres", "cubic meter", "cubic meters", "cbm"], Dimension::Volume, dec!(1000), SI),
    unit("gal_us", &["us gallon", "us gallons", "usgal"], Dimension::Volume, dec!(3.785411784), NIST),
    unit("gal_imp", &["imperial gallon", "imperial gallons", "uk gallon", "uk gallons"], Dimension::Volume, dec!(4.54609), NIST),
    unit("bbl", &["barrel", "barrels", "oil barrel"], Dimension::Volume, dec!(158.987294928), NIST),
    unit("ft3", &["cubic foot", "cubic feet", "cf"], Dimension::Volume, dec!(28.316846592), NIST),
    // Distance → km
    unit("km", &["kilometre", "kilometres", "kilometer", "kilometers", "kms"], Dimension::Distance, dec!(1), SI),
    unit("m", &["metre", "metres", "meter", "meters"], Dimension::Distance, dec!(0.001), SI),
    unit("mi", &["mile", "miles"], Dimension::Distance, dec!(1.609344), NIST),
    unit("nmi", &["nautical mile", "nautical miles"], Dimension::Distance, dec!(1.852), NIST),
    // Currency → EUR
    unit("EUR", &["€", "euro", "euros"], Dimension::Currency, dec!(1), "canonical currency"),
    currency("USD", &["$", "us$", "us dollar", "us dollars"]),
    currency("GBP", &["£", "pound sterling"]),
    currency("CHF", &["swiss franc", "swiss francs"]),
    currency("JPY", &["¥", "yen"]),
    currency("CNY", &["rmb", "yuan"]),
    currency("SEK", &[]),
    currency("NOK", &[]),
    currency("DKK", &[]),
    currency("PLN", &["zloty"]),
    currency("CAD", &["c$"]),
    currency("AUD", &["a$"]),
    currency("INR", &["₹", "rupee", "rupees"]),
];

/// Symbols whose meaning depends on convention. Resolved with the category hint.
const GALLON_TOKENS: &[&str] = &["gal", "gals", "gallon", "gallons"];
const TON_TOKENS: &[&str] = &["ton", "tons"];

fn fold(token: &str) -> String {
    token
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn by_symbol(symbol: &str) -> Option<&'static UnitDef> {
    UNITS.iter().find(|u| u.symbol == symbol)
}

/// Look up a unit by symbol or alias, case-insensitively.
///
/// `category_hint` disambiguates gallons (imperial when the hint mentions
/// `uk` or `imperial`, US otherwise) and tons (short ton when the hint
/// mentions `short` or `us`, metric tonne otherwise).
pub fn lookup_unit(unit: &str, category_hint: Option<&str>) -> Option<&'static UnitDef> {
    let folded = fold(unit);
    if folded.is_empty() {
        return None;
    }
    let hint = category_hint.map(fold).unwrap_or_default();
    let hint_has = |words: &[&str]| {
        hint.split(|c: char| !c.is_ascii_alphanumeric())
            .any(|w| words.contains(&w))
    };

    if GALLON_TOKENS.contains(&folded.as_str()) {
        return if hint_has(&["uk", "gb", "imperial"]) {
            by_symbol("gal_imp")
        } else {
            by_symbol("gal_us")
        };
    }
    if TON_TOKENS.contains(&folded.as_str()) {
        return if hint_has(&["short", "us"]) {
            by_symbol("short_ton")
        } else {
            by_symbol("t")
        };
    }

    UNITS.iter().find(|u| {
        u.symbol.to_lowercase() == folded || u.aliases.iter().any(|a| *a == folded)
    })
}

/// Nearest registered symbol or alias to `unit`, reported by its symbol.
pub fn suggest_unit(unit: &str) -> String {
    let folded = fold(unit);
    let mut best: Option<(usize, &'static str)> = None;
    for def in UNITS {
        let candidates = std::iter::once(def.symbol).chain(def.aliases.iter().copied());
        for candidate in candidates {
            let distance = levenshtein(&folded, &candidate.to_lowercase());
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, def.symbol));
            }
        }
    }
    best.map(|(_, s)| s.to_string()).unwrap_or_default()
}

/// Edit distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// A quantity in its canonical unit plus the step that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub quantity: Quantity,
    pub conversion: AppliedConversion,
}

/// Converts quantities to canonical units, using contexts for currencies and
/// cross-dimension bridges.
#[derive(Debug, Clone, Copy)]
pub struct UnitNormalizer<'a> {
    contexts: &'a ConversionContexts,
}

impl<'a> UnitNormalizer<'a> {
    pub fn new(contexts: &'a ConversionContexts) -> Self {
        Self { contexts }
    }

    /// Resolve a unit string, failing with a suggestion when it is unknown.
    pub fn unit(&self, unit: &str, category_hint: Option<&str>) -> Result<&'static UnitDef, CalcError> {
        lookup_unit(unit, category_hint).ok_or_else(|| CalcError::UnknownUnit {
            unit: unit.to_string(),
            suggestion: suggest_unit(unit),
        })
    }

    /// Canonical units per one `def`, with its provenance.
    pub fn scale(&self, def: &UnitDef) -> Result<(Decimal, AppliedConversion), CalcError> {
        let canonical = def.dimension.canonical();
        let (factor, source) = match def.to_canonical {
            Some(factor) => (factor, def.source.to_string()),
            None => {
                let rate = self.contexts.rate(def.symbol).ok_or_else(|| {
                    CalcError::MissingConversionContext {
                        key: def.symbol.to_string(),
                        from: def.symbol.to_string(),
                        to: canonical.symbol().to_string(),
                    }
                })?;
                (rate.eur_per_unit, rate.source.clone())
            }
        };
        Ok((
            factor,
            AppliedConversion {
                key: def.symbol.to_string(),
                from: def.symbol.to_string(),
                to: canonical.symbol().to_string(),
                factor,
                source,
            },
        ))
    }

    /// Convert `value` in `unit` to its dimension's canonical unit.
    pub fn normalize_unit(
        &self,
        value: Decimal,
        unit: &str,
        category_hint: Option<&str>,
    ) -> Result<Normalized, CalcError> {
        let def = self.unit(unit, category_hint)?;
        let (factor, conversion) = self.scale(def)?;
        let value = value
            .checked_mul(factor)
            .ok_or(CalcError::Arithmetic("unit normalization"))?;
        debug!(unit, to = %conversion.to, %factor, "normalized unit");
        Ok(Normalized {
            quantity: Quantity::new(value, def.dimension.canonical()),
            conversion,
        })
    }

    /// Bridge a canonical quantity into another dimension using the
    /// substance's conversion context (density, calorific value).
    pub fn convert_dimension(
        &self,
        quantity: Quantity,
        target: Dimension,
        substance: &str,
    ) -> Result<(Quantity, AppliedConversion), CalcError> {
        let from = quantity.dimension();
        if from == target {
            return Err(CalcError::MissingConversionContext {
                key: substance.to_string(),
                from: from.to_string(),
                to: target.to_string(),
            });
        }
        let missing = || CalcError::MissingConversionContext {
            key: substance.to_string(),
            from: quantity.unit.symbol().to_string(),
            to: target.canonical().symbol().to_string(),
        };
        let context = self.contexts.context(substance, from, target).ok_or_else(missing)?;

        // Contexts are stored as numerator per denominator.
        let factor = if context.numerator == target {
            context.value
        } else {
            Decimal::ONE
                .checked_div(context.value)
                .ok_or(CalcError::Arithmetic("conversion context inverse"))?
        };
        let value = if context.numerator == target {
            quantity.value.checked_mul(context.value)
        } else {
            quantity.value.checked_div(context.value)
        }
        .ok_or(CalcError::Arithmetic("dimension conversion"))?;

        let conversion = AppliedConversion {
            key: context.substance.clone(),
            from: quantity.unit.symbol().to_string(),
            to: target.canonical().symbol().to_string(),
            factor,
            source: context.source.clone(),
        };
        debug!(
            substance = %context.substance,
            from = %conversion.from,
            to = %conversion.to,
            factor = %factor,
            source = %context.source,
            "applied conversion context"
        );
        Ok((Quantity::new(value, target.canonical()), conversion))
    }
}

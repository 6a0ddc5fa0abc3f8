//! Conversion contexts: substance-keyed ratios between dimensions and
//! currency exchange rates. Configured externally; a small set of fuel
//! properties ships as [`ConversionContexts::standard`].

use std::collections::BTreeMap;

use carbonledger_core::Dimension;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const DESNZ_FUEL_PROPERTIES: &str = "UK DESNZ GHG conversion factors 2024, fuel properties";

/// `value` canonical numerator units per canonical denominator unit, e.g.
/// diesel: 0.835 kg per L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionContext {
    pub substance: String,
    pub numerator: Dimension,
    pub denominator: Dimension,
    pub value: Decimal,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// ISO 4217 code.
    pub currency: String,
    pub eur_per_unit: Decimal,
    pub source: String,
}

/// Contexts keyed by lowercased substance and uppercased currency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionContexts {
    contexts: BTreeMap<String, Vec<ConversionContext>>,
    rates: BTreeMap<String, ExchangeRate>,
}

impl ConversionContexts {
    /// Common fuel densities and calorific values (net, per canonical units).
    pub fn standard() -> Self {
        let mut ctx = Self::default();
        let density = |substance: &str, kg_per_l: Decimal| ConversionContext {
            substance: substance.to_string(),
            numerator: Dimension::Mass,
            denominator: Dimension::Volume,
            value: kg_per_l,
            source: DESNZ_FUEL_PROPERTIES.to_string(),
        };
        let calorific = |substance: &str, denominator: Dimension, kwh: Decimal| ConversionContext {
            substance: substance.to_string(),
            numerator: Dimension::Energy,
            denominator,
            value: kwh,
            source: DESNZ_FUEL_PROPERTIES.to_string(),
        };

        ctx.add_context(density("diesel", dec!(0.835)));
        ctx.add_context(density("petrol", dec!(0.745)));
        ctx.add_context(density("gas_oil", dec!(0.845)));
        ctx.add_context(density("kerosene", dec!(0.800)));
        ctx.add_context(density("lpg", dec!(0.510)));
        ctx.add_context(calorific("diesel", Dimension::Volume, dec!(10.0)));
        ctx.add_context(calorific("petrol", Dimension::Volume, dec!(9.1)));
        // 10.55 kWh per m3.
        ctx.add_context(calorific("natural_gas", Dimension::Volume, dec!(0.01055)));
        ctx.add_context(calorific("natural_gas", Dimension::Mass, dec!(13.1)));
        ctx
    }

    /// Add a context, replacing one for the same substance and dimension pair.
    pub fn add_context(&mut self, context: ConversionContext) {
        let entries = self
            .contexts
            .entry(context.substance.to_lowercase())
            .or_default();
        entries.retain(|c| {
            (c.numerator, c.denominator) != (context.numerator, context.denominator)
        });
        entries.push(context);
    }

    pub fn add_rate(&mut self, rate: ExchangeRate) {
        self.rates.insert(rate.currency.to_uppercase(), rate);
    }

    /// Context bridging `from` and `to` for `substance`, in either direction.
    /// A context stated in the requested direction wins.
    pub fn context(&self, substance: &str, from: Dimension, to: Dimension) -> Option<&ConversionContext> {
        let candidates = self.contexts.get(&substance.to_lowercase())?;
        candidates
            .iter()
            .find(|c| c.numerator == to && c.denominator == from)
            .or_else(|| {
                candidates
                    .iter()
                    .find(|c| c.numerator == from && c.denominator == to)
            })
    }

    pub fn rate(&self, currency: &str) -> Option<&ExchangeRate> {
        self.rates.get(&currency.to_uppercase())
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ConversionContext> {
        self.contexts.values().flatten()
    }

    pub fn rates(&self) -> impl Iterator<Item = &ExchangeRate> {
        self.rates.values()
    }

    pub fn context_count(&self) -> usize {
        self.contexts.values().map(Vec::len).sum()
    }

    pub fn rate_count(&self) -> usize {
        self.rates.len()
    }
}

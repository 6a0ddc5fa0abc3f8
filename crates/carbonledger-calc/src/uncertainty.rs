//! Monte Carlo uncertainty on a calculated CO2e value.
//!
//! Activity and factor uncertainty are combined into a single coefficient of
//! variation and propagated through lognormal draws, which keep emissions
//! positive and skew right the way emission inventories do.

use carbonledger_core::{ActivityRecord, EmissionFactor, UncertaintyConfig, UncertaintyResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, warn};

pub const MIN_ITERATIONS: u32 = 100;
pub const MAX_ITERATIONS: u32 = 100_000;

/// √(CVa² + CVf²), both as fractions.
pub fn combined_cv(activity_cv: f64, factor_cv: f64) -> f64 {
    (activity_cv.powi(2) + factor_cv.powi(2)).sqrt()
}

pub fn clamp_iterations(requested: u32) -> u32 {
    let clamped = requested.clamp(MIN_ITERATIONS, MAX_ITERATIONS);
    if clamped != requested {
        warn!(requested, clamped, "uncertainty iterations out of range");
    }
    clamped
}

/// Uncertainty percentages for a record and its factor, falling back to configured defaults.
pub fn input_percentages(
    record: &ActivityRecord,
    factor: &EmissionFactor,
    config: &UncertaintyConfig,
) -> (f64, f64) {
    let activity = record
        .activity_uncertainty_pct
        .and_then(|d| d.to_f64())
        .unwrap_or(config.default_activity_pct);
    let factor = factor
        .uncertainty_pct()
        .and_then(|d| d.to_f64())
        .unwrap_or_else(|| config.default_factor_pct.for_kind(factor.dataset_kind));
    (activity, factor)
}

/// Run the simulation for one calculated value.
pub fn estimate_uncertainty(
    record: &ActivityRecord,
    factor: &EmissionFactor,
    co2e_kg: Decimal,
    config: &UncertaintyConfig,
) -> UncertaintyResult {
    let (activity_pct, factor_pct) = input_percentages(record, factor, config);
    let cv = combined_cv(activity_pct.abs() / 100.0, factor_pct.abs() / 100.0);
    let central = co2e_kg.to_f64().unwrap_or(0.0);
    simulate(central, cv, config.iterations, config.seed)
}

/// Draw `iterations` lognormal samples with mean `central` and coefficient of variation `cv`.
///
/// Negative centrals are simulated on their magnitude and mirrored; zero
/// yields a degenerate all-zero result.
pub fn simulate(central: f64, cv: f64, iterations: u32, seed: Option<u64>) -> UncertaintyResult {
    let iterations = clamp_iterations(iterations);

    if central == 0.0 || !central.is_finite() {
        return UncertaintyResult {
            iterations,
            combined_cv: cv,
            mean: 0.0,
            std_dev: 0.0,
            ci90: (0.0, 0.0),
            ci95: (0.0, 0.0),
        };
    }

    let sign = central.signum();
    let magnitude = central.abs();
    let sigma2 = (1.0 + cv * cv).ln();
    let sigma = sigma2.sqrt();
    let mu = magnitude.ln() - sigma2 / 2.0;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut samples: Vec<f64> = (0..iterations)
        .map(|_| {
            // Box-Muller; 1 - u keeps the log argument in (0, 1].
            let u1: f64 = 1.0 - rng.random::<f64>();
            let u2: f64 = rng.random();
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            (mu + sigma * z).exp()
        })
        .collect();
    samples.sort_by(f64::total_cmp);

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let interval = |lower: f64, upper: f64| {
        let (lo, hi) = (percentile(&samples, lower), percentile(&samples, upper));
        if sign < 0.0 { (-hi, -lo) } else { (lo, hi) }
    };
    let ci90 = interval(0.05, 0.95);
    let ci95 = interval(0.025, 0.975);

    debug!(iterations, cv, mean = sign * mean, std_dev, "uncertainty simulated");

    UncertaintyResult {
        iterations,
        combined_cv: cv,
        mean: sign * mean,
        std_dev,
        ci90,
        ci95,
    }
}

/// Nearest-rank percentile of sorted samples.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

mod display;

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use carbonledger_calc::{
    FactorQuery, FactorUnit, Pipeline, ReferenceData, UnitNormalizer, detect_locale,
    resolve_factor, sanitize_str,
};
use carbonledger_core::{CalcConfig, CanonicalUnit, FactorId, LocaleHint, Scope, emissions};
use carbonledger_store::CalculationLedger;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "carbonledger", version, about = "Activity data to auditable CO2e")]
struct Cli {
    /// Calculation config (TOML). Defaults apply when absent.
    #[arg(long, global = true, env = "CARBONLEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of cards and tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ReferenceArgs {
    /// Emission factor files (.csv, .json, .parquet). Repeatable.
    #[arg(long = "factors", short = 'f', required = true)]
    factors: Vec<PathBuf>,

    /// Conversion contexts and exchange rates (TOML), layered over built-ins.
    #[arg(long)]
    contexts: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Calculate CO2e for every record in an activity CSV.
    Calculate {
        /// Activity records CSV.
        activities: PathBuf,
        #[command(flatten)]
        reference: ReferenceArgs,
        /// Write results to Parquet.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write the append-only ledger to Parquet.
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Run Monte Carlo uncertainty for each result.
        #[arg(long)]
        uncertainty: bool,
        /// Fixed seed for the uncertainty simulation.
        #[arg(long)]
        seed: Option<u64>,
        /// Print a card for every result instead of a table.
        #[arg(long)]
        cards: bool,
    },
    /// Show which factor the waterfall picks for an activity key.
    Resolve {
        #[command(flatten)]
        reference: ReferenceArgs,
        #[arg(long)]
        scope: u8,
        #[arg(long)]
        category: String,
        #[arg(long)]
        activity_type: String,
        #[arg(long)]
        country: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        dataset: Option<String>,
        #[arg(long)]
        specific_factor: Option<String>,
    },
    /// Parse a raw amount the way the pipeline does.
    Sanitize {
        value: String,
        #[arg(long, value_enum, default_value_t = LocaleArg::Auto)]
        locale: LocaleArg,
    },
    /// Load and validate reference data, then report what was loaded.
    CheckReference {
        #[command(flatten)]
        reference: ReferenceArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LocaleArg {
    Us,
    Eu,
    Auto,
}

impl From<LocaleArg> for LocaleHint {
    fn from(arg: LocaleArg) -> Self {
        match arg {
            LocaleArg::Us => LocaleHint::Us,
            LocaleArg::Eu => LocaleHint::Eu,
            LocaleArg::Auto => LocaleHint::Auto,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CalcConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CalcConfig::default(),
    };

    match cli.command {
        Command::Calculate {
            activities,
            reference,
            out,
            ledger,
            uncertainty,
            seed,
            cards,
        } => {
            let mut config = config;
            config.uncertainty.enabled |= uncertainty;
            if seed.is_some() {
                config.uncertainty.seed = seed;
            }
            let reference = load_reference(&reference)?;
            cmd_calculate(
                &activities,
                &reference,
                &config,
                out.as_deref(),
                ledger.as_deref(),
                cli.json,
                cards,
            )
        }
        Command::Resolve {
            reference,
            scope,
            category,
            activity_type,
            country,
            year,
            tenant,
            dataset,
            specific_factor,
        } => {
            let reference = load_reference(&reference)?;
            let scope = Scope::try_from(scope).map_err(anyhow::Error::msg)?;
            let specific = specific_factor.map(FactorId::new);
            let query = FactorQuery {
                tenant_id: tenant.as_deref().unwrap_or_default(),
                scope,
                category: &category,
                activity_type: &activity_type,
                country_code: &country,
                year,
                dataset: dataset.as_deref(),
                specific_factor_id: specific.as_ref(),
                factor_override: None,
                per: CanonicalUnit::Kg,
            };
            let (factor, tier) = resolve_factor(&query, &reference, &config)?;
            if cli.json {
                let out = serde_json::json!({ "tier": tier, "factor": factor });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                display::print_factor_card(&factor, tier);
            }
            Ok(())
        }
        Command::Sanitize { value, locale } => cmd_sanitize(&value, locale.into(), cli.json),
        Command::CheckReference { reference } => {
            let reference = load_reference(&reference)?;
            cmd_check_reference(&reference, cli.json)
        }
    }
}

fn load_reference(args: &ReferenceArgs) -> anyhow::Result<ReferenceData> {
    carbonledger_store::load_reference(&args.factors, args.contexts.as_deref())
        .context("loading reference data")
}

fn cmd_calculate(
    activities: &Path,
    reference: &ReferenceData,
    config: &CalcConfig,
    out: Option<&Path>,
    ledger_path: Option<&Path>,
    json: bool,
    cards: bool,
) -> anyhow::Result<()> {
    let import = carbonledger_store::load_activities(activities)
        .with_context(|| format!("reading {}", activities.display()))?;

    let pipeline = Pipeline::new(reference, config);
    let mut batch = pipeline.process_rows(import.rows());
    batch.extend_failures(import.failures);
    let aggregate = batch.aggregate();

    if let Some(path) = out {
        carbonledger_store::export_results(path, &batch.results)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = ledger_path {
        let mut ledger = CalculationLedger::new();
        ledger.extend(batch.results.iter().cloned());
        carbonledger_store::export_ledger(path, &ledger)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    info!(
        succeeded = aggregate.succeeded,
        failed = aggregate.failed(),
        total_kg = %aggregate.total_kg,
        "calculation complete"
    );

    if json {
        let out = serde_json::json!({ "results": batch.results, "summary": aggregate });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if !batch.results.is_empty() {
        let results = emissions::results_to_batch(&batch.results)?;
        if cards {
            for row in 0..results.num_rows() {
                display::print_result_card(&results, row);
            }
        } else {
            display::print_results_table(&results)?;
            println!();
        }
    }
    display::print_summary(&aggregate);
    Ok(())
}

fn cmd_sanitize(value: &str, locale: LocaleHint, json: bool) -> anyhow::Result<()> {
    let effective = match locale {
        LocaleHint::Auto => detect_locale(value),
        explicit => explicit,
    };
    let parsed = sanitize_str(value, locale);
    if json {
        let out = match &parsed {
            Ok(v) => serde_json::json!({ "input": value, "locale": effective, "value": v.to_string() }),
            Err(e) => serde_json::json!({ "input": value, "locale": effective, "error": e.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    match parsed {
        Ok(v) => {
            println!("  {:<26} {:?}", "input", value);
            println!("  {:<26} {:?}", "locale", effective);
            println!("  {:<26} {}", "value", v);
            Ok(())
        }
        Err(e) => bail!("{e}"),
    }
}

fn cmd_check_reference(reference: &ReferenceData, json: bool) -> anyhow::Result<()> {
    let contexts = reference.contexts();
    // Every factor unit must resolve against the registered units and rates.
    let normalizer = UnitNormalizer::new(contexts);
    let mut unusable = Vec::new();
    for factor in reference.factors() {
        match FactorUnit::parse(&factor.unit) {
            Ok(unit) => {
                if let Err(e) = normalizer.scale(unit.per) {
                    unusable.push((factor.id.to_string(), e.to_string()));
                }
            }
            Err(e) => unusable.push((factor.id.to_string(), e)),
        }
    }

    if json {
        let out = serde_json::json!({
            "factors": reference.len(),
            "datasets": reference.datasets(),
            "contexts": contexts.context_count(),
            "rates": contexts.rate_count(),
            "unusable": unusable
                .iter()
                .map(|(id, reason)| serde_json::json!({ "id": id, "reason": reason }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Reference data");
        println!("  {:<26} {}", "factors", reference.len());
        println!("  {:<26} {}", "datasets", reference.datasets().join(", "));
        println!("  {:<26} {}", "contexts", contexts.context_count());
        println!("  {:<26} {}", "exchange rates", contexts.rate_count());
        for (id, reason) in &unusable {
            println!("  unusable {:<17} {}", id, reason);
        }
    }

    if !unusable.is_empty() {
        bail!("{} factor(s) cannot be applied", unusable.len());
    }
    Ok(())
}

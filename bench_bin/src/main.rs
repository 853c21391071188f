use std::io;
use std::time::{Duration, Instant};

use clap::Parser;
use pgql_core::config::{GroupingConfig, GroupingStrategy, StorageMode};
use pgql_core::expr::ColumnExpr;
use pgql_core::functions::aggregate::{AggregateExpr, AggregateKind};
use pgql_core::grouping::{GroupingEngine, GroupingSpec};
use pgql_core::scalar::{DataType, ScalarValue};
use pgql_core::table::MaterializedTable;
use pgql_error::{DbError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

#[derive(Parser)]
#[clap(name = "bench_grouping")]
struct Arguments {
    /// Number of rows in the generated result table.
    #[clap(long, default_value_t = 1_000_000)]
    rows: usize,
    /// Number of distinct grouping keys.
    #[clap(long, default_value_t = 1000)]
    groups: i64,
    /// Thread counts to run with.
    #[clap(long, value_delimiter = ',', default_value = "1,2,4,8")]
    threads: Vec<usize>,
    /// Only run this strategy.
    #[clap(long)]
    strategy: Option<String>,
    /// Only run this storage mode.
    #[clap(long)]
    storage: Option<String>,
    /// Seed for the generated table.
    #[clap(long, default_value_t = 0)]
    seed: u64,
    /// Runs per configuration, the fastest is reported.
    #[clap(long, default_value_t = 3)]
    iterations: usize,
    /// Emit logs as JSON.
    #[clap(long, env = "PGQL_LOG_JSON")]
    log_json: bool,
}

/// Benchmark every grouping configuration against a synthetic table and check
/// they all agree.
fn main() {
    let args = Arguments::parse();
    let format = if args.log_json {
        logutil::LogFormat::Json
    } else {
        logutil::LogFormat::HumanReadable
    };
    logutil::configure_global_logger(tracing::Level::INFO, format, io::stderr);

    if let Err(err) = inner(args) {
        println!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn inner(args: Arguments) -> Result<()> {
    if args.iterations == 0 {
        return Err(DbError::new("Iterations must be greater than zero"));
    }
    if args.groups <= 0 {
        return Err(DbError::new("Group count must be greater than zero"));
    }

    let strategies = match &args.strategy {
        Some(s) => vec![s.parse::<GroupingStrategy>()?],
        None => GroupingStrategy::ALL.to_vec(),
    };
    let storages = match &args.storage {
        Some(s) => vec![s.parse::<StorageMode>()?],
        None => StorageMode::ALL.to_vec(),
    };

    info!(rows = args.rows, groups = args.groups, seed = args.seed, "generating table");
    let table = generate_table(args.rows, args.groups, args.seed)?;

    let mut baseline = None;
    println!(
        "{:<20} {:<8} {:>8} {:>10} {:>12}",
        "strategy", "storage", "threads", "groups", "time"
    );

    for &strategy in &strategies {
        for &storage in &storages {
            // Storage doesn't change anything for global merge.
            if strategy == GroupingStrategy::GlobalMerge && storage != storages[0] {
                continue;
            }

            for &threads in &args.threads {
                let config = GroupingConfig::new(threads, strategy, storage);
                let mut best = Duration::MAX;
                let mut output = Vec::new();

                for _ in 0..args.iterations {
                    let engine = GroupingEngine::try_new(&config, grouping_spec()?)?;
                    let start = Instant::now();
                    let results = engine.group(&table)?;
                    best = best.min(start.elapsed());
                    output = results.to_sorted_rows();
                }

                println!(
                    "{:<20} {:<8} {:>8} {:>10} {:>12?}",
                    strategy.to_string(),
                    storage.to_string(),
                    threads,
                    output.len(),
                    best
                );

                match &baseline {
                    None => baseline = Some(output),
                    Some(expected) => {
                        if expected != &output {
                            return Err(DbError::new("Grouping output differs from baseline")
                                .with_field("strategy", strategy)
                                .with_field("storage", storage)
                                .with_field("threads", threads));
                        }
                    }
                }
            }
        }
    }

    info!("all configurations produced identical groups");

    Ok(())
}

/// Table of (key: Int64, value: Int64 or null, measure: Float64).
fn generate_table(rows: usize, groups: i64, seed: u64) -> Result<MaterializedTable> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut table = MaterializedTable::empty(3);

    for _ in 0..rows {
        let key = ScalarValue::Int64(rng.random_range(0..groups));
        let value = if rng.random_bool(0.05) {
            ScalarValue::Null
        } else {
            ScalarValue::Int64(rng.random_range(-1_000_000..1_000_000))
        };
        // Quarters keep float sums exact so outputs compare equal.
        let measure = ScalarValue::Float64(rng.random_range(0..4096) as f64 * 0.25);
        table.push_row(vec![key, value, measure])?;
    }

    Ok(table)
}

fn grouping_spec() -> Result<GroupingSpec> {
    let value = ColumnExpr::new(1, DataType::Int64).with_name("value").into_ref();
    let measure = ColumnExpr::new(2, DataType::Float64)
        .with_name("measure")
        .into_ref();

    Ok(GroupingSpec::new(
        vec![ColumnExpr::new(0, DataType::Int64).with_name("key").into_ref()],
        vec![
            AggregateExpr::count_star(),
            AggregateExpr::try_new(AggregateKind::Sum, Some(value.clone()))?,
            AggregateExpr::try_new(AggregateKind::Min, Some(value.clone()))?,
            AggregateExpr::try_new(AggregateKind::Max, Some(value))?,
            AggregateExpr::try_new(AggregateKind::Avg, Some(measure))?,
        ],
    ))
}

use std::path::PathBuf;

use candlestick::CandlestickPlot;
use clap::{Args, Parser, Subcommand};
use common::{config::Settings, plot::Plot, stats::RowFilter};
use default_plots::PlotKind;
use eyre::Result;
use latency_stats::LatencyStats;
use listen_notify::ListenNotify;
use pgbench_overview::PgbenchOverview;
use scaling_analysis::ScalingAnalysis;
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use version_compare::VersionCompare;

mod run;

const MODULES: &[&str] = &[
    "common",
    "pgbench",
    "listen_notify",
    "scaling_analysis",
    "candlestick",
    "latency_stats",
    "version_compare",
    "pgbench_overview",
    "default_plots",
];

#[derive(Parser)]
#[command(version, about = "Parse and analyze pgbench LISTEN/NOTIFY results")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = false)]
    no_progress: bool,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse pgbench result files into per-file and combined CSVs
    Parse {
        #[arg(default_value = pgbench::DEFAULT_RESULTS_DIR)]
        results_dir: PathBuf,
        #[arg(default_value = pgbench::DEFAULT_COMBINED_CSV)]
        combined_csv: PathBuf,
    },
    /// Latency regression against connection count per version
    Scaling {
        #[arg(default_value = scaling_analysis::DEFAULT_INPUT)]
        csv: PathBuf,
        /// Only fit rows with at least this many connections
        #[arg(long)]
        min_connections: Option<f64>,
        /// Label versions as O(1) or O(N)
        #[arg(long, default_value_t = false)]
        classify: bool,
    },
    /// Candlestick chart of latency quartiles per version
    Candlestick {
        #[arg(default_value = candlestick::DEFAULT_INPUT)]
        csv: PathBuf,
        #[arg(default_value = candlestick::DEFAULT_OUTPUT)]
        output: PathBuf,
    },
    /// Latency panels of a single connection sweep
    Stats {
        #[arg(default_value = latency_stats::DEFAULT_INPUT)]
        csv: PathBuf,
        #[arg(default_value = latency_stats::DEFAULT_OUTPUT)]
        output: PathBuf,
    },
    /// TPS comparison of versions against the baseline
    Compare {
        #[arg(default_value = version_compare::DEFAULT_INPUT)]
        csv: PathBuf,
        #[arg(default_value = version_compare::DEFAULT_OUTPUT)]
        output: PathBuf,
    },
    /// Overview grid and markdown summary of the combined pgbench table
    Overview {
        #[arg(default_value = pgbench::DEFAULT_COMBINED_CSV)]
        csv: PathBuf,
    },
    /// Measure LISTEN/NOTIFY round trips against idle listener counts
    Bench(BenchArgs),
    /// Run the analyses listed in a config file
    Run {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: PathBuf,
    },
    /// List the available analyses
    Ls,
}

#[derive(Args)]
struct BenchArgs {
    /// Directory with initdb, pg_ctl and createdb
    pg_bin_dir: Option<PathBuf>,
    #[arg(default_value = listen_notify::DEFAULT_OUTPUT)]
    output: PathBuf,
    /// Version label to record instead of `SELECT version()`
    #[arg(long)]
    version_name: Option<String>,
    /// Server setting passed to every started cluster
    #[arg(long)]
    notify_multicast_threshold: Option<u64>,
    /// Idle listener counts to measure
    #[arg(long, value_delimiter = ',', default_values_t = listen_notify::DEFAULT_CONNECTION_COUNTS.to_vec())]
    connections: Vec<usize>,
    #[arg(long, default_value_t = listen_notify::DEFAULT_MEASUREMENTS)]
    measurements: usize,
    /// Seconds of ping-pong before counting
    #[arg(long, default_value_t = 1)]
    warmup: u64,
    /// Seconds to count round trips for
    #[arg(long, default_value_t = 10)]
    duration: u64,
}

impl From<BenchArgs> for ListenNotify {
    fn from(args: BenchArgs) -> Self {
        ListenNotify {
            pg_bin_dir: args.pg_bin_dir,
            output: args.output,
            version_name: args.version_name,
            notify_multicast_threshold: args.notify_multicast_threshold,
            connection_counts: args.connections,
            measurements: args.measurements,
            warmup_secs: args.warmup,
            duration_secs: args.duration,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("pgbench_analysis={log_level}"));

    if !args.log.is_empty() {
        for log in &args.log {
            env_filter = env_filter.add_directive(log.parse()?);
        }
    }

    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    if let Err(err) = execute(args).await {
        error!("{err:#?}");
        return Err(err);
    }
    Ok(())
}

async fn execute(args: Cli) -> Result<()> {
    let settings = Settings::default();
    let progress = !args.no_progress;

    match args.command {
        Commands::Parse {
            results_dir,
            combined_csv,
        } => {
            let settings = Settings {
                combined_csv,
                ..settings
            };
            run::parse_results(&settings, &results_dir, progress)?;
        }
        Commands::Scaling {
            csv,
            min_connections,
            classify,
        } => ScalingAnalysis {
            input: csv,
            filter: min_connections.map_or(RowFilter::All, RowFilter::MinConnections),
            classify,
            ..Default::default()
        }
        .plot(&settings)?,
        Commands::Candlestick { csv, output } => CandlestickPlot {
            input: csv,
            output,
            ..Default::default()
        }
        .plot(&settings)?,
        Commands::Stats { csv, output } => LatencyStats { input: csv, output }.plot(&settings)?,
        Commands::Compare { csv, output } => VersionCompare {
            input: csv,
            output,
            ..Default::default()
        }
        .plot(&settings)?,
        Commands::Overview { csv } => PgbenchOverview {
            input: Some(csv),
            ..Default::default()
        }
        .plot(&settings)?,
        Commands::Bench(bench) => {
            ListenNotify::from(bench).run().await?;
        }
        Commands::Run { config_file } => {
            let config = run::load_config(&config_file)?;
            run::run_config(&config, progress)?;
        }
        Commands::Ls => {
            for kind in PlotKind::ALL {
                println!("{} ({kind:?}) -> {}", kind.name(), kind.description());
            }
        }
    };

    Ok(())
}

//! CLI for splitcheck — clean an A/B test log and test the conversion difference.

mod commands;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "splitcheck")]
#[command(about = "splitcheck — clean an A/B test log and test the conversion difference")]
#[command(version = splitcheck_core::VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter the log, aggregate by condition and run the two-proportion test
    Analyze {
        /// CSV file with one observation per row
        input: String,

        /// JSON analysis config (column names, labels, policy, test settings)
        #[arg(long)]
        config: Option<String>,

        /// Confidence level for every interval
        #[arg(long)]
        confidence: Option<f64>,

        /// Two-tailed significance threshold
        #[arg(long)]
        alpha: Option<f64>,

        /// Disable the Yates continuity correction
        #[arg(long)]
        no_correction: bool,

        /// What to do with subjects observed more than once
        #[arg(long, value_parser = ["drop", "keep-first", "reject"])]
        policy: Option<String>,

        /// Drop rows whose page contradicts their condition instead of failing
        #[arg(long)]
        lenient: bool,

        /// Compare multi-observation subjects with clean subjects
        #[arg(long)]
        confound: bool,

        /// Also simulate this many null experiments for an empirical p-value
        #[arg(long)]
        simulate: Option<usize>,

        /// Seed for --simulate
        #[arg(long)]
        seed: Option<u64>,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<String>,
    },

    /// Data-quality view: multi-observation subjects and condition x page tables
    Inspect {
        /// CSV file with one observation per row
        input: String,

        /// JSON analysis config (column names and labels are used)
        #[arg(long)]
        config: Option<String>,

        /// Number of multi-observation subjects to list
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Run the two-proportion test on raw counts
    Test {
        /// Control trials
        #[arg(long)]
        control_n: u64,

        /// Control conversions
        #[arg(long)]
        control_x: u64,

        /// Treatment trials
        #[arg(long)]
        treatment_n: u64,

        /// Treatment conversions
        #[arg(long)]
        treatment_x: u64,

        /// Confidence level for every interval
        #[arg(long, default_value = "0.95")]
        confidence: f64,

        /// Two-tailed significance threshold
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Disable the Yates continuity correction
        #[arg(long)]
        no_correction: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Analyze {
            input,
            config,
            confidence,
            alpha,
            no_correction,
            policy,
            lenient,
            confound,
            simulate,
            seed,
            output,
        } => commands::analyze::run(commands::analyze::AnalyzeCommandConfig {
            input: &input,
            config_path: config.as_deref(),
            confidence,
            alpha,
            no_correction,
            policy: policy.as_deref(),
            lenient,
            confound,
            simulate,
            seed,
            output_path: output.as_deref(),
        }),
        Commands::Inspect {
            input,
            config,
            limit,
        } => commands::inspect::run(&input, config.as_deref(), limit),
        Commands::Test {
            control_n,
            control_x,
            treatment_n,
            treatment_x,
            confidence,
            alpha,
            no_correction,
        } => commands::test::run(
            (control_n, control_x),
            (treatment_n, treatment_x),
            confidence,
            alpha,
            no_correction,
        ),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

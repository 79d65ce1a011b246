use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use recruitment_pipeline_projection::models::{ConversionRateTable, ProjectionResult};
use recruitment_pipeline_projection::report::{self, Rounding, Summary};
use recruitment_pipeline_projection::{ingest, session, Session, StageList};

#[derive(Parser)]
#[command(name = "pipeline-projection")]
#[command(about = "Project recruitment pipeline volumes from historical funnel data", long_about = None)]
struct Cli {
    /// Ordered stage names, earliest first
    #[arg(long, global = true, env = "PIPELINE_STAGES", value_delimiter = ',')]
    stages: Option<Vec<String>>,
    /// Number of stages; with --stages it must match the names given, without
    /// it the default list is resized with "Stage N" placeholders
    #[arg(long, global = true)]
    stage_count: Option<usize>,
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct DataArgs {
    /// Historical CSV with a Year column and one column per stage ("-" for stdin)
    #[arg(long)]
    data: PathBuf,
}

#[derive(Args)]
struct TargetArgs {
    /// Number of candidates wanted at the final stage
    #[arg(long, default_value_t = session::DEFAULT_TARGET_HIRES)]
    target: f64,
    #[arg(long, value_enum, default_value_t = Rounding::Ceil)]
    rounding: Rounding,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective stage list
    Stages,
    /// Write an empty historical data file with the expected columns
    Template {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compute average conversion rates from historical data
    Rates {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Project required volumes per stage for a hire target
    Project {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        target: TargetArgs,
        /// Export rates and projection to one CSV file
        #[arg(long, conflicts_with_all = ["rates_out", "projection_out"])]
        out: Option<PathBuf>,
        /// Export conversion rates to their own CSV file
        #[arg(long, requires = "projection_out")]
        rates_out: Option<PathBuf>,
        /// Export the projection to its own CSV file
        #[arg(long, requires = "rates_out")]
        projection_out: Option<PathBuf>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, default_value = "projection-report.md")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(&cli.log_level))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let stages = resolve_stages(cli.stages.as_deref(), cli.stage_count)?;
    debug!(stages = %stages, "stage list resolved");

    match cli.command {
        Commands::Stages => match cli.format {
            OutputFormat::Text => {
                for (index, name) in stages.names().iter().enumerate() {
                    println!("{}. {}", index + 1, name);
                }
            }
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(stages.names())?),
        },
        Commands::Template { out } => match out {
            Some(path) => {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                ingest::write_template(file, &stages)?;
                println!("Template written to {}.", path.display());
            }
            None => ingest::write_template(std::io::stdout().lock(), &stages)?,
        },
        Commands::Rates { data } => {
            let mut session = load_session(stages, &data.data)?;
            session.compute_rates()?;
            let rates = session.rates().context("conversion rates are not computed")?;
            match cli.format {
                OutputFormat::Text => print!("{}", report::format_rates(rates)),
                OutputFormat::Json => {
                    let summary = Summary {
                        stages: session_stages(&session)?.names(),
                        rounding: Rounding::Exact,
                        rates,
                        projection: None,
                    };
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }
        }
        Commands::Project {
            data,
            target,
            out,
            rates_out,
            projection_out,
        } => {
            let mut session = load_session(stages, &data.data)?;
            session.compute_rates()?;
            session.set_target(target.target)?;
            session.project()?;
            info!(state = %session.state(), "session ready");

            let (rates, projection) = derived(&session)?;
            match cli.format {
                OutputFormat::Text => {
                    print!("{}", report::format_rates(rates));
                    println!();
                    print!("{}", report::format_projection(projection, target.rounding));
                }
                OutputFormat::Json => {
                    let summary = Summary {
                        stages: session_stages(&session)?.names(),
                        rounding: target.rounding,
                        rates,
                        projection: Some(projection),
                    };
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
            }

            if let Some(path) = out {
                report::export_combined(&path, rates, projection, target.rounding)
                    .with_context(|| format!("failed to export {}", path.display()))?;
                eprintln!("Projection written to {}.", path.display());
            } else if let (Some(rates_path), Some(projection_path)) = (rates_out, projection_out) {
                report::export_split(
                    &rates_path,
                    &projection_path,
                    rates,
                    projection,
                    target.rounding,
                )
                .context("failed to export projection")?;
                eprintln!(
                    "Rates written to {}, projection written to {}.",
                    rates_path.display(),
                    projection_path.display()
                );
            }
        }
        Commands::Report { data, target, out } => {
            let mut session = load_session(stages, &data.data)?;
            session.compute_rates()?;
            session.set_target(target.target)?;
            session.project()?;

            let (rates, projection) = derived(&session)?;
            let dataset = session
                .dataset()
                .context("historical data is no longer loaded")?;
            let report = report::build_report(
                session_stages(&session)?,
                dataset,
                rates,
                projection,
                target.rounding,
                chrono::Utc::now(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Applies `level` to both the library and the binary targets.
fn default_filter(level: &str) -> String {
    format!(
        "{}={level},{}={level}",
        env!("CARGO_PKG_NAME").replace('-', "_"),
        env!("CARGO_CRATE_NAME")
    )
}

fn resolve_stages(names: Option<&[String]>, count: Option<usize>) -> anyhow::Result<StageList> {
    let stages = match (names, count) {
        (Some(names), Some(count)) => StageList::with_count(count, names)?,
        (Some(names), None) => StageList::new(names)?,
        (None, Some(count)) => StageList::default().resize(count)?,
        (None, None) => StageList::default(),
    };
    Ok(stages)
}

fn load_session(stages: StageList, data: &Path) -> anyhow::Result<Session> {
    if data == Path::new("-") {
        let mut input = Vec::new();
        std::io::stdin()
            .read_to_end(&mut input)
            .context("failed to read historical data from stdin")?;
        let mut session = Session::new(stages);
        session.load_csv(input.as_slice())?;
        return Ok(session);
    }

    let dataset = ingest::load_csv_path(data, &stages)
        .with_context(|| format!("failed to load {}", data.display()))?;
    let mut session = Session::new(stages);
    session.load_data(dataset)?;
    Ok(session)
}

fn session_stages(session: &Session) -> anyhow::Result<&StageList> {
    session.stages().context("no stages configured")
}

fn derived(session: &Session) -> anyhow::Result<(&ConversionRateTable, &ProjectionResult)> {
    let rates = session.rates().context("conversion rates are not computed")?;
    let projection = session.projection().context("projection is not computed")?;
    Ok((rates, projection))
}

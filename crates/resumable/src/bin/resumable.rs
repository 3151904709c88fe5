use clap::{Arg, Command};
use colored::Colorize;
use resumable::config::Config;
use resumable::error::ResumeError;
use resumable::harness::{Harness, Outcome, Verdict, catalog};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let matches = Command::new("resumable")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Runs the resume scenario catalog")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("NAME")
                .help("Run a single catalog scenario"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Log the summary as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Reduce log output")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    dotenvy::dotenv().ok();

    init_logging(&matches)?;

    let config = load_configuration(&matches)?;

    let scenarios = match matches.get_one::<String>("scenario") {
        Some(name) => match catalog::find(name) {
            Some(scenario) => vec![scenario],
            None => {
                error!("Unknown scenario: {}", name);
                return Ok(ExitCode::from(2));
            }
        },
        None => catalog::all(),
    };

    let summary = Harness::new(&config).run_all(&scenarios).await;

    for outcome in &summary.results {
        report(outcome);
    }

    if matches.get_flag("json") {
        info!("{}", serde_json::to_string_pretty(&summary)?);
    }

    let totals = format!("{} passed, {} failed", summary.passed, summary.failed);
    if summary.all_passed() {
        info!("{}", totals.green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{}", totals.red().bold());
        Ok(ExitCode::FAILURE)
    }
}

fn report(outcome: &Outcome) {
    let states = outcome
        .boundaries
        .iter()
        .map(|boundary| format!("{}={}", boundary.id, boundary.final_state))
        .collect::<Vec<_>>()
        .join(", ");

    match &outcome.verdict {
        Verdict::Pass => info!("{} {} [{}]", "PASS".green(), outcome.scenario, states),
        Verdict::Fail { reasons } => {
            error!("{} {} [{}]", "FAIL".red(), outcome.scenario, states);
            for reason in reasons {
                error!("  {}", reason);
            }
        }
    }
}

#[allow(clippy::result_large_err)]
fn init_logging(matches: &clap::ArgMatches) -> Result<(), ResumeError> {
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_env("RESUMABLE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(format!("resumable={default_level}")))
        .map_err(|e| ResumeError::configuration(format!("Failed to create log filter: {e}")))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(verbose)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(verbose)
                .with_line_number(verbose)
                .compact(),
        )
        .init();

    Ok(())
}

#[allow(clippy::result_large_err)]
fn load_configuration(matches: &clap::ArgMatches) -> Result<Config, ResumeError> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)
            .map_err(|e| ResumeError::configuration(format!("Failed to load {path}: {e}")))?,
        None => Config::default(),
    };

    config
        .apply_overrides(|key| std::env::var(key).ok())
        .map_err(|e| ResumeError::configuration(e.to_string()))?;

    config.validate().map_err(|e| ResumeError::configuration(e.to_string()))?;

    info!(
        "Scenario timeout {}ms, initial pass {}ms",
        config.harness.scenario_timeout_ms, config.harness.initial_pass_ms
    );

    Ok(config)
}

//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::vector_sim::VectorSimulator;
use crate::domain::error::{CompileError, OptitraderError};
use crate::domain::pipeline::run_study;
use crate::domain::request::{StudyPlan, StudyRequest};
use crate::domain::settings::EngineSettings;

#[derive(Parser, Debug)]
#[command(name = "optitrader", about = "Trading strategy parameter optimizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a parameter study and write the JSON response
    Optimize {
        #[arg(short, long)]
        request: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a study request without fetching data
    Validate {
        #[arg(short, long)]
        request: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Optimize {
            request,
            config,
            data_dir,
            output,
            seed,
        } => run_optimize(
            &request,
            config.as_deref(),
            data_dir.as_deref(),
            output.as_deref(),
            seed,
        ),
        Command::Validate { request, config } => run_validate(&request, config.as_deref()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            (&e).into()
        }
    }
}

fn report_error(err: &OptitraderError) {
    if let OptitraderError::Compile { pair, side, source } = err {
        if let CompileError::InvalidExpression { expression, .. } = source {
            eprintln!(
                "error: trigger pair '{pair}' {side}:\n{}",
                source.display_with_context(expression)
            );
            return;
        }
    }
    eprintln!("error: {err}");
}

/// Engine settings from `path`, or defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> Result<EngineSettings, OptitraderError> {
    let adapter = match path {
        Some(p) => {
            eprintln!("Loading config from {}", p.display());
            FileConfigAdapter::from_file(p)?
        }
        None => FileConfigAdapter::empty(),
    };
    EngineSettings::from_config(&adapter)
}

pub fn load_request(path: &Path) -> Result<StudyRequest, OptitraderError> {
    let text = fs::read_to_string(path)?;
    StudyRequest::from_json(&text)
}

fn run_optimize(
    request_path: &Path,
    config_path: Option<&Path>,
    data_dir: Option<&Path>,
    output_path: Option<&Path>,
    seed: Option<u64>,
) -> Result<(), OptitraderError> {
    // Stage 1: Settings
    let mut settings = load_settings(config_path)?;
    if let Some(dir) = data_dir {
        settings.data_dir = dir.to_path_buf();
    }
    if let Some(seed) = seed {
        settings.seed = seed;
    }

    // Stage 2: Request
    eprintln!("Loading request from {}", request_path.display());
    let request = load_request(request_path)?;

    // Stage 3: Study
    let data = CsvAdapter::new(settings.data_dir.clone());
    let simulator = VectorSimulator::default();
    let response = run_study(&request, &data, &simulator, &settings)?;

    // Stage 4: Output
    let json = serde_json::to_string_pretty(&response)?;
    match output_path {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("Response written to {}", path.display());
        }
        None => println!("{json}"),
    }
    eprint!("{}", response.summary());
    Ok(())
}

fn run_validate(request_path: &Path, config_path: Option<&Path>) -> Result<(), OptitraderError> {
    let settings = load_settings(config_path)?;
    eprintln!("Validating request: {}", request_path.display());
    let request = load_request(request_path)?;
    let plan = request.validate(&settings.limits, &settings.cross_validation)?;
    print_plan(&plan);
    Ok(())
}

fn print_plan(plan: &StudyPlan) {
    eprintln!("\nSymbol:     {}", plan.symbol);
    eprintln!("Period:     {} .. {} (UTC)", plan.start, plan.end);
    eprintln!("Objective:  {}", plan.strategy.objective);
    eprintln!("Trials:     {}", plan.n_trials);
    if plan.cross_validation {
        eprintln!(
            "Folds:      {} (split {:.2})",
            plan.n_folds, plan.split_fraction
        );
    }

    eprintln!("\nIndicators:");
    for ind in &plan.strategy.indicators {
        eprintln!("  {} = {} @ {}", ind.alias, ind.kind, ind.timeframe);
    }

    eprintln!("\nTrigger pairs:");
    for pair in &plan.strategy.pairs {
        eprintln!("  {}", pair.alias);
        eprintln!("    entry: {}", pair.entry.source());
        eprintln!("    exit:  {}", pair.exit.source());
    }

    eprintln!("\nParameters:");
    for (name, spec) in plan.space.iter() {
        if spec.is_fixed() {
            eprintln!("  {name} = {}", spec.low());
        } else {
            eprintln!("  {name} in [{}, {}]", spec.low(), spec.high());
        }
    }
    eprintln!("\nRequest is valid.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optimize_args() {
        let cli = Cli::try_parse_from([
            "optitrader",
            "optimize",
            "--request",
            "req.json",
            "--data-dir",
            "bars",
            "--seed",
            "7",
        ])
        .unwrap();
        match cli.command {
            Command::Optimize {
                request,
                data_dir,
                seed,
                config,
                output,
            } => {
                assert_eq!(request, PathBuf::from("req.json"));
                assert_eq!(data_dir, Some(PathBuf::from("bars")));
                assert_eq!(seed, Some(7));
                assert!(config.is_none());
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn validate_requires_request() {
        assert!(Cli::try_parse_from(["optitrader", "validate"]).is_err());
    }

    #[test]
    fn default_settings_without_config() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings, EngineSettings::default());
    }
}

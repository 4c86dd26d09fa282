// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use cod_cli::run_bundle;
use cod_core::CodError;
use cod_pipeline::{AnalysisConfig, AnalysisReport, InMemoryProvider};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cod", version, about = "Cause-of-death panel analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Integrate, normalize, correlate, decompose and cluster a table bundle.
    Run(RunArgs),
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// JSON bundle: {"primary": table, "covariates": [table, ...]}.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// JSON analysis config; defaults apply to anything omitted.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Write the report here instead of stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Debug)]
enum CliError {
    Cod(CodError),
    Io {
        context: String,
        source: std::io::Error,
    },
    Json {
        context: String,
        source: serde_json::Error,
    },
}

impl CliError {
    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Cod(CodError::DataIntegrity(_)) => "data_integrity",
            Self::Cod(CodError::InvalidInput(_)) => "invalid_input",
            Self::Cod(CodError::NumericalIssue(_)) => "numerical_issue",
            Self::Io { .. } => "io_error",
            Self::Json { .. } => "json_error",
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cod(err) => write!(f, "{err}"),
            Self::Io { context, source } => write!(f, "{context}: {source}"),
            Self::Json { context, source } => write!(f, "{context}: {source}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cod(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<CodError> for CliError {
    fn from(value: CodError) -> Self {
        Self::Cod(value)
    }
}

#[derive(Serialize)]
struct RunOutput<'a> {
    command: &'static str,
    input: String,
    config: &'a AnalysisConfig,
    report: &'a AnalysisReport,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: &'static str,
    message: String,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => handle_run(args),
    };
    if let Err(err) = result {
        emit_structured_error(&err);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_run(args: RunArgs) -> Result<(), CliError> {
    let bundle = InMemoryProvider::from_json_str(&read_file(&args.input)?)?;
    let config = match args.config.as_deref() {
        Some(path) => AnalysisConfig::from_json_str(&read_file(path)?)?,
        None => AnalysisConfig::default(),
    };
    tracing::info!(
        input = %args.input.display(),
        covariates = bundle.covariates.len(),
        "starting analysis"
    );
    let report = run_bundle(&bundle, &config)?;

    write_json_output(
        &RunOutput {
            command: "run",
            input: args.input.display().to_string(),
            config: &config,
            report: &report,
        },
        args.output.as_deref(),
    )
}

fn read_file(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path)
        .map_err(|source| CliError::io(format!("failed to read '{}'", path.display()), source))
}

/// Streams `payload` as pretty JSON followed by a newline.
fn write_json<T: Serialize, W: Write>(payload: &T, writer: W) -> Result<(), CliError> {
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, payload)
        .map_err(|source| CliError::json("failed to encode JSON", source))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|source| CliError::io("failed to flush JSON output", source))
}

fn write_json_output<T: Serialize>(payload: &T, output_path: Option<&Path>) -> Result<(), CliError> {
    match output_path {
        Some(path) => {
            let file = File::create(path).map_err(|source| {
                CliError::io(format!("failed to create '{}'", path.display()), source)
            })?;
            write_json(payload, file)?;
            tracing::info!(output = %path.display(), "report written");
            Ok(())
        }
        None => write_json(payload, io::stdout().lock()),
    }
}

fn emit_structured_error(err: &CliError) {
    tracing::error!(code = err.code(), error = %err, "analysis failed");
    let envelope = ErrorEnvelope {
        error: ErrorPayload {
            code: err.code(),
            message: err.to_string(),
        },
    };
    if write_json(&envelope, io::stderr().lock()).is_err() {
        eprintln!("{}: {err}", err.code());
    }
}

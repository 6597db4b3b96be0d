// jsonata - command line front end for jsonata-eval
// Reads a JSON document from a file or stdin and prints the result

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indexmap::IndexMap;
use jsonata_eval::{EvalOptions, Error, JValue, JsonFormat, JsonataExpression};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "jsonata")]
#[command(about = "Evaluate a JSONata expression against a JSON document")]
#[command(version)]
struct Cli {
    /// The JSONata expression to evaluate
    expression: String,

    /// JSON input file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Pretty-print the output
    #[arg(short, long)]
    pretty: bool,

    /// Variables to bind, as a JSON object, e.g. '{"rate": 0.2}'
    #[arg(short, long, value_name = "JSON")]
    bindings: Option<String>,

    /// Maximum evaluation depth
    #[arg(long, value_name = "N", env = "JSONATA_MAX_DEPTH")]
    max_depth: Option<usize>,

    /// Print the parsed expression tree instead of evaluating
    #[arg(long)]
    ast: bool,

    /// Log evaluation steps to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Jsonata(#[from] Error),

    #[error("Failed to read input: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid bindings: {0}")]
    Bindings(String),

    #[error("Failed to write the expression tree: {0}")]
    AstDump(serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: &Cli) -> Result<String, CliError> {
    let mut options = EvalOptions::default();
    if let Some(max_depth) = cli.max_depth {
        options.max_depth = max_depth;
    }
    let expr = JsonataExpression::compile(&cli.expression)?.with_options(options);

    if cli.ast {
        return serde_json::to_string_pretty(expr.ast()).map_err(CliError::AstDump);
    }

    let input = read_input(cli.input.as_ref())?;
    let bindings = parse_bindings(cli.bindings.as_deref())?;
    debug!(bytes = input.len(), bindings = bindings.len(), "read input");

    let format = if cli.pretty {
        JsonFormat::PRETTY
    } else {
        JsonFormat::COMPACT
    };
    let document = jsonata_eval::parse_input(&input)?;
    let result = expr.evaluate_value(&document, &bindings)?;
    Ok(result
        .to_json(format)
        .unwrap_or_else(|| jsonata_eval::UNDEFINED.to_string()))
}

fn read_input(path: Option<&PathBuf>) -> Result<String, CliError> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None if !io::stdin().is_terminal() => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        None => Ok(String::new()),
    }
}

fn parse_bindings(text: Option<&str>) -> Result<IndexMap<String, JValue>, CliError> {
    let text = match text {
        Some(text) => text,
        None => return Ok(IndexMap::new()),
    };
    match JValue::from_json_str(text) {
        Ok(JValue::Object(map)) => Ok(map.as_ref().clone()),
        Ok(_) => Err(CliError::Bindings("expected a JSON object".to_string())),
        Err(e) => Err(CliError::Bindings(e.to_string())),
    }
}

use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::Level;

use validate_rng::cli::{Cli, Command, VerbosityLevel};
use validate_rng::config::{Config, ConfigManager};
use validate_rng::driver::{run_check, run_script};
use validate_rng::engine::SchemaSyntax;
use validate_rng::libxml2::LibXml2Engine;
use validate_rng::output::Output;
use validate_rng::session::Session;

fn init_tracing(verbosity: VerbosityLevel) {
    let level = match verbosity {
        VerbosityLevel::Quiet => Level::ERROR,
        VerbosityLevel::Normal => Level::WARN,
        VerbosityLevel::Verbose => Level::DEBUG,
    };
    // A subscriber may already be installed by an embedding test harness
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn verbosity(config: &Config) -> VerbosityLevel {
    if config.output.quiet {
        VerbosityLevel::Quiet
    } else if config.output.verbose {
        VerbosityLevel::Verbose
    } else {
        VerbosityLevel::Normal
    }
}

fn run(cli: Cli) -> Result<bool> {
    let config = ConfigManager::load_config(&cli).context("Failed to load configuration")?;
    let verbosity = verbosity(&config);
    init_tracing(verbosity);
    tracing::debug!(?config, "configuration loaded");

    let output = Output::new(config.output.format.into(), verbosity);
    let mut session = Session::with_capacity(LibXml2Engine::new(), config.session.buffer_size)
        .context("Failed to create session")?
        .with_limits(config.input_limits());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Command::Script { file: Some(path) } => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open script '{}'", path.display()))?;
            run_script(&mut session, BufReader::new(file), &mut out, &output)?;
            Ok(true)
        }
        Command::Script { file: None } => {
            run_script(&mut session, io::stdin().lock(), &mut out, &output)?;
            Ok(true)
        }
        Command::Check {
            schema,
            files,
            compact,
            xml,
        } => {
            let syntax = if *compact {
                SchemaSyntax::Compact
            } else if *xml {
                SchemaSyntax::Xml
            } else {
                SchemaSyntax::from_path(schema)
            };
            run_check(&mut session, schema, files, syntax, &mut out, &output)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("validate-rng: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

//! Command drivers behind the `validate-rng` binary
//!
//! `script` replays line-oriented session commands, running each one with
//! the session reading the file and again with the file's bytes in memory.
//! `check` validates a list of documents against one schema.

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

use crate::diagnostics::DiagnosticRecord;
use crate::engine::{SchemaEngine, SchemaSyntax};
use crate::error::{Outcome, Status};
use crate::input::Source;
use crate::output::{FileReport, Output, RunMode, RunReport};
use crate::session::Session;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScriptError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// One line of a session script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    Load {
        name: String,
        path: PathBuf,
        compact: bool,
    },
    Unload {
        name: String,
    },
    Validate {
        name: String,
        path: PathBuf,
    },
}

impl FromStr for ScriptCommand {
    type Err = ScriptError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let argv: Vec<&str> = line.split_whitespace().collect();
        match argv.as_slice() {
            ["load", name, path, compact] => Ok(ScriptCommand::Load {
                name: name.to_string(),
                path: PathBuf::from(path),
                compact: *compact != "0",
            }),
            ["load", ..] => Err(ScriptError::Usage("load NAME PATH COMPACT")),
            ["unload", name] => Ok(ScriptCommand::Unload {
                name: name.to_string(),
            }),
            ["unload", ..] => Err(ScriptError::Usage("unload NAME")),
            ["validate", name, path] => Ok(ScriptCommand::Validate {
                name: name.to_string(),
                path: PathBuf::from(path),
            }),
            ["validate", ..] => Err(ScriptError::Usage("validate NAME PATH")),
            [other, ..] => Err(ScriptError::UnknownCommand(other.to_string())),
            [] => Err(ScriptError::Usage("COMMAND ARGS...")),
        }
    }
}

impl ScriptCommand {
    /// Input file of the command, if it takes one
    pub fn path(&self) -> Option<&Path> {
        match self {
            ScriptCommand::Load { path, .. } | ScriptCommand::Validate { path, .. } => Some(path),
            ScriptCommand::Unload { .. } => None,
        }
    }

    /// Run against `session`, reading from `bytes` when given instead of
    /// the command's file.
    pub fn run<E: SchemaEngine>(&self, session: &mut Session<E>, bytes: Option<&[u8]>) -> Outcome {
        fn source<'a>(path: &'a Path, bytes: Option<&'a [u8]>) -> Source<'a> {
            bytes.map_or(Source::Path(path), Source::Bytes)
        }
        match self {
            ScriptCommand::Load {
                name,
                path,
                compact,
            } => session.load_schema(
                name,
                source(path, bytes),
                SchemaSyntax::from_compact(*compact),
            ),
            ScriptCommand::Unload { name } => session.unload_schema(name),
            ScriptCommand::Validate { name, path } => session.validate(name, source(path, bytes)),
        }
    }
}

/// Totals of a script run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub runs: usize,
    pub failures: usize,
}

fn report<E: SchemaEngine>(session: &Session<E>, argv: &[&str], mode: RunMode, outcome: Outcome) -> RunReport {
    let records = if outcome.has_diagnostics() {
        session.records().unwrap_or_default()
    } else {
        Vec::new()
    };
    RunReport {
        argv: argv.iter().map(|arg| arg.to_string()).collect(),
        mode,
        status: outcome.raw(),
        text: session.output_text(),
        records,
    }
}

fn emit(out: &mut impl Write, output: &Output, report: &RunReport) -> Result<()> {
    if let Some(text) = output.format_run(report) {
        writeln!(out, "{}", text)?;
    }
    Ok(())
}

/// Execute every command of `input`, writing one report per run to `out`.
pub fn run_script<E: SchemaEngine>(
    session: &mut Session<E>,
    input: impl BufRead,
    out: &mut impl Write,
    output: &Output,
) -> Result<ScriptSummary> {
    let mut summary = ScriptSummary::default();

    for line in input.lines() {
        let line = line.context("Failed to read script")?;
        let argv: Vec<&str> = line.split_whitespace().collect();
        if argv.is_empty() {
            continue;
        }

        let command = match line.parse::<ScriptCommand>() {
            Ok(command) => command,
            Err(err) => {
                debug!(%line, error = %err, "rejecting script line");
                summary.runs += 1;
                summary.failures += 1;
                let report = RunReport {
                    argv: argv.iter().map(|arg| arg.to_string()).collect(),
                    mode: RunMode::File,
                    status: Status::API_ERROR,
                    text: err.to_string(),
                    records: Vec::new(),
                };
                emit(out, output, &report)?;
                continue;
            }
        };

        let outcome = command.run(session, None);
        let path_report = report(session, &argv, RunMode::File, outcome);
        summary.runs += 1;
        if path_report.status < 0 {
            summary.failures += 1;
        }
        emit(out, output, &path_report)?;

        // Same command again with the bytes in memory, when there is a file
        let Some(path) = command.path().filter(|path| path.is_file()) else {
            continue;
        };
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "skipping buffer run");
                continue;
            }
        };
        let outcome = command.run(session, Some(&bytes));
        let buffer_report = report(session, &argv, RunMode::Buffer, outcome);
        summary.runs += 1;
        if buffer_report.status < 0 {
            summary.failures += 1;
        }
        emit(out, output, &buffer_report)?;
    }

    info!(runs = summary.runs, failures = summary.failures, "script finished");
    Ok(summary)
}

/// Name the checked schema is registered under
const CHECK_SCHEMA: &str = "schema";

/// Split an operation's output into records and the failure text that
/// follows them.
fn split_output(text: &str) -> (Vec<DiagnosticRecord>, Option<String>) {
    let mut records = Vec::new();
    let mut rest = Vec::new();
    for line in text.lines().filter(|line| !line.is_empty()) {
        match line.parse::<DiagnosticRecord>() {
            Ok(record) if rest.is_empty() => records.push(record),
            _ => rest.push(line),
        }
    }
    let message = (!rest.is_empty()).then(|| rest.join(" "));
    (records, message)
}

fn file_report<E: SchemaEngine>(session: &Session<E>, file: &Path, outcome: Outcome) -> FileReport {
    let (records, message) = match outcome.status {
        Status::Ok | Status::EngineError => split_output(&session.output_text()),
        _ => (Vec::new(), Some(session.output_text())),
    };
    FileReport {
        file: file.display().to_string(),
        status: outcome.raw(),
        records,
        message,
    }
}

/// Load `schema` and validate every file against it. Returns whether the
/// schema loaded and no file has errors.
pub fn run_check<E: SchemaEngine>(
    session: &mut Session<E>,
    schema: &Path,
    files: &[PathBuf],
    syntax: SchemaSyntax,
    out: &mut impl Write,
    output: &Output,
) -> Result<bool> {
    let outcome = session.load_schema(CHECK_SCHEMA, Source::Path(schema), syntax);
    let schema_report = file_report(session, schema, outcome);
    if !session.is_loaded(CHECK_SCHEMA) {
        if matches!(outcome.status, Status::Ok | Status::EngineError) {
            if let Some(text) = output.format_file(&schema_report) {
                writeln!(out, "{}", text)?;
            }
            anyhow::bail!("invalid schema '{}'", schema.display());
        }
        anyhow::bail!("{}", session.output_text());
    }
    if let Some(text) = output.format_file(&schema_report) {
        writeln!(out, "{}", text)?;
    }

    let mut ok = true;
    for file in files {
        let outcome = session.validate(CHECK_SCHEMA, Source::Path(file));
        let report = file_report(session, file, outcome);
        if report.has_errors() {
            ok = false;
        }
        if let Some(text) = output.format_file(&report) {
            writeln!(out, "{}", text)?;
        }
    }
    Ok(ok)
}

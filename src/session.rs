//! Validation sessions
//!
//! A [`Session`] owns a schema engine, the schemas compiled so far and the
//! caller's output region. Every operation starts a fresh write sequence in
//! that region and ends with an [`Outcome`]; failures never escape as errors.

use std::path::Path;

use tracing::debug;

use crate::diagnostics::{DiagnosticAccumulator, DiagnosticRecord, RecordParseError};
use crate::engine::{InputSource, SchemaEngine, SchemaSyntax};
use crate::error::{Outcome, SessionError, SessionResult};
use crate::input::{InputLimits, Source};
use crate::reader::PositionReader;
use crate::registry::SchemaRegistry;

pub struct Session<E: SchemaEngine, B = Vec<u8>> {
    engine: E,
    registry: SchemaRegistry<E::Schema>,
    diagnostics: DiagnosticAccumulator<B>,
    limits: InputLimits,
}

impl<E: SchemaEngine> Session<E> {
    /// Session writing into an owned region of `capacity` bytes
    pub fn with_capacity(engine: E, capacity: usize) -> SessionResult<Self> {
        Self::new(engine, vec![0u8; capacity])
    }
}

impl<E: SchemaEngine, B: AsRef<[u8]> + AsMut<[u8]>> Session<E, B> {
    /// Create a session reporting into `region`.
    ///
    /// Fails with [`SessionError::BufferTooSmall`] if the region cannot hold
    /// the truncation record.
    pub fn new(engine: E, region: B) -> SessionResult<Self> {
        Ok(Self {
            engine,
            registry: SchemaRegistry::new(),
            diagnostics: DiagnosticAccumulator::new(region)?,
            limits: InputLimits::default(),
        })
    }

    pub fn with_limits(mut self, limits: InputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Compile a schema and register it under `name`.
    ///
    /// A schema that fails to compile leaves any schema previously registered
    /// under `name` in place; its diagnostics are the operation's output.
    pub fn load_schema(&mut self, name: &str, source: Source<'_>, syntax: SchemaSyntax) -> Outcome {
        debug!(name, ?syntax, "load schema");
        let input = match source.open(&self.limits) {
            Ok(input) => input,
            Err(err) => return self.reject(&err),
        };

        let mut reader = PositionReader::new(&input);
        let mut collector = self.diagnostics.reset(Some(reader.locator()));
        let mut source = InputSource::utf8(&mut reader);
        match self.engine.compile(&mut source, syntax, &mut collector) {
            Ok(Some(schema)) => {
                if self.registry.insert(name, schema).is_some() {
                    debug!(name, "replaced schema");
                }
            }
            Ok(None) => debug!(name, "schema rejected"),
            Err(err) => {
                let err = SessionError::from(err);
                collector.abort(err.status(), &err);
            }
        }
        let outcome = collector.finish();
        debug!(name, status = ?outcome.status, len = outcome.len, "load schema done");
        outcome
    }

    /// Forget the schema registered under `name`, if any.
    pub fn unload_schema(&mut self, name: &str) -> Outcome {
        debug!(name, "unload schema");
        let collector = self.diagnostics.reset(None);
        self.registry.remove(name);
        collector.finish()
    }

    /// Validate a document against the schema registered under `name`.
    pub fn validate(&mut self, name: &str, source: Source<'_>) -> Outcome {
        debug!(name, "validate");
        let Some(schema) = self.registry.get(name) else {
            return self.reject(&SessionError::SchemaNotLoaded {
                name: name.to_string(),
            });
        };
        let input = match source.open(&self.limits) {
            Ok(input) => input,
            Err(err) => return fail(&mut self.diagnostics, &err),
        };

        let mut reader = PositionReader::new(&input);
        let mut collector = self.diagnostics.reset(Some(reader.locator()));
        let mut source = InputSource::utf8(&mut reader);
        match self.engine.validate(schema, &mut source, &mut collector) {
            Ok(valid) => debug!(name, valid, "validated"),
            Err(err) => {
                let err = SessionError::from(err);
                collector.abort(err.status(), &err);
            }
        }
        let outcome = collector.finish();
        debug!(name, status = ?outcome.status, len = outcome.len, "validate done");
        outcome
    }

    /// Path-mode shorthand for [`load_schema`](Self::load_schema)
    pub fn load_schema_file(&mut self, name: &str, path: &Path, syntax: SchemaSyntax) -> Outcome {
        self.load_schema(name, Source::Path(path), syntax)
    }

    /// Path-mode shorthand for [`validate`](Self::validate)
    pub fn validate_file(&mut self, name: &str, path: &Path) -> Outcome {
        self.validate(name, Source::Path(path))
    }

    /// Output of the last operation
    pub fn output(&self) -> &[u8] {
        self.diagnostics.output()
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(self.output()).into_owned()
    }

    /// Diagnostic records of the last operation.
    ///
    /// Only meaningful after a successful operation: failures leave free-form
    /// text that is not a record.
    pub fn records(&self) -> Result<Vec<DiagnosticRecord>, RecordParseError> {
        DiagnosticRecord::parse_all(&self.output_text())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn schema_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// End an operation that failed before it could start, leaving `err`
    /// as the only output.
    pub fn reject(&mut self, err: &SessionError) -> Outcome {
        fail(&mut self.diagnostics, err)
    }
}

/// Start a new operation whose only output is `err`.
fn fail<B: AsRef<[u8]> + AsMut<[u8]>>(
    diagnostics: &mut DiagnosticAccumulator<B>,
    err: &SessionError,
) -> Outcome {
    debug!(error = %err, "operation failed");
    let mut collector = diagnostics.reset(None);
    collector.write_error(err.status(), err);
    collector.finish()
}

//! Schema engine seam
//!
//! The grammar compiler and the validator are supplied by an engine. The
//! session hands it a forward-only [`InputSource`] and an [`ErrorHandler`]
//! to report findings through; anything that aborts the operation comes back
//! as an [`EngineError`](crate::error::EngineError).

use std::io::{self, Read};

use crate::error::EngineResult;
use crate::reader::{ColumnUnit, PositionReader};

/// Grammar notation of a schema source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaSyntax {
    /// RELAX NG XML syntax
    #[default]
    Xml,
    /// RELAX NG compact syntax
    Compact,
}

impl SchemaSyntax {
    pub fn from_compact(compact: bool) -> Self {
        if compact {
            SchemaSyntax::Compact
        } else {
            SchemaSyntax::Xml
        }
    }

    /// Guess the syntax from a file name: `.rnc` is compact, anything else XML.
    pub fn from_path(path: &std::path::Path) -> Self {
        let compact = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("rnc"));
        Self::from_compact(compact)
    }
}

/// A position-bearing finding reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineDiagnostic {
    /// 1-based line, if the engine knows it
    pub line: Option<u32>,
    /// 1-based column, if the engine knows it
    pub column: Option<u32>,
    /// What `column` counts
    pub unit: ColumnUnit,
    /// Element the finding is about, locating it on `line` when the column
    /// is unknown
    pub element: Option<String>,
    pub message: Option<String>,
}

impl EngineDiagnostic {
    pub fn new(line: Option<u32>, column: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Finding at a UTF-16 `column` of `line`
    pub fn at(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self::new(Some(line), Some(column), message)
    }

    pub fn in_code_points(mut self) -> Self {
        self.unit = ColumnUnit::CodePoint;
        self
    }

    pub fn on_element(mut self, name: impl Into<String>) -> Self {
        self.element = Some(name.into());
        self
    }
}

/// Callback interface engines report findings through, one method per
/// severity.
#[cfg_attr(test, mockall::automock)]
pub trait ErrorHandler {
    fn warning(&mut self, diagnostic: &EngineDiagnostic);
    fn error(&mut self, diagnostic: &EngineDiagnostic);
    fn fatal_error(&mut self, diagnostic: &EngineDiagnostic);
}

/// The character source handed to an engine: a forward-only byte stream with
/// its text encoding.
pub struct InputSource<'r, 'a> {
    reader: &'r mut PositionReader<'a>,
    encoding: &'static str,
}

impl<'r, 'a> InputSource<'r, 'a> {
    pub fn utf8(reader: &'r mut PositionReader<'a>) -> Self {
        Self {
            reader,
            encoding: "UTF-8",
        }
    }

    pub fn encoding(&self) -> &'static str {
        self.encoding
    }

    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }
}

impl io::Read for InputSource<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// A grammar compiler and document validator.
///
/// Implementations must not resolve external entities or URIs: every input
/// arrives through the [`InputSource`] and nothing else is fetched.
pub trait SchemaEngine {
    type Schema;

    /// Compile a schema. `Ok(None)` means the schema was rejected and the
    /// reasons were reported through `handler`.
    fn compile(
        &self,
        source: &mut InputSource<'_, '_>,
        syntax: SchemaSyntax,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<Option<Self::Schema>>;

    /// Validate a document. Returns whether it is valid; findings go through
    /// `handler`.
    fn validate(
        &self,
        schema: &Self::Schema,
        source: &mut InputSource<'_, '_>,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::path::Path;

    #[test]
    fn test_syntax_selection() {
        assert_eq!(SchemaSyntax::from_compact(true), SchemaSyntax::Compact);
        assert_eq!(SchemaSyntax::from_compact(false), SchemaSyntax::Xml);
        assert_eq!(
            SchemaSyntax::from_path(Path::new("schemas/inscription.rnc")),
            SchemaSyntax::Compact
        );
        assert_eq!(
            SchemaSyntax::from_path(Path::new("schemas/INSCRIPTION.RNC")),
            SchemaSyntax::Compact
        );
        assert_eq!(
            SchemaSyntax::from_path(Path::new("schemas/inscription.rng")),
            SchemaSyntax::Xml
        );
        assert_eq!(SchemaSyntax::from_path(Path::new("rnc")), SchemaSyntax::Xml);
    }

    #[test]
    fn test_input_source_reads_through_reader() {
        let mut reader = PositionReader::new(b"\xEF\xBB\xBF<doc/>");
        let mut source = InputSource::utf8(&mut reader);
        assert_eq!(source.encoding(), "UTF-8");
        assert_eq!(source.remaining(), 6);

        let mut text = String::new();
        source.read_to_string(&mut text).unwrap();
        assert_eq!(text, "<doc/>");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_mock_handler_receives_diagnostics() {
        let mut handler = MockErrorHandler::new();
        handler
            .expect_error()
            .withf(|d| d.line == Some(3) && d.column == Some(7))
            .times(1)
            .return_const(());
        handler.expect_warning().never();

        let sink: &mut dyn ErrorHandler = &mut handler;
        sink.error(&EngineDiagnostic::at(3, 7, "element \"x\" not allowed here"));
    }
}

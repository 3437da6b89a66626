//! RELAX NG compact syntax
//!
//! Compact schemas are translated to the XML syntax before they reach an
//! engine that only compiles XML. The translation writes every element on a
//! line of its own and remembers where in the compact source each line came
//! from, so findings raised against the generated grammar can be reported at
//! the compact construct through [`SourceMapped`].

mod ast;
mod lexer;
mod parser;
mod token;
mod writer;

use thiserror::Error;

use crate::engine::{EngineDiagnostic, ErrorHandler};

pub use token::Pos;

/// A lexical or syntax error in a compact schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{pos}: {message}")]
pub struct CompactError {
    pub pos: Pos,
    pub message: String,
}

impl CompactError {
    pub fn new(pos: Pos, message: impl Into<String>) -> Self {
        Self {
            pos,
            message: message.into(),
        }
    }

    /// The error as a finding at its source position
    pub fn diagnostic(&self) -> EngineDiagnostic {
        EngineDiagnostic::at(self.pos.line, self.pos.column, self.message.clone())
    }
}

/// A compact schema in XML syntax, with the source position of every
/// generated line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    xml: String,
    origins: Vec<Pos>,
}

impl Translation {
    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn line_count(&self) -> usize {
        self.origins.len()
    }

    /// Compact source position of a 1-based generated line
    pub fn origin(&self, line: u32) -> Option<Pos> {
        let index = usize::try_from(line).ok()?.checked_sub(1)?;
        self.origins.get(index).copied()
    }

    /// Wrap `handler` so findings against the generated lines are reported
    /// at the compact source instead.
    pub fn remap<'t>(&'t self, handler: &'t mut dyn ErrorHandler) -> SourceMapped<'t> {
        SourceMapped {
            translation: self,
            handler,
        }
    }
}

/// Translate a compact schema into the XML syntax.
pub fn translate(source: &str) -> Result<Translation, CompactError> {
    let tokens = lexer::lex(source)?;
    let schema = parser::RncParser::new(tokens).parse_schema()?;
    Ok(writer::write(&schema))
}

/// [`ErrorHandler`] that moves findings from generated lines back to the
/// compact source. Columns become UTF-16 columns of the source construct.
pub struct SourceMapped<'t> {
    translation: &'t Translation,
    handler: &'t mut dyn ErrorHandler,
}

impl SourceMapped<'_> {
    fn map(&self, diagnostic: &EngineDiagnostic) -> EngineDiagnostic {
        let origin = diagnostic.line.and_then(|line| self.translation.origin(line));
        EngineDiagnostic {
            line: origin.map(|pos| pos.line),
            column: origin.map(|pos| pos.column),
            message: diagnostic.message.clone(),
            ..EngineDiagnostic::default()
        }
    }
}

impl ErrorHandler for SourceMapped<'_> {
    fn warning(&mut self, diagnostic: &EngineDiagnostic) {
        let mapped = self.map(diagnostic);
        self.handler.warning(&mapped);
    }

    fn error(&mut self, diagnostic: &EngineDiagnostic) {
        let mapped = self.map(diagnostic);
        self.handler.error(&mapped);
    }

    fn fatal_error(&mut self, diagnostic: &EngineDiagnostic) {
        let mapped = self.map(diagnostic);
        self.handler.fatal_error(&mapped);
    }
}

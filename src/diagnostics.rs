//! Diagnostic records and their accumulation
//!
//! Findings reported by the engine are formatted as one line each,
//! `byteOffset:codePointOffset:line:column:severity:message`, and appended to
//! the session's bounded sink. Failures that end an operation are recorded as
//! an overriding [`Status`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::engine::{EngineDiagnostic, ErrorHandler};
use crate::error::{Outcome, SessionResult, Status};
use crate::reader::{Locator, Position};
use crate::sink::DiagnosticSink;

const NO_DETAILS: &str = "no error details";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            other => Err(RecordParseError::Severity(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordParseError {
    #[error("expected 6 ':'-separated fields, found {0}")]
    FieldCount(usize),

    #[error("invalid position field '{0}'")]
    Position(String),

    #[error("unknown severity '{0}'")]
    Severity(String),
}

/// One diagnostic line of the output region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    #[serde(flatten)]
    pub position: Position,
    pub severity: Severity,
    pub message: String,
}

impl DiagnosticRecord {
    pub fn new(position: Position, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            position,
            severity,
            message: message.into(),
        }
    }

    /// Parse every record of an output text, one per line.
    pub fn parse_all(text: &str) -> Result<Vec<Self>, RecordParseError> {
        text.lines()
            .filter(|line| !line.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.position, self.severity, self.message)
    }
}

fn parse_field<T: FromStr>(field: &str) -> Result<Option<T>, RecordParseError> {
    if field == "-1" {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| RecordParseError::Position(field.to_string()))
}

impl FromStr for DiagnosticRecord {
    type Err = RecordParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.splitn(6, ':').collect();
        let &[byte, code, line_no, column, severity, message] = fields.as_slice() else {
            return Err(RecordParseError::FieldCount(fields.len()));
        };
        Ok(Self {
            position: Position {
                byte_offset: parse_field(byte)?,
                code_offset: parse_field(code)?,
                line: parse_field(line_no)?,
                column: parse_field(column)?,
            },
            severity: severity.parse()?,
            message: message.to_string(),
        })
    }
}

/// Keep a message on a single line.
fn flatten(message: &str) -> String {
    message
        .trim_end()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Formats findings into the session's sink and tracks the status that
/// overrides the sink's length when the operation is finalized.
#[derive(Debug)]
pub struct DiagnosticAccumulator<B = Vec<u8>> {
    sink: DiagnosticSink<B>,
    error: Option<Status>,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> DiagnosticAccumulator<B> {
    pub fn new(region: B) -> SessionResult<Self> {
        Ok(Self {
            sink: DiagnosticSink::new(region)?,
            error: None,
        })
    }

    /// Start a new operation, optionally tied to the document being read.
    pub fn reset<'s, 'a>(&'s mut self, locator: Option<Locator<'a>>) -> Collector<'s, 'a, B> {
        self.sink.clear();
        self.error = None;
        Collector {
            accumulator: self,
            locator,
        }
    }

    /// Replace the output with a single failure message and record `status`.
    pub fn write_error(&mut self, status: Status, failure: &dyn fmt::Display) {
        self.sink.clear();
        self.write_line(&failure.to_string());
        self.record(status);
    }

    /// Append a failure message after the findings gathered so far and record
    /// `status`.
    pub fn abort(&mut self, status: Status, failure: &dyn fmt::Display) {
        self.write_line(&failure.to_string());
        self.record(status);
    }

    /// Format a finding at the position `locator` resolves for it.
    pub fn report(
        &mut self,
        locator: Option<&mut Locator<'_>>,
        diagnostic: &EngineDiagnostic,
        severity: Severity,
    ) {
        let position = match (locator, diagnostic.column, &diagnostic.element) {
            (None, _, _) => Position::UNKNOWN,
            (Some(locator), None, Some(element)) => {
                locator.resolve_element(diagnostic.line, element)
            }
            (Some(locator), column, _) => {
                locator.resolve_in(diagnostic.line, column, diagnostic.unit)
            }
        };
        let message = diagnostic
            .message
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(NO_DETAILS);
        let record = DiagnosticRecord::new(position, severity, flatten(message));
        tracing::trace!(%record, "diagnostic");
        self.sink.write_bytes(format!("{}\n", record).as_bytes());
    }

    /// Seal the output of the current operation.
    pub fn finish(&mut self) -> Outcome {
        let len = self.sink.finish();
        Outcome::new(self.error.unwrap_or(Status::Ok), len)
    }

    /// Text of the last finalized operation
    pub fn output(&self) -> &[u8] {
        self.sink.contents()
    }

    pub fn error(&self) -> Option<Status> {
        self.error
    }

    fn write_line(&mut self, text: &str) {
        let mut line = flatten(text);
        line.push('\n');
        self.sink.write_bytes(line.as_bytes());
    }

    fn record(&mut self, status: Status) {
        if status != Status::Ok && self.error.is_none() {
            self.error = Some(status);
        }
    }
}

/// The accumulator as seen by the engine during one operation.
pub struct Collector<'s, 'a, B> {
    accumulator: &'s mut DiagnosticAccumulator<B>,
    locator: Option<Locator<'a>>,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Collector<'_, '_, B> {
    pub fn report(&mut self, diagnostic: &EngineDiagnostic, severity: Severity) {
        self.accumulator
            .report(self.locator.as_mut(), diagnostic, severity);
    }

    pub fn write_error(&mut self, status: Status, failure: &dyn fmt::Display) {
        self.accumulator.write_error(status, failure);
    }

    pub fn abort(&mut self, status: Status, failure: &dyn fmt::Display) {
        self.accumulator.abort(status, failure);
    }

    /// Finalize the operation; the locator and the input it borrows are
    /// released here.
    pub fn finish(self) -> Outcome {
        self.accumulator.finish()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> ErrorHandler for Collector<'_, '_, B> {
    fn warning(&mut self, diagnostic: &EngineDiagnostic) {
        self.report(diagnostic, Severity::Warning);
    }

    fn error(&mut self, diagnostic: &EngineDiagnostic) {
        self.report(diagnostic, Severity::Error);
    }

    fn fatal_error(&mut self, diagnostic: &EngineDiagnostic) {
        self.report(diagnostic, Severity::Fatal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::sink::{MIN_CAPACITY, TRUNCATION_RECORD};

    fn accumulator(capacity: usize) -> DiagnosticAccumulator {
        DiagnosticAccumulator::new(vec![0u8; capacity]).unwrap()
    }

    fn text(acc: &DiagnosticAccumulator) -> &str {
        std::str::from_utf8(acc.output()).unwrap()
    }

    #[test]
    fn test_record_display_and_parse() {
        let record = DiagnosticRecord::new(
            Position {
                byte_offset: Some(42),
                code_offset: Some(40),
                line: Some(3),
                column: None,
            },
            Severity::Error,
            "element \"b\" not allowed here: expected \"a\"",
        );
        let line = record.to_string();
        assert_eq!(line, "42:40:3:-1:error:element \"b\" not allowed here: expected \"a\"");

        let parsed: DiagnosticRecord = line.parse().unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_record_parse_errors() {
        assert_eq!(
            "1:2:3".parse::<DiagnosticRecord>(),
            Err(RecordParseError::FieldCount(3))
        );
        assert_eq!(
            "x:2:3:4:error:msg".parse::<DiagnosticRecord>(),
            Err(RecordParseError::Position("x".to_string()))
        );
        assert_eq!(
            "1:2:3:4:notice:msg".parse::<DiagnosticRecord>(),
            Err(RecordParseError::Severity("notice".to_string()))
        );
    }

    #[test]
    fn test_parse_all() {
        let text = format!(
            "0:0:1:1:error:first\n5:5:2:-1:warning:second\n{}",
            std::str::from_utf8(TRUNCATION_RECORD).unwrap()
        );
        let records = DiagnosticRecord::parse_all(&text).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].severity, Severity::Warning);
        assert_eq!(records[1].position.column, None);
        assert_eq!(records[2].position, Position::UNKNOWN);
        assert!(DiagnosticRecord::parse_all("").unwrap().is_empty());
    }

    #[test]
    fn test_report_resolves_positions() {
        let doc = b"<a>\n  <b/>\n</a>";
        let mut acc = accumulator(1024);
        let mut collector = acc.reset(Some(Locator::new(doc)));
        collector.error(&EngineDiagnostic::at(2, 3, "element \"b\" not allowed here"));
        collector.warning(&EngineDiagnostic::new(Some(3), None, "suspicious"));
        let outcome = collector.finish();

        assert_eq!(outcome.status, Status::Ok);
        assert_eq!(
            text(&acc),
            "6:6:2:3:error:element \"b\" not allowed here\n11:11:3:-1:warning:suspicious"
        );
        assert_eq!(outcome.len, acc.output().len());
    }

    #[test]
    fn test_report_honours_column_unit_and_element() {
        let doc = "<a>\n\u{1F600}<b/>\n  <c/>".as_bytes();
        let mut acc = accumulator(1024);
        let mut collector = acc.reset(Some(Locator::new(doc)));
        collector.error(&EngineDiagnostic::at(2, 2, "in code points").in_code_points());
        collector.error(&EngineDiagnostic::new(Some(3), None, "by element").on_element("c"));
        collector.finish();

        assert_eq!(
            text(&acc),
            "8:5:2:3:error:in code points\n15:12:3:3:error:by element"
        );
    }

    #[test]
    fn test_report_without_locator_or_message() {
        let mut acc = accumulator(256);
        let mut collector = acc.reset(None);
        collector.fatal_error(&EngineDiagnostic {
            line: Some(1),
            column: Some(1),
            message: None,
            ..EngineDiagnostic::default()
        });
        collector.finish();
        assert_eq!(text(&acc), "-1:-1:-1:-1:fatal:no error details");
    }

    #[test]
    fn test_report_flattens_multiline_messages() {
        let mut acc = accumulator(256);
        let mut collector = acc.reset(Some(Locator::new(b"x")));
        collector.error(&EngineDiagnostic::at(1, 1, "first part\nsecond part\n"));
        collector.finish();
        assert_eq!(text(&acc), "0:0:1:1:error:first part second part");
    }

    #[test]
    fn test_write_error_replaces_output() {
        let mut acc = accumulator(256);
        let mut collector = acc.reset(Some(Locator::new(b"<a/>")));
        collector.error(&EngineDiagnostic::at(1, 1, "discarded"));
        let missing = SessionError::SchemaNotLoaded {
            name: "missing".to_string(),
        };
        collector.write_error(missing.status(), &missing);
        let outcome = collector.finish();

        assert_eq!(outcome.status, Status::ApiError);
        assert_eq!(outcome.raw(), -1);
        assert_eq!(text(&acc), "schema 'missing' not loaded");
    }

    #[test]
    fn test_abort_keeps_findings_and_first_status_wins() {
        let mut acc = accumulator(256);
        let mut collector = acc.reset(Some(Locator::new(b"<a>")));
        collector.fatal_error(&EngineDiagnostic::at(1, 4, "unexpected end"));
        collector.abort(Status::EngineError, &"document is not well-formed");
        collector.abort(Status::IoError, &"later failure");
        let outcome = collector.finish();

        assert_eq!(outcome.status, Status::EngineError);
        assert_eq!(
            text(&acc),
            "3:3:1:4:fatal:unexpected end\ndocument is not well-formed\nlater failure"
        );
    }

    #[test]
    fn test_reset_clears_recorded_error() {
        let mut acc = accumulator(256);
        acc.write_error(Status::IoError, &"disk error");
        assert_eq!(acc.finish().status, Status::IoError);

        let outcome = acc.reset(None).finish();
        assert_eq!(outcome, Outcome::new(Status::Ok, 0));
        assert_eq!(acc.error(), None);
    }

    #[test]
    fn test_finish_reports_overflow_with_success_status() {
        let mut acc = accumulator(MIN_CAPACITY + 40);
        let doc = "line\n".repeat(20);
        let mut collector = acc.reset(Some(Locator::new(doc.as_bytes())));
        for line in 1..=20 {
            collector.error(&EngineDiagnostic::at(line, 1, "bad"));
        }
        let outcome = collector.finish();

        assert_eq!(outcome.status, Status::Ok);
        assert!(outcome.len < MIN_CAPACITY + 40);
        let output = text(&acc);
        assert!(output.ends_with(std::str::from_utf8(TRUNCATION_RECORD).unwrap()));
        assert!(output.starts_with("0:0:1:1:error:bad\n"));
    }
}

//! Output formatting for driver results

use serde::Serialize;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::diagnostics::{DiagnosticRecord, Severity};

/// How a script command received its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// The session read the file itself
    File,
    /// The file's bytes were passed in memory
    Buffer,
}

/// One executed script command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub argv: Vec<String>,
    pub mode: RunMode,
    /// Raw status as returned across the C boundary
    pub status: i32,
    /// Output text; empty when the status is 0
    pub text: String,
    /// Parsed records, when the output holds records
    pub records: Vec<DiagnosticRecord>,
}

/// Result of checking one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: i32,
    pub records: Vec<DiagnosticRecord>,
    /// Failure text that is not a record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FileReport {
    pub fn has_errors(&self) -> bool {
        self.status < 0
            || self
                .records
                .iter()
                .any(|record| record.severity != Severity::Warning)
    }
}

/// Output formatter for driver results
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: format == OutputFormat::Human && atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn severity(&self, severity: Severity) -> String {
        let color = match severity {
            Severity::Warning => "33",
            Severity::Error => "31",
            Severity::Fatal => "1;31",
        };
        self.colorize(severity.as_str(), color)
    }

    /// Format a script run; `None` when the run is not shown at this
    /// verbosity.
    pub fn format_run(&self, report: &RunReport) -> Option<String> {
        if self.verbosity == VerbosityLevel::Quiet && report.status >= 0 {
            return None;
        }
        match self.format {
            OutputFormat::Json => serde_json::to_string(report).ok(),
            OutputFormat::Human => {
                let mut output = format!("CMD {} {}", report.argv.join(" "), report.status);
                if self.verbosity == VerbosityLevel::Verbose {
                    output.push_str(&format!(" ({:?})", report.mode).to_lowercase());
                }
                if report.status != 0 {
                    output.push('\n');
                    output.push_str(&report.text);
                }
                Some(output)
            }
        }
    }

    /// `file:line:column: severity: message`
    pub fn format_record(&self, file: &str, record: &DiagnosticRecord) -> String {
        format!(
            "{}:{}:{}: {}: {}",
            file,
            record.position.line.map_or(-1, i64::from),
            record.position.column.map_or(-1, i64::from),
            self.severity(record.severity),
            record.message
        )
    }

    /// Format the result of checking one file; `None` when there is nothing
    /// to show.
    pub fn format_file(&self, report: &FileReport) -> Option<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string(report).ok(),
            OutputFormat::Human => {
                let mut lines: Vec<String> = report
                    .records
                    .iter()
                    .filter(|record| {
                        self.verbosity != VerbosityLevel::Quiet
                            || record.severity != Severity::Warning
                    })
                    .map(|record| self.format_record(&report.file, record))
                    .collect();
                if let Some(message) = &report.message {
                    lines.push(format!(
                        "{}: {}: {}",
                        report.file,
                        self.severity(Severity::Fatal),
                        message
                    ));
                }
                if lines.is_empty() && self.verbosity == VerbosityLevel::Verbose {
                    lines.push(format!("{}: {}", report.file, self.colorize("valid", "32")));
                }
                (!lines.is_empty()).then(|| lines.join("\n"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Position;

    fn record(line: Option<u32>, column: Option<u32>, severity: Severity) -> DiagnosticRecord {
        DiagnosticRecord::new(
            Position {
                byte_offset: Some(10),
                code_offset: Some(10),
                line,
                column,
            },
            severity,
            "element \"x\" not allowed here",
        )
    }

    fn run(status: i32, text: &str) -> RunReport {
        RunReport {
            argv: vec!["validate".into(), "s1".into(), "doc.xml".into()],
            mode: RunMode::File,
            status,
            text: text.to_string(),
            records: vec![],
        }
    }

    #[test]
    fn test_format_run_human() {
        let output = Output::new(OutputFormat::Human, VerbosityLevel::Normal).with_colors(false);
        assert_eq!(
            output.format_run(&run(0, "")).unwrap(),
            "CMD validate s1 doc.xml 0"
        );
        assert_eq!(
            output.format_run(&run(-1, "schema 's1' not loaded")).unwrap(),
            "CMD validate s1 doc.xml -1\nschema 's1' not loaded"
        );
    }

    #[test]
    fn test_quiet_hides_successful_runs() {
        let output = Output::new(OutputFormat::Human, VerbosityLevel::Quiet);
        assert!(output.format_run(&run(0, "")).is_none());
        assert!(output.format_run(&run(5, "0:0:1:1:warning:x")).is_none());
        assert!(output.format_run(&run(-3, "disk")).is_some());
    }

    #[test]
    fn test_format_run_json() {
        let output = Output::new(OutputFormat::Json, VerbosityLevel::Normal);
        let mut report = run(30, "");
        report.records.push(record(Some(2), Some(3), Severity::Error));
        let json: serde_json::Value =
            serde_json::from_str(&output.format_run(&report).unwrap()).unwrap();
        assert_eq!(json["mode"], "file");
        assert_eq!(json["status"], 30);
        assert_eq!(json["records"][0]["line"], 2);
        assert_eq!(json["records"][0]["severity"], "error");
    }

    #[test]
    fn test_format_record_with_unknown_column() {
        let output = Output::new(OutputFormat::Human, VerbosityLevel::Normal).with_colors(false);
        assert_eq!(
            output.format_record("doc.xml", &record(Some(4), None, Severity::Warning)),
            "doc.xml:4:-1: warning: element \"x\" not allowed here"
        );
    }

    #[test]
    fn test_colors() {
        let output = Output::new(OutputFormat::Human, VerbosityLevel::Normal).with_colors(true);
        let line = output.format_record("d", &record(Some(1), Some(1), Severity::Error));
        assert!(line.contains("\x1b[31merror\x1b[0m"));
    }

    #[test]
    fn test_format_file() {
        let output = Output::new(OutputFormat::Human, VerbosityLevel::Quiet).with_colors(false);
        let report = FileReport {
            file: "doc.xml".to_string(),
            status: -2,
            records: vec![
                record(Some(1), Some(1), Severity::Warning),
                record(Some(2), Some(5), Severity::Fatal),
            ],
            message: Some("document is not well-formed".to_string()),
        };
        assert!(report.has_errors());
        assert_eq!(
            output.format_file(&report).unwrap(),
            "doc.xml:2:5: fatal: element \"x\" not allowed here\n\
             doc.xml: fatal: document is not well-formed"
        );

        let clean = FileReport {
            file: "ok.xml".to_string(),
            status: 0,
            records: vec![],
            message: None,
        };
        assert!(!clean.has_errors());
        assert!(output.format_file(&clean).is_none());
    }
}

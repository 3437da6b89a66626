//! # validate-rng Library
//!
//! RELAX NG validation sessions for hosts that hand over a fixed output
//! buffer. Diagnostics are written into that buffer as one record per line,
//! `byteOffset:codePointOffset:line:column:severity:message`, with positions
//! resolved against the input bytes as given. Sessions are driven from Rust
//! through [`Session`] or from C through the functions in [`ffi`].

pub mod cli;
pub mod compact;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod input;
pub mod libxml2;
pub mod output;
pub mod reader;
pub mod registry;
pub mod session;
pub mod sink;

pub use compact::{CompactError, Translation};
pub use config::{Config, ConfigError, ConfigManager};
pub use diagnostics::{DiagnosticAccumulator, DiagnosticRecord, Severity};
pub use engine::{EngineDiagnostic, ErrorHandler, InputSource, SchemaEngine, SchemaSyntax};
pub use error::{EngineError, Outcome, SessionError, Status};
pub use input::{InputBuffer, InputLimits, Source};
pub use libxml2::{LibXml2Engine, RelaxNgSchema};
pub use reader::{ColumnUnit, Locator, Position, PositionReader};
pub use session::Session;
pub use sink::{DiagnosticSink, TRUNCATION_RECORD};

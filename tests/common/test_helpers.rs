#![allow(dead_code)]

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use regex::Regex;
use tempfile::TempDir;

pub const DOC_SCHEMA_RNC: &str = "start = element doc { element item { text }* }\n";

pub const DOC_SCHEMA_RNG: &str = r#"<?xml version="1.0"?>
<grammar xmlns="http://relaxng.org/ns/structure/1.0">
  <start>
    <element name="doc">
      <zeroOrMore>
        <element name="item"><text/></element>
      </zeroOrMore>
    </element>
  </start>
</grammar>
"#;

pub const VALID_DOC: &str = "<doc>\n  <item>one</item>\n  <item>two</item>\n</doc>\n";

pub const INVALID_DOC: &str = "<doc>\n  <item>one</item>\n  <bad/>\n</doc>\n";

/// Scratch directory holding test inputs
pub struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// Sparse file of `size` bytes
    pub fn sparse(&self, name: &str, size: u64) -> PathBuf {
        let path = self.dir.path().join(name);
        File::create(&path).unwrap().set_len(size).unwrap();
        path
    }

    pub fn missing(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Shape of one diagnostic record line
pub fn record_pattern() -> Regex {
    Regex::new(r"^(-1|\d+):(-1|\d+):(-1|\d+):(-1|\d+):(warning|error|fatal):.*$").unwrap()
}

/// `doc` with one `item` per line, padded until at least `min_len` bytes
pub fn large_document(min_len: usize) -> String {
    let mut doc = String::from("<doc>\n");
    let mut n = 0;
    while doc.len() < min_len {
        doc.push_str(&format!("  <item>entry {}</item>\n", n));
        n += 1;
    }
    doc
}

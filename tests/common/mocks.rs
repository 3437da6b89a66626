//! Scripted schema engine for session tests
//!
//! A schema is the set of element names it declares, in either syntax.
//! Validation reports every start tag whose name is not in that set, with
//! 1-based lines and UTF-16 columns the way a real engine would.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::Read;

use regex::Regex;
use validate_rng::engine::{
    EngineDiagnostic, ErrorHandler, InputSource, SchemaEngine, SchemaSyntax,
};
use validate_rng::error::{EngineError, EngineResult};

pub struct ElementEngine {
    compact_element: Regex,
    xml_element: Regex,
}

impl ElementEngine {
    pub fn new() -> Self {
        Self {
            compact_element: Regex::new(r"element\s+(\w+)").unwrap(),
            xml_element: Regex::new(r#"<element\s+name="(\w+)""#).unwrap(),
        }
    }
}

impl Default for ElementEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn read_text(source: &mut InputSource<'_, '_>) -> EngineResult<String> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Start of a tag with its 1-based line and UTF-16 column
struct Tag<'t> {
    line: u32,
    column: u32,
    text: &'t str,
}

/// Locate every `<` in `text`, tracking lines across `\r`, `\n` and `\r\n`.
fn tags(text: &str) -> Vec<Tag<'_>> {
    let mut found = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut chars = text.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        match c {
            '\r' => {
                if matches!(chars.peek(), Some((_, '\n'))) {
                    chars.next();
                }
                line += 1;
                column = 1;
            }
            '\n' => {
                line += 1;
                column = 1;
            }
            _ => {
                if c == '<' {
                    found.push(Tag {
                        line,
                        column,
                        text: &text[at..],
                    });
                }
                column += c.len_utf16() as u32;
            }
        }
    }
    found
}

fn tag_name(tag: &str) -> &str {
    let rest = &tag[1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

impl SchemaEngine for ElementEngine {
    type Schema = BTreeSet<String>;

    fn compile(
        &self,
        source: &mut InputSource<'_, '_>,
        syntax: SchemaSyntax,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<Option<Self::Schema>> {
        let text = read_text(source)?;
        if text.matches('{').count() != text.matches('}').count() {
            return Err(EngineError::parse("unbalanced braces in schema"));
        }
        let pattern = match syntax {
            SchemaSyntax::Compact => &self.compact_element,
            SchemaSyntax::Xml => &self.xml_element,
        };
        let names: BTreeSet<String> = pattern
            .captures_iter(&text)
            .map(|caps| caps[1].to_string())
            .collect();
        if names.is_empty() {
            handler.error(&EngineDiagnostic::at(1, 1, "schema declares no elements"));
            return Ok(None);
        }
        Ok(Some(names))
    }

    fn validate(
        &self,
        schema: &Self::Schema,
        source: &mut InputSource<'_, '_>,
        handler: &mut dyn ErrorHandler,
    ) -> EngineResult<bool> {
        let text = read_text(source)?;
        let mut valid = true;
        for tag in tags(&text) {
            if !tag.text.contains('>') {
                handler.fatal_error(&EngineDiagnostic::at(tag.line, tag.column, "unclosed tag"));
                return Err(EngineError::parse("document is not well-formed"));
            }
            if tag.text[1..].starts_with(&['/', '?', '!'][..]) {
                continue;
            }
            let name = tag_name(tag.text);
            if !schema.contains(name) {
                valid = false;
                handler.error(&EngineDiagnostic::at(
                    tag.line,
                    tag.column,
                    format!("element \"{}\" not allowed here", name),
                ));
            }
        }
        Ok(valid)
    }
}

//! Position-tracking input reader
//!
//! [`PositionReader`] is the forward-only byte stream handed to the schema
//! engine. Engines report diagnostics by line and column only (in UTF-16
//! units or code points, see [`ColumnUnit`]), so a [`Locator`] sharing the
//! same buffer walks it on demand to recover the byte offset, code-point
//! offset and both column counts of a reported position.
//!
//! The locator only moves forward. Diagnostics arrive in document order, so a
//! request for a line at or before the last resolved one is answered with
//! "unknown" instead of rescanning from the start.

use std::fmt;
use std::io;

use serde::Serialize;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Sequence length of a UTF-8 code point keyed by its lead byte. Zero marks
/// bytes that cannot start a sequence.
const CHAR_LEN: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = match i {
            0x00..=0x7F => 1,
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 0,
        };
        i += 1;
    }
    table
};

fn bom_len(bytes: &[u8]) -> usize {
    if bytes.starts_with(UTF8_BOM) {
        UTF8_BOM.len()
    } else {
        0
    }
}

/// Forward-only byte stream over an input buffer, skipping a leading BOM.
#[derive(Debug, Clone)]
pub struct PositionReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PositionReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: bom_len(bytes),
        }
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    /// Advance by up to `n` bytes, returning how many were skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        let skipped = n.min(self.remaining());
        self.pos += skipped;
        skipped
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Byte offset of the read cursor from the start of the buffer
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// A locator over the same buffer, with its own scan cursor.
    pub fn locator(&self) -> Locator<'a> {
        Locator::new(self.bytes)
    }
}

impl io::Read for PositionReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Unit an engine counts columns in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnUnit {
    /// UTF-16 code units; supplementary code points count twice
    #[default]
    Utf16,
    /// Unicode scalar values
    CodePoint,
}

/// Which fields of the last resolved position can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Validity(u8);

impl Validity {
    const NONE: Validity = Validity(0);
    const OFFSET: Validity = Validity(1 << 0);
    const LINE: Validity = Validity(1 << 1);
    const COLUMN: Validity = Validity(1 << 2);

    fn contains(self, other: Validity) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    fn with(self, other: Validity) -> Validity {
        Validity(self.0 | other.0)
    }
}

/// Scan cursor state; copied per request and only committed on success.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    byte_offset: usize,
    code_offset: u64,
    line: u32,
    column: u32,
    column16: u32,
}

/// Move past one code point of `len` bytes and `width` UTF-16 units.
fn step(cursor: &mut Cursor, len: usize, width: u32) {
    cursor.byte_offset += len;
    cursor.code_offset += 1;
    cursor.column += 1;
    cursor.column16 += width;
}

enum ColumnScan {
    Reached,
    LineEnded,
}

/// A resolved document position. `None` fields are unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub byte_offset: Option<u64>,
    pub code_offset: Option<u64>,
    pub line: Option<u32>,
    /// UTF-16 column, 1-based
    pub column: Option<u32>,
}

impl Position {
    pub const UNKNOWN: Position = Position {
        byte_offset: None,
        code_offset: None,
        line: None,
        column: None,
    };
}

fn field<T: fmt::Display>(f: &mut fmt::Formatter<'_>, value: Option<T>) -> fmt::Result {
    match value {
        Some(v) => write!(f, "{}", v),
        None => f.write_str("-1"),
    }
}

impl fmt::Display for Position {
    /// `byteOffset:codePointOffset:line:column`, unknown fields as `-1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        field(f, self.byte_offset)?;
        f.write_str(":")?;
        field(f, self.code_offset)?;
        f.write_str(":")?;
        field(f, self.line)?;
        f.write_str(":")?;
        field(f, self.column)
    }
}

/// Resolves engine-reported line/column pairs to buffer positions.
#[derive(Debug, Clone)]
pub struct Locator<'a> {
    bytes: &'a [u8],
    cursor: Cursor,
    last_line: Option<u32>,
    valid: Validity,
}

impl<'a> Locator<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            cursor: Cursor {
                byte_offset: bom_len(bytes),
                code_offset: 0,
                line: 1,
                column: 1,
                column16: 1,
            },
            last_line: None,
            valid: Validity::NONE,
        }
    }

    /// Move the scan cursor to `line` and, if given, the UTF-16 `column16`.
    ///
    /// A line at or before the last resolved line, malformed UTF-8, running
    /// out of input before the line, or a column inside a supplementary code
    /// point all leave every field unknown and the cached cursor untouched.
    /// When the line ends before the column is reached, the line and offsets
    /// are known and the column is not.
    pub fn resolve(&mut self, line: Option<u32>, column16: Option<u32>) -> Position {
        self.resolve_in(line, column16, ColumnUnit::Utf16)
    }

    /// [`resolve`](Self::resolve) with the column counted in `unit`.
    pub fn resolve_in(&mut self, line: Option<u32>, column: Option<u32>, unit: ColumnUnit) -> Position {
        self.valid = Validity::NONE;
        let Some((mut cursor, line)) = self.start_line(line) else {
            return self.position();
        };

        let mut valid = Validity::OFFSET.with(Validity::LINE);
        if let Some(target) = column.filter(|&c| c > 0) {
            match self.goto_column(&mut cursor, target, unit) {
                Some(ColumnScan::Reached) => valid = valid.with(Validity::COLUMN),
                Some(ColumnScan::LineEnded) => {}
                None => return self.position(),
            }
        }
        self.commit(cursor, line, valid)
    }

    /// Resolve to the first start tag of element `name` on `line`, for
    /// engines that know the element but not the column. The prefix of a
    /// qualified tag name is ignored. Without such a tag on the line only
    /// the line and its offsets are known.
    pub fn resolve_element(&mut self, line: Option<u32>, name: &str) -> Position {
        self.valid = Validity::NONE;
        let Some((mut cursor, line)) = self.start_line(line) else {
            return self.position();
        };

        let mut valid = Validity::OFFSET.with(Validity::LINE);
        if let Some(at) = self.find_start_tag(cursor.byte_offset, name) {
            if !self.advance_to(&mut cursor, at) {
                return self.position();
            }
            valid = valid.with(Validity::COLUMN);
        }
        self.commit(cursor, line, valid)
    }

    /// Scan cursor at the start of `line`, unless the request goes backwards
    /// or the input ends first.
    fn start_line(&self, line: Option<u32>) -> Option<(Cursor, u32)> {
        let line = line.filter(|&l| l > 0)?;
        if self.last_line.is_some_and(|last| line <= last) {
            tracing::trace!(line, last = ?self.last_line, "position request behind scan cursor");
            return None;
        }
        let mut cursor = self.cursor;
        self.goto_line(&mut cursor, line).then_some((cursor, line))
    }

    fn commit(&mut self, cursor: Cursor, line: u32, valid: Validity) -> Position {
        self.cursor = cursor;
        self.last_line = Some(line);
        self.valid = valid;
        self.position()
    }

    fn goto_line(&self, cursor: &mut Cursor, line: u32) -> bool {
        if cursor.line == line {
            return true;
        }
        cursor.column = 1;
        cursor.column16 = 1;
        while cursor.line < line {
            let Some(&b) = self.bytes.get(cursor.byte_offset) else {
                return false;
            };
            match b {
                b'\r' => {
                    cursor.byte_offset += 1;
                    cursor.code_offset += 1;
                    if self.bytes.get(cursor.byte_offset) == Some(&b'\n') {
                        cursor.byte_offset += 1;
                        cursor.code_offset += 1;
                    }
                    cursor.line += 1;
                }
                b'\n' => {
                    cursor.byte_offset += 1;
                    cursor.code_offset += 1;
                    cursor.line += 1;
                }
                _ => {
                    let Some((_, len)) = self.decode(cursor.byte_offset) else {
                        return false;
                    };
                    cursor.byte_offset += len;
                    cursor.code_offset += 1;
                }
            }
        }
        true
    }

    fn goto_column(&self, cursor: &mut Cursor, target: u32, unit: ColumnUnit) -> Option<ColumnScan> {
        let column = |cursor: &Cursor| match unit {
            ColumnUnit::Utf16 => cursor.column16,
            ColumnUnit::CodePoint => cursor.column,
        };
        while column(cursor) < target {
            match self.bytes.get(cursor.byte_offset) {
                None | Some(b'\r') | Some(b'\n') => return Some(ColumnScan::LineEnded),
                Some(_) => {}
            }
            let (c, len) = self.decode(cursor.byte_offset)?;
            let width = if c > 0xFFFF { 2 } else { 1 };
            if unit == ColumnUnit::Utf16 && cursor.column16 + width > target {
                // The target falls between the two halves of a surrogate pair
                return None;
            }
            step(cursor, len, width);
        }
        Some(ColumnScan::Reached)
    }

    /// Advance within the current line up to byte offset `target`.
    fn advance_to(&self, cursor: &mut Cursor, target: usize) -> bool {
        while cursor.byte_offset < target {
            let Some((c, len)) = self.decode(cursor.byte_offset) else {
                return false;
            };
            step(cursor, len, if c > 0xFFFF { 2 } else { 1 });
        }
        true
    }

    /// Byte offset of the first `<name` or `<prefix:name` tag on the line
    /// starting at `from`
    fn find_start_tag(&self, from: usize, name: &str) -> Option<usize> {
        let rest = &self.bytes[from..];
        let line = rest
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .map_or(rest, |end| &rest[..end]);

        let mut i = 0;
        while let Some(lt) = line[i..].iter().position(|&b| b == b'<') {
            let start = i + lt;
            let tag = &line[start + 1..];
            let qname_len = tag
                .iter()
                .position(|&b| b.is_ascii_whitespace() || b == b'/' || b == b'>')
                .unwrap_or(tag.len());
            let qname = &tag[..qname_len];
            let local = qname
                .iter()
                .rposition(|&b| b == b':')
                .map_or(qname, |colon| &qname[colon + 1..]);
            if local == name.as_bytes() {
                return Some(from + start);
            }
            i = start + 1;
        }
        None
    }

    /// Decode the code point starting at `at`, returning it with its length.
    fn decode(&self, at: usize) -> Option<(u32, usize)> {
        let lead = *self.bytes.get(at)?;
        let len = CHAR_LEN[lead as usize] as usize;
        if len == 0 || self.bytes.len() - at < len {
            return None;
        }
        let mut c = match len {
            1 => return Some((lead as u32, 1)),
            2 => (lead & 0x1F) as u32,
            3 => (lead & 0x0F) as u32,
            _ => (lead & 0x07) as u32,
        };
        for &b in &self.bytes[at + 1..at + len] {
            if b & 0xC0 != 0x80 {
                return None;
            }
            c = (c << 6) | (b & 0x3F) as u32;
        }
        Some((c, len))
    }

    pub fn position(&self) -> Position {
        Position {
            byte_offset: self.byte_offset().map(|o| o as u64),
            code_offset: self.code_offset(),
            line: self.line(),
            column: self.column(),
        }
    }

    pub fn byte_offset(&self) -> Option<usize> {
        self.valid
            .contains(Validity::OFFSET)
            .then_some(self.cursor.byte_offset)
    }

    pub fn code_offset(&self) -> Option<u64> {
        self.valid
            .contains(Validity::OFFSET)
            .then_some(self.cursor.code_offset)
    }

    pub fn line(&self) -> Option<u32> {
        self.valid.contains(Validity::LINE).then_some(self.cursor.line)
    }

    /// UTF-16 column
    pub fn column(&self) -> Option<u32> {
        self.valid
            .contains(Validity::COLUMN)
            .then_some(self.cursor.column16)
    }

    /// Column counted in code points
    pub fn code_point_column(&self) -> Option<u32> {
        self.valid
            .contains(Validity::COLUMN)
            .then_some(self.cursor.column)
    }
}

//! Bounded diagnostic sink
//!
//! A write-only stream over a fixed-capacity byte region owned by the caller.
//! The region is handed back as a NUL-terminated text blob, so the sink never
//! writes past its capacity and never leaves a half-written record at the end:
//! when the records do not fit, the tail is replaced by a truncation record.

use std::io;

use crate::error::{SessionError, SessionResult};

/// Record appended in place of everything that did not fit.
pub const TRUNCATION_RECORD: &[u8] =
    b"-1:-1:-1:-1:warning:more error messages follow but were truncated";

/// Bytes kept free at all times: the truncation record, its newline and the
/// terminating NUL.
const RESERVED: usize = TRUNCATION_RECORD.len() + 2;

/// Smallest region a sink accepts.
pub const MIN_CAPACITY: usize = RESERVED;

#[derive(Debug)]
pub struct DiagnosticSink<B = Vec<u8>> {
    region: B,
    len: usize,
    overflowed: bool,
    finished: bool,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> DiagnosticSink<B> {
    pub fn new(region: B) -> SessionResult<Self> {
        let capacity = region.as_ref().len();
        if capacity < MIN_CAPACITY {
            return Err(SessionError::BufferTooSmall {
                capacity,
                minimum: MIN_CAPACITY,
            });
        }
        let mut sink = Self {
            region,
            len: 0,
            overflowed: false,
            finished: false,
        };
        sink.clear();
        Ok(sink)
    }

    pub fn capacity(&self) -> usize {
        self.region.as_ref().len()
    }

    /// Bytes written so far (or, once finished, the final content)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn contents(&self) -> &[u8] {
        &self.region.as_ref()[..self.len]
    }

    /// Empty the sink and start a new write sequence.
    pub fn clear(&mut self) {
        self.region.as_mut()[0] = 0;
        self.len = 0;
        self.overflowed = false;
        self.finished = false;
    }

    /// Append `bytes` if they fit entirely. Returns whether they were kept.
    ///
    /// The first write that does not fit marks the sink as overflowed; from
    /// then on every write is dropped until the next [`clear`](Self::clear).
    pub fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.overflowed || self.finished {
            return false;
        }
        let room = self.capacity().saturating_sub(self.len + RESERVED);
        if bytes.len() > room {
            self.overflowed = true;
            return false;
        }
        let end = self.len + bytes.len();
        self.region.as_mut()[self.len..end].copy_from_slice(bytes);
        self.len = end;
        true
    }

    /// Seal the content and return its length.
    ///
    /// Calling this again before `clear` returns the same length.
    pub fn finish(&mut self) -> usize {
        if self.finished {
            return self.len;
        }
        self.finished = true;

        if self.overflowed {
            let keep = self.contents().iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
            let end = keep + TRUNCATION_RECORD.len();
            self.region.as_mut()[keep..end].copy_from_slice(TRUNCATION_RECORD);
            self.len = end;
        } else if self.contents().last() == Some(&b'\n') {
            self.len -= 1;
        }

        let len = self.len;
        self.region.as_mut()[len] = 0;
        len
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> io::Write for DiagnosticSink<B> {
    /// Never fails: bytes that do not fit are dropped and surface as the
    /// truncation record on [`finish`](DiagnosticSink::finish).
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

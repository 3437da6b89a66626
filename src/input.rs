//! Document and schema input
//!
//! Inputs arrive either as bytes already in memory or as a file path. Files
//! are loaded by size: small files are read into an owned buffer, larger ones
//! are mapped read-only, and anything above the map limit is rejected before
//! a single byte is read.

use std::fs::{self, File};
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};

/// Largest file read into memory instead of mapped
pub const DEFAULT_IN_CORE_LIMIT: u64 = 32 * 1024;

/// Largest file accepted at all
pub const DEFAULT_MAP_LIMIT: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    pub in_core_limit: u64,
    pub map_limit: u64,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            in_core_limit: DEFAULT_IN_CORE_LIMIT,
            map_limit: DEFAULT_MAP_LIMIT,
        }
    }
}

/// Where an operation takes its input from.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
}

impl<'a> Source<'a> {
    /// Make the input bytes available, loading the file if there is one.
    pub fn open(self, limits: &InputLimits) -> SessionResult<Input<'a>> {
        match self {
            Source::Bytes(bytes) => Ok(Input::Borrowed(bytes)),
            Source::Path(path) => load_file(path, limits).map(Input::Loaded),
        }
    }
}

impl<'a> From<&'a [u8]> for Source<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Source::Bytes(bytes)
    }
}

impl<'a> From<&'a Path> for Source<'a> {
    fn from(path: &'a Path) -> Self {
        Source::Path(path)
    }
}

/// Input bytes for the duration of one operation
#[derive(Debug)]
pub enum Input<'a> {
    Borrowed(&'a [u8]),
    Loaded(InputBuffer),
}

impl Deref for Input<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Input::Borrowed(bytes) => bytes,
            Input::Loaded(buffer) => buffer,
        }
    }
}

/// File contents, either read into memory or mapped.
#[derive(Debug)]
pub enum InputBuffer {
    Owned(Vec<u8>),
    Mapped(MappedRegion),
}

impl InputBuffer {
    pub fn is_mapped(&self) -> bool {
        matches!(self, InputBuffer::Mapped(_))
    }
}

impl Deref for InputBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            InputBuffer::Owned(bytes) => bytes,
            InputBuffer::Mapped(region) => region,
        }
    }
}

/// Load the file at `path` according to `limits`.
pub fn load_file(path: &Path, limits: &InputLimits) -> SessionResult<InputBuffer> {
    let not_found = |reason: String| SessionError::FileNotFound {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = fs::metadata(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => not_found(err.to_string()),
        _ => io_error(path, err),
    })?;
    if !metadata.is_file() {
        return Err(not_found("not a regular file".to_string()));
    }

    let size = metadata.len();
    if size > limits.map_limit {
        warn!(path = %path.display(), size, limit = limits.map_limit, "rejecting oversize input");
        return Err(SessionError::FileTooLarge {
            path: path.to_path_buf(),
            size,
            limit: limits.map_limit,
        });
    }

    let file = File::open(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => not_found(err.to_string()),
        _ => io_error(path, err),
    })?;

    if size <= limits.in_core_limit {
        debug!(path = %path.display(), size, "reading input");
        read_in_core(file, path, size).map(InputBuffer::Owned)
    } else {
        debug!(path = %path.display(), size, "mapping input");
        MappedRegion::map(&file, path, size).map(InputBuffer::Mapped)
    }
}

fn io_error(path: &Path, source: io::Error) -> SessionError {
    SessionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn read_in_core(file: File, path: &Path, size: u64) -> SessionResult<Vec<u8>> {
    let expected = usize::try_from(size).map_err(|_| SessionError::FileTooLarge {
        path: path.to_path_buf(),
        size,
        limit: usize::MAX as u64,
    })?;
    let mut bytes = Vec::with_capacity(expected);
    file.take(size)
        .read_to_end(&mut bytes)
        .map_err(|err| io_error(path, err))?;
    if bytes.len() != expected {
        return Err(SessionError::ShortRead {
            path: path.to_path_buf(),
            read: bytes.len(),
            expected: size,
        });
    }
    Ok(bytes)
}

/// A read-only mapping of a whole file, unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion {
    map: Mmap,
}

impl MappedRegion {
    fn map(file: &File, path: &Path, size: u64) -> SessionResult<Self> {
        // SAFETY: read-only mapping, dropped with the operation that loaded it.
        let map = unsafe { Mmap::map(file) }.map_err(|err| io_error(path, err))?;
        if map.len() as u64 != size {
            return Err(SessionError::ShortRead {
                path: path.to_path_buf(),
                read: map.len(),
                expected: size,
            });
        }
        Ok(Self { map })
    }
}

impl Deref for MappedRegion {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Status;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_small_file_is_read_in_core() {
        let file = temp_file(b"<doc/>");
        let buffer = load_file(file.path(), &InputLimits::default()).unwrap();
        assert!(!buffer.is_mapped());
        assert_eq!(&buffer[..], b"<doc/>");
    }

    #[test]
    fn test_in_core_limit_is_inclusive() {
        let contents = vec![b'a'; DEFAULT_IN_CORE_LIMIT as usize];
        let file = temp_file(&contents);
        let buffer = load_file(file.path(), &InputLimits::default()).unwrap();
        assert!(!buffer.is_mapped());
        assert_eq!(buffer.len(), contents.len());
    }

    #[test]
    fn test_larger_file_is_mapped() {
        let contents: Vec<u8> = (0..40 * 1024).map(|i| b'a' + (i % 26) as u8).collect();
        let file = temp_file(&contents);
        let buffer = load_file(file.path(), &InputLimits::default()).unwrap();
        assert!(buffer.is_mapped());
        assert_eq!(&buffer[..], &contents[..]);
    }

    #[test]
    fn test_oversize_file_is_rejected_without_reading() {
        let file = NamedTempFile::new().unwrap();
        // Sparse: no data blocks are written
        file.as_file().set_len(DEFAULT_MAP_LIMIT + 1).unwrap();

        let err = load_file(file.path(), &InputLimits::default()).unwrap_err();
        assert!(matches!(err, SessionError::FileTooLarge { size, .. } if size == DEFAULT_MAP_LIMIT + 1));
        assert_eq!(err.status(), Status::IoError);
        assert!(err.to_string().starts_with("file too large"));
    }

    #[test]
    fn test_custom_limits() {
        let file = temp_file(&[b'x'; 100]);
        let limits = InputLimits {
            in_core_limit: 10,
            map_limit: 50,
        };
        let err = load_file(file.path(), &limits).unwrap_err();
        assert_eq!(err.status(), Status::IoError);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.xml");
        let err = load_file(&path, &InputLimits::default()).unwrap_err();
        assert!(matches!(err, SessionError::FileNotFound { .. }));
        assert_eq!(err.status(), Status::FileNotFound);
        assert!(err.to_string().contains("missing.xml"));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let err = load_file(dir.path(), &InputLimits::default()).unwrap_err();
        assert_eq!(err.status(), Status::FileNotFound);
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_source_open() {
        let limits = InputLimits::default();
        let bytes = b"<a/>".as_slice();
        let input = Source::from(bytes).open(&limits).unwrap();
        assert!(matches!(input, Input::Borrowed(_)));
        assert_eq!(&input[..], b"<a/>");

        let file = temp_file(b"<b/>");
        let input = Source::from(file.path()).open(&limits).unwrap();
        assert!(matches!(input, Input::Loaded(_)));
        assert_eq!(&input[..], b"<b/>");
    }
}

//! Spooled response bodies.
//!
//! Bodies are written to an anonymous temporary file (already unlinked, so
//! it disappears with its last open descriptor). A finished [`Body`] is a
//! cheap clonable handle; every [`BodyReader`] owns its own duplicate of the
//! descriptor and reads positionally, so readers never disturb each other.

use crate::base::neterror::NetError;
use bytes::Bytes;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// A body under construction.
#[derive(Debug)]
pub struct Spool {
    file: File,
    len: u64,
}

impl Spool {
    pub fn new(dir: &Path) -> Result<Self, NetError> {
        let file = tempfile::tempfile_in(dir)?;
        Ok(Self { file, len: 0 })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Discard everything written so far (used when a request is resent).
    pub fn reset(&mut self) -> Result<(), NetError> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.len = 0;
        Ok(())
    }

    pub fn into_body(self) -> Body {
        Body {
            file: Arc::new(self.file),
            len: self.len,
        }
    }
}

impl Write for Spool {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// A complete body.
#[derive(Debug, Clone)]
pub struct Body {
    file: Arc<File>,
    len: u64,
}

impl Body {
    /// Wrap an already open file (used for `file:` and `about:` URLs).
    pub fn from_file(file: File) -> Result<Self, NetError> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// An independent reader positioned at the start of the body.
    pub fn reader(&self) -> Result<BodyReader, NetError> {
        Ok(BodyReader {
            file: self.file.try_clone()?,
            pos: 0,
            len: self.len,
        })
    }

    /// Read the whole body into memory.
    pub fn bytes(&self) -> Result<Bytes, NetError> {
        let mut buf = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        self.reader()?.read_to_end(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Read the whole body as UTF-8 text.
    pub fn text(&self) -> Result<String, NetError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::ContentDecodingFailed)
    }
}

#[derive(Debug)]
pub struct BodyReader {
    file: File,
    pos: u64,
    len: u64,
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.len.saturating_sub(self.pos);
        if left == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(left).unwrap_or(usize::MAX).min(buf.len());
        let n = read_at(&self.file, &mut buf[..max], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

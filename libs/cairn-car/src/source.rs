//! Pull-style byte sources feeding the readers.
//!
//! Every access mode consumes archive bytes through the same small
//! [`ByteSource`] contract: consume exactly `n` bytes, look ahead without
//! consuming, report the current offset, release the source. Three
//! implementations cover the modes:
//!
//! - [`BufferSource`]: cursor over bytes already resident in memory
//! - [`StreamSource`]: forward-only cursor over any [`AsyncRead`], with a
//!   lookahead buffer filled in `buffer_size` chunks
//! - [`FileSource`]: cursor over a file that also supports positioned reads
//!   ([`FileSource::read_at`]) for point lookups after indexing

use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};
use crate::wire::varint::{UnsignedVarint, VarintDecodeError, MAX_VARINT_LEN};

/// Default chunk size for stream and file sources: 64 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// A pull source of archive bytes.
///
/// `peek` may return fewer than `n` bytes only when the underlying input has
/// ended, so decode loops can tell a cleanly finished archive apart from a
/// truncated one.
#[async_trait]
pub trait ByteSource: Send {
    /// Consumes exactly `n` bytes, failing with [`Error::UnexpectedEnd`] if
    /// the input ends first.
    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>>;

    /// Looks ahead at up to `n` bytes without consuming them.
    async fn peek(&mut self, n: usize) -> Result<&[u8]>;

    /// Offset of the next unconsumed byte.
    fn position(&self) -> u64;

    /// Releases the source. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Reads one varint from a source, using the wire decoder over peeked bytes.
pub(crate) async fn read_varint<S: ByteSource + ?Sized>(source: &mut S) -> Result<u64> {
    let decoded = {
        let head = source.peek(MAX_VARINT_LEN).await?;
        UnsignedVarint::decode(head)
    };
    match decoded {
        Ok((varint, consumed)) => {
            source.read_exact(consumed).await?;
            Ok(varint.0)
        }
        Err(VarintDecodeError::Insufficient) => Err(Error::UnexpectedEnd),
        Err(VarintDecodeError::Overflow) => Err(Error::VarintOverflow),
    }
}

/// In-memory slice cursor.
#[derive(Debug)]
pub struct BufferSource {
    data: Vec<u8>,
    pos: usize,
}

impl BufferSource {
    /// Creates a source over a complete archive already in memory
    pub fn new(data: Vec<u8>) -> Self {
        BufferSource { data, pos: 0 }
    }
}

#[async_trait]
impl ByteSource for BufferSource {
    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        if self.data.len() - self.pos < n {
            return Err(Error::UnexpectedEnd);
        }
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    async fn peek(&mut self, n: usize) -> Result<&[u8]> {
        let end = (self.pos + n).min(self.data.len());
        Ok(&self.data[self.pos..end])
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    async fn close(&mut self) -> Result<()> {
        self.data = Vec::new();
        self.pos = 0;
        Ok(())
    }
}

/// Forward-only cursor over an async byte stream with buffered lookahead.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    buf: Vec<u8>,
    pos: u64,
    buffer_size: usize,
    eof: bool,
}

impl<R: AsyncRead + Send + Unpin> StreamSource<R> {
    /// Creates a stream source with the default chunk size
    pub fn new(inner: R) -> Self {
        Self::with_buffer_size(inner, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a stream source filling its lookahead buffer in chunks of
    /// `buffer_size` bytes (clamped to at least 1)
    pub fn with_buffer_size(inner: R, buffer_size: usize) -> Self {
        StreamSource {
            inner,
            buf: Vec::new(),
            pos: 0,
            buffer_size: buffer_size.max(1),
            eof: false,
        }
    }

    async fn fill(&mut self, n: usize) -> Result<()> {
        while self.buf.len() < n && !self.eof {
            let mut chunk = vec![0u8; self.buffer_size];
            let got = self.inner.read(&mut chunk).await?;
            if got == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..got]);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R: AsyncRead + Send + Unpin> ByteSource for StreamSource<R> {
    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n).await?;
        if self.buf.len() < n {
            return Err(Error::UnexpectedEnd);
        }
        let rest = self.buf.split_off(n);
        let out = std::mem::replace(&mut self.buf, rest);
        self.pos += n as u64;
        Ok(out)
    }

    async fn peek(&mut self, n: usize) -> Result<&[u8]> {
        self.fill(n).await?;
        Ok(&self.buf[..n.min(self.buf.len())])
    }

    fn position(&self) -> u64 {
        self.pos
    }

    async fn close(&mut self) -> Result<()> {
        self.buf = Vec::new();
        self.eof = true;
        Ok(())
    }
}

/// Seekable file cursor with chunked forward reads.
///
/// The forward scan tracks its own file offset, so interleaved
/// [`FileSource::read_at`] calls never disturb it.
#[derive(Debug)]
pub struct FileSource {
    file: Option<File>,
    buf: Vec<u8>,
    pos: u64,
    fetch_offset: u64,
    buffer_size: usize,
    eof: bool,
}

impl FileSource {
    /// Opens a file with the default chunk size
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_buffer_size(path, DEFAULT_BUFFER_SIZE).await
    }

    /// Opens a file, scanning forward in chunks of `buffer_size` bytes
    /// (clamped to at least 1)
    pub async fn open_with_buffer_size(
        path: impl AsRef<Path>,
        buffer_size: usize,
    ) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(FileSource {
            file: Some(file),
            buf: Vec::new(),
            pos: 0,
            fetch_offset: 0,
            buffer_size: buffer_size.max(1),
            eof: false,
        })
    }

    /// Chunk size used by the forward scan
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Reads exactly `len` bytes at an absolute file offset.
    pub async fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or(Error::AlreadyClosed)?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut out = vec![0u8; len];
        file.read_exact(&mut out).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::UnexpectedEnd
            } else {
                Error::Io(e)
            }
        })?;
        Ok(out)
    }

    async fn fill(&mut self, n: usize) -> Result<()> {
        while self.buf.len() < n && !self.eof {
            let file = self.file.as_mut().ok_or(Error::AlreadyClosed)?;
            file.seek(SeekFrom::Start(self.fetch_offset)).await?;
            let mut chunk = vec![0u8; self.buffer_size];
            let got = file.read(&mut chunk).await?;
            if got == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..got]);
                self.fetch_offset += got as u64;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        self.fill(n).await?;
        if self.buf.len() < n {
            return Err(Error::UnexpectedEnd);
        }
        let rest = self.buf.split_off(n);
        let out = std::mem::replace(&mut self.buf, rest);
        self.pos += n as u64;
        Ok(out)
    }

    async fn peek(&mut self, n: usize) -> Result<&[u8]> {
        self.fill(n).await?;
        Ok(&self.buf[..n.min(self.buf.len())])
    }

    fn position(&self) -> u64 {
        self.pos
    }

    async fn close(&mut self) -> Result<()> {
        self.file = None;
        self.buf = Vec::new();
        self.eof = true;
        Ok(())
    }
}

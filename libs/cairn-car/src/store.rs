//! Datastore facade over the readers and the writer.
//!
//! A [`CarDatastore`] composes at most one reader and one writer and
//! dispatches the uniform operation set (`get_roots`, `get`, `has`,
//! `query`, `set_roots`, `put`, `delete`, `close`) according to its access
//! [`Mode`]. The per-mode capability matrix is data, not policy scattered
//! through the facade: a disallowed operation fails with
//! [`Error::UnsupportedOperation`] before anything is dispatched.

use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::read::{BlockStream, CarReader, CompleteReader, IndexedReader, StreamingReader};
use crate::source::DEFAULT_BUFFER_SIZE;
use crate::wire::cid::RawCid;
use crate::write::CarWriter;

/// Access mode of a datastore instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Full-buffer decode of resident bytes
    ReadBuffer,
    /// Indexed random access over an archive file
    ReadFileComplete,
    /// Drain a stream, then full in-memory access
    ReadStreamComplete,
    /// Lazy single-pass consumption of a stream
    ReadStreaming,
    /// Streaming append-only encoding to a sink
    WriteStream,
}

/// Which operations a mode permits.
#[derive(Debug, Clone, Copy)]
struct Capabilities {
    get_roots: bool,
    get: bool,
    has: bool,
    query: bool,
    set_roots: bool,
    put: bool,
}

impl Mode {
    fn capabilities(self) -> Capabilities {
        match self {
            Mode::ReadBuffer | Mode::ReadFileComplete | Mode::ReadStreamComplete => Capabilities {
                get_roots: true,
                get: true,
                has: true,
                query: true,
                set_roots: false,
                put: false,
            },
            Mode::ReadStreaming => Capabilities {
                get_roots: true,
                get: false,
                has: false,
                query: true,
                set_roots: false,
                put: false,
            },
            Mode::WriteStream => Capabilities {
                get_roots: false,
                get: false,
                has: false,
                query: false,
                set_roots: true,
                put: true,
            },
        }
    }
}

/// Configuration for the indexed file reader.
#[derive(Debug, Clone, Copy)]
pub struct FileReadOptions {
    /// Chunk size of the indexing scan, in bytes (minimum 1)
    pub buffer_size: usize,
}

impl Default for FileReadOptions {
    fn default() -> Self {
        FileReadOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// User-facing datastore over one CAR archive.
#[derive(Debug)]
pub struct CarDatastore {
    mode: Mode,
    reader: Option<CarReader>,
    writer: Option<CarWriter>,
    closed: bool,
}

impl CarDatastore {
    fn reader_mode(mode: Mode, reader: CarReader) -> Self {
        CarDatastore {
            mode,
            reader: Some(reader),
            writer: None,
            closed: false,
        }
    }

    /// Decodes a complete archive already in memory.
    pub async fn read_buffer(bytes: Vec<u8>) -> Result<Self> {
        let reader = CompleteReader::decode(bytes).await?;
        Ok(Self::reader_mode(
            Mode::ReadBuffer,
            CarReader::Complete(reader),
        ))
    }

    /// Opens an archive file and indexes it for random access.
    pub async fn read_file_complete(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_file_complete_with_options(path, FileReadOptions::default()).await
    }

    /// Opens an archive file with an explicit scan buffer size.
    pub async fn read_file_complete_with_options(
        path: impl AsRef<Path>,
        options: FileReadOptions,
    ) -> Result<Self> {
        let reader = IndexedReader::open_with_buffer_size(path, options.buffer_size.max(1)).await?;
        Ok(Self::reader_mode(
            Mode::ReadFileComplete,
            CarReader::Indexed(reader),
        ))
    }

    /// Drains a forward stream to its end, then behaves like
    /// [`CarDatastore::read_buffer`].
    pub async fn read_stream_complete(stream: impl AsyncRead + Send + Unpin) -> Result<Self> {
        let reader = CompleteReader::from_stream(stream).await?;
        Ok(Self::reader_mode(
            Mode::ReadStreamComplete,
            CarReader::Complete(reader),
        ))
    }

    /// Consumes a forward stream lazily; only `get_roots` and a single
    /// `query` pass are available.
    pub async fn read_streaming(stream: impl AsyncRead + Send + Unpin + 'static) -> Result<Self> {
        let reader = StreamingReader::new(stream).await?;
        Ok(Self::reader_mode(
            Mode::ReadStreaming,
            CarReader::Streaming(reader),
        ))
    }

    /// Creates a write-mode datastore emitting an archive to the sink.
    pub fn write_stream(sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        CarDatastore {
            mode: Mode::WriteStream,
            reader: None,
            writer: Some(CarWriter::new(sink)),
            closed: false,
        }
    }

    /// This datastore's access mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    fn allowed(&self, allowed: bool, op: &'static str) -> Result<()> {
        self.ensure_open()?;
        if !allowed {
            return Err(Error::UnsupportedOperation(op));
        }
        Ok(())
    }

    /// Root CIDs from the archive header
    pub fn get_roots(&self) -> Result<Vec<RawCid>> {
        self.allowed(self.mode.capabilities().get_roots, "get_roots")?;
        match &self.reader {
            Some(reader) => Ok(reader.roots()?.to_vec()),
            None => Err(Error::UnsupportedOperation("get_roots")),
        }
    }

    /// Payload for a CID
    pub async fn get(&mut self, cid: &RawCid) -> Result<Vec<u8>> {
        self.allowed(self.mode.capabilities().get, "get")?;
        match &mut self.reader {
            Some(reader) => reader.get(cid).await,
            None => Err(Error::UnsupportedOperation("get")),
        }
    }

    /// True when the archive contains the CID
    pub async fn has(&mut self, cid: &RawCid) -> Result<bool> {
        self.allowed(self.mode.capabilities().has, "has")?;
        match &mut self.reader {
            Some(reader) => reader.has(cid).await,
            None => Err(Error::UnsupportedOperation("has")),
        }
    }

    /// Lazy sequence of `(key, payload)` pairs, where the key is the
    /// base58btc rendering of the block's CID.
    ///
    /// The optional `prefix` restricts the sequence to keys starting with
    /// it; the filter applies to the yielded stream, never to the index.
    pub fn query(&mut self, prefix: Option<&str>) -> Result<Query<'_>> {
        self.allowed(self.mode.capabilities().query, "query")?;
        let reader = match &mut self.reader {
            Some(reader) => reader,
            None => return Err(Error::UnsupportedOperation("query")),
        };
        Ok(Query {
            stream: reader.query()?,
            prefix: prefix.map(str::to_owned),
        })
    }

    /// Fixes the archive roots; write mode only, before any `put`
    pub async fn set_roots(&self, roots: &[RawCid]) -> Result<()> {
        self.allowed(self.mode.capabilities().set_roots, "set_roots")?;
        match &self.writer {
            Some(writer) => writer.set_roots(roots).await,
            None => Err(Error::UnsupportedOperation("set_roots")),
        }
    }

    /// Appends one block; write mode only
    pub async fn put(&self, cid: &RawCid, payload: &[u8]) -> Result<()> {
        self.allowed(self.mode.capabilities().put, "put")?;
        match &self.writer {
            Some(writer) => writer.put(cid, payload).await,
            None => Err(Error::UnsupportedOperation("put")),
        }
    }

    /// Never supported in any mode
    pub async fn delete(&self, _cid: &RawCid) -> Result<()> {
        self.ensure_open()?;
        Err(Error::UnsupportedOperation("delete"))
    }

    /// Closes the owned reader and writer exactly once; a second close
    /// fails with [`Error::AlreadyClosed`].
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        self.closed = true;
        if let Some(reader) = &mut self.reader {
            reader.close().await?;
        }
        if let Some(writer) = &self.writer {
            writer.close().await?;
        }
        Ok(())
    }
}

/// Lazy `(key, payload)` sequence produced by [`CarDatastore::query`].
pub struct Query<'a> {
    stream: BlockStream<'a>,
    prefix: Option<String>,
}

impl Query<'_> {
    /// Yields the next matching pair, or `None` at the end of the archive.
    pub async fn next(&mut self) -> Result<Option<(String, Vec<u8>)>> {
        loop {
            let (cid, payload) = match self.stream.next().await? {
                Some(pair) => pair,
                None => return Ok(None),
            };
            let key = cid.to_base58();
            if let Some(prefix) = &self.prefix {
                if !key.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            return Ok(Some((key, payload)));
        }
    }
}

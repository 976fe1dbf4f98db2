//! Reader variants for CAR archives.
//!
//! [`CarReader`] wraps one of three variants behind a single contract
//! (roots, get, has, query, close):
//!
//! - [`CompleteReader`]: the whole block set decoded into memory, built
//!   from resident bytes or by draining a stream first. Restartable `query`,
//!   O(1) `get`/`has`.
//! - [`StreamingReader`]: header-only construction over a forward stream;
//!   `query` lazily consumes the stream exactly once, `get`/`has` are
//!   unsupported.
//! - [`IndexedReader`]: one scan of a file builds a [`CarIndex`]; `get` is
//!   a single positioned read of the payload, `query` replays the index.
//!
//! Duplicate CIDs are permitted by the format: `query` yields every
//! occurrence in archive order while `get`/`has` resolve through the
//! last-seen one.

use std::collections::HashMap;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::index::{CarIndex, Indexer};
use crate::source::{read_varint, BufferSource, ByteSource, FileSource, StreamSource};
use crate::wire::cid::RawCid;
use crate::wire::header::CarHeader;
use crate::wire::section::Section;

/// Reads and validates the header frame at the head of a source.
pub(crate) async fn read_header_frame<S: ByteSource + ?Sized>(source: &mut S) -> Result<CarHeader> {
    let header_len = read_varint(source).await?;
    if header_len == 0 {
        return Err(Error::malformed_header("zero-length header"));
    }
    let body = source.read_exact(header_len as usize).await?;
    CarHeader::from_cbor(&body)
}

/// Reads the next block frame, or `None` when the archive ends cleanly at a
/// frame boundary. Running dry anywhere else is [`Error::UnexpectedEnd`].
pub(crate) async fn next_section<S: ByteSource + ?Sized>(source: &mut S) -> Result<Option<Section>> {
    if source.peek(1).await?.is_empty() {
        return Ok(None);
    }
    let frame_len = read_varint(source).await?;
    if frame_len == 0 {
        return Err(Error::malformed_section("zero-length section"));
    }
    let frame = source.read_exact(frame_len as usize).await?;
    Section::parse(&frame).map(Some)
}

/// Reader over a fully decoded in-memory block set.
#[derive(Debug)]
pub struct CompleteReader {
    roots: Vec<RawCid>,
    blocks: Vec<(RawCid, Vec<u8>)>,
    by_key: HashMap<String, usize>,
    closed: bool,
}

impl CompleteReader {
    /// Decodes a complete archive already resident in memory.
    pub async fn decode(bytes: Vec<u8>) -> Result<Self> {
        let mut source = BufferSource::new(bytes);
        let header = read_header_frame(&mut source).await?;
        let mut blocks: Vec<(RawCid, Vec<u8>)> = Vec::new();
        let mut by_key = HashMap::new();
        while let Some(section) = next_section(&mut source).await? {
            let (cid, payload) = section.into_parts();
            by_key.insert(cid.to_base58(), blocks.len());
            blocks.push((cid, payload));
        }
        tracing::debug!(
            blocks = blocks.len(),
            roots = header.roots().len(),
            "decoded archive into memory"
        );
        Ok(CompleteReader {
            roots: header.into_roots(),
            blocks,
            by_key,
            closed: false,
        })
    }

    /// Drains a forward stream to its end, then decodes the collected bytes.
    /// The stream is finished by the time the reader becomes usable.
    pub async fn from_stream(mut stream: impl AsyncRead + Send + Unpin) -> Result<Self> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await?;
        Self::decode(bytes).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    /// Root CIDs from the header
    pub fn roots(&self) -> Result<&[RawCid]> {
        self.ensure_open()?;
        Ok(&self.roots)
    }

    /// Payload for a CID; the last occurrence wins for duplicates
    pub fn get(&self, cid: &RawCid) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let key = cid.to_base58();
        match self.by_key.get(&key) {
            Some(&i) => Ok(self.blocks[i].1.clone()),
            None => Err(Error::NotFound(key)),
        }
    }

    /// True when the archive contains the CID
    pub fn has(&self, cid: &RawCid) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.by_key.contains_key(&cid.to_base58()))
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}

/// Reader that surfaces blocks lazily as they arrive on a forward stream.
pub struct StreamingReader {
    source: Box<dyn ByteSource>,
    roots: Vec<RawCid>,
    iterating: bool,
    exhausted: bool,
    poisoned: Option<Error>,
    closed: bool,
}

impl StreamingReader {
    /// Reads only the header, leaving the stream positioned at the first
    /// block frame.
    pub async fn new(stream: impl AsyncRead + Send + Unpin + 'static) -> Result<Self> {
        let mut source = StreamSource::new(stream);
        let header = read_header_frame(&mut source).await?;
        Ok(StreamingReader {
            source: Box::new(source),
            roots: header.into_roots(),
            iterating: false,
            exhausted: false,
            poisoned: None,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        if let Some(err) = &self.poisoned {
            return Err(err.repeat());
        }
        Ok(())
    }

    /// Root CIDs from the header
    pub fn roots(&self) -> Result<&[RawCid]> {
        self.ensure_open()?;
        Ok(&self.roots)
    }

    fn begin_query(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.iterating && !self.exhausted {
            return Err(Error::ConcurrentIteration);
        }
        self.iterating = true;
        Ok(())
    }

    async fn next_block(&mut self) -> Result<Option<(RawCid, Vec<u8>)>> {
        self.ensure_open()?;
        if self.exhausted {
            return Ok(None);
        }
        match next_section(self.source.as_mut()).await {
            Ok(Some(section)) => Ok(Some(section.into_parts())),
            Ok(None) => {
                self.exhausted = true;
                self.iterating = false;
                Ok(None)
            }
            Err(err) => {
                // Format errors poison the reader; later calls repeat them
                let out = err.repeat();
                self.poisoned = Some(err);
                Err(out)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        self.source.close().await?;
        self.closed = true;
        Ok(())
    }
}

impl std::fmt::Debug for StreamingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingReader")
            .field("roots", &self.roots)
            .field("iterating", &self.iterating)
            .field("exhausted", &self.exhausted)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Random-access reader over an archive file, backed by a one-pass index.
#[derive(Debug)]
pub struct IndexedReader {
    file: FileSource,
    roots: Vec<RawCid>,
    index: CarIndex,
    closed: bool,
}

impl IndexedReader {
    /// Opens and indexes an archive file with the default buffer size.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = FileSource::open(path).await?;
        Self::from_source(source).await
    }

    /// Opens and indexes an archive file, scanning in `buffer_size` chunks.
    pub async fn open_with_buffer_size(
        path: impl AsRef<Path>,
        buffer_size: usize,
    ) -> Result<Self> {
        let source = FileSource::open_with_buffer_size(path, buffer_size).await?;
        Self::from_source(source).await
    }

    async fn from_source(source: FileSource) -> Result<Self> {
        let mut indexer = Indexer::new(source).await?;
        let index = CarIndex::scan(&mut indexer).await?;
        let roots = indexer.roots().to_vec();
        tracing::debug!(blocks = index.len(), "indexed archive file");
        Ok(IndexedReader {
            file: indexer.into_source(),
            roots,
            index,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    /// Root CIDs from the header
    pub fn roots(&self) -> Result<&[RawCid]> {
        self.ensure_open()?;
        Ok(&self.roots)
    }

    /// The index built by the construction-time scan
    pub fn index(&self) -> &CarIndex {
        &self.index
    }

    /// Payload for a CID, read directly from the file
    pub async fn get(&mut self, cid: &RawCid) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let key = cid.to_base58();
        let entry = match self.index.get(&key) {
            Some(entry) => entry,
            None => return Err(Error::NotFound(key)),
        };
        self.file
            .read_at(entry.block_offset, entry.block_length as usize)
            .await
    }

    /// True when the index holds an entry for the CID
    pub fn has(&self, cid: &RawCid) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.index.contains(&cid.to_base58()))
    }

    async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.file.close().await?;
        self.closed = true;
        Ok(())
    }
}

/// A reader for one CAR archive, in one of the three access variants.
#[derive(Debug)]
pub enum CarReader {
    /// Whole block set in memory
    Complete(CompleteReader),
    /// Lazy single-pass stream
    Streaming(StreamingReader),
    /// File plus block index
    Indexed(IndexedReader),
}

impl CarReader {
    /// Root CIDs from the archive header
    pub fn roots(&self) -> Result<&[RawCid]> {
        match self {
            CarReader::Complete(reader) => reader.roots(),
            CarReader::Streaming(reader) => reader.roots(),
            CarReader::Indexed(reader) => reader.roots(),
        }
    }

    /// Payload for a CID. Unsupported on the streaming variant.
    pub async fn get(&mut self, cid: &RawCid) -> Result<Vec<u8>> {
        match self {
            CarReader::Complete(reader) => reader.get(cid),
            CarReader::Streaming(reader) => {
                reader.ensure_open()?;
                Err(Error::UnsupportedOperation("get"))
            }
            CarReader::Indexed(reader) => reader.get(cid).await,
        }
    }

    /// Membership test. Unsupported on the streaming variant.
    pub async fn has(&mut self, cid: &RawCid) -> Result<bool> {
        match self {
            CarReader::Complete(reader) => reader.has(cid),
            CarReader::Streaming(reader) => {
                reader.ensure_open()?;
                Err(Error::UnsupportedOperation("has"))
            }
            CarReader::Indexed(reader) => reader.has(cid),
        }
    }

    /// Lazy sequence of `(CID, payload)` pairs in archive order.
    ///
    /// Restartable on the complete and indexed variants; single-pass on the
    /// streaming variant, where a second query before the first is drained
    /// fails with [`Error::ConcurrentIteration`].
    pub fn query(&mut self) -> Result<BlockStream<'_>> {
        match self {
            CarReader::Complete(reader) => {
                reader.ensure_open()?;
                Ok(BlockStream {
                    inner: BlockStreamInner::Complete {
                        blocks: &reader.blocks,
                        next: 0,
                    },
                })
            }
            CarReader::Streaming(reader) => {
                reader.begin_query()?;
                Ok(BlockStream {
                    inner: BlockStreamInner::Streaming(reader),
                })
            }
            CarReader::Indexed(reader) => {
                reader.ensure_open()?;
                Ok(BlockStream {
                    inner: BlockStreamInner::Indexed { reader, next: 0 },
                })
            }
        }
    }

    /// Closes the reader and its source; a second close fails
    /// [`Error::AlreadyClosed`].
    pub async fn close(&mut self) -> Result<()> {
        match self {
            CarReader::Complete(reader) => reader.close(),
            CarReader::Streaming(reader) => reader.close().await,
            CarReader::Indexed(reader) => reader.close().await,
        }
    }
}

/// Lazy pull iterator over the blocks of one archive.
pub struct BlockStream<'a> {
    inner: BlockStreamInner<'a>,
}

enum BlockStreamInner<'a> {
    Complete {
        blocks: &'a [(RawCid, Vec<u8>)],
        next: usize,
    },
    Streaming(&'a mut StreamingReader),
    Indexed {
        reader: &'a mut IndexedReader,
        next: usize,
    },
}

impl BlockStream<'_> {
    /// Yields the next `(CID, payload)` pair, or `None` at the end of the
    /// archive.
    pub async fn next(&mut self) -> Result<Option<(RawCid, Vec<u8>)>> {
        match &mut self.inner {
            BlockStreamInner::Complete { blocks, next } => match blocks.get(*next) {
                Some((cid, payload)) => {
                    *next += 1;
                    Ok(Some((cid.clone(), payload.clone())))
                }
                None => Ok(None),
            },
            BlockStreamInner::Streaming(reader) => reader.next_block().await,
            BlockStreamInner::Indexed { reader, next } => {
                let entry = match reader.index.entries().get(*next) {
                    Some(entry) => entry.clone(),
                    None => return Ok(None),
                };
                *next += 1;
                let payload = reader
                    .file
                    .read_at(entry.block_offset, entry.block_length as usize)
                    .await?;
                Ok(Some((entry.cid, payload)))
            }
        }
    }
}

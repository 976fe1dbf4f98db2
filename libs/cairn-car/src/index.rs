//! Block index for random-access reads.
//!
//! Scanning an archive once yields one [`IndexEntry`] per block frame,
//! locating the frame's payload (not the outer varint) in the underlying
//! file. [`Indexer`] exposes that scan lazily, one entry at a time, for
//! callers who never need the full map; [`CarIndex`] drains it into an
//! ordered entry list plus a key map for O(1) lookup, where a later entry
//! for the same CID shadows an earlier one.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};
use crate::read::read_header_frame;
use crate::source::{read_varint, ByteSource, FileSource, StreamSource};
use crate::wire::cid::RawCid;
use crate::wire::section::Section;

/// Location of one block's payload inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Base58btc rendering of the CID, the lookup key
    pub key: String,
    /// The block's CID
    pub cid: RawCid,
    /// Absolute offset of the payload bytes
    pub block_offset: u64,
    /// Payload length in bytes
    pub block_length: u64,
}

/// Ordered block index with last-seen-wins key lookup.
#[derive(Debug, Default)]
pub struct CarIndex {
    entries: Vec<IndexEntry>,
    by_key: HashMap<String, usize>,
}

impl CarIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        CarIndex::default()
    }

    /// Drains an [`Indexer`] into a full index
    pub async fn scan<S: ByteSource>(indexer: &mut Indexer<S>) -> Result<CarIndex> {
        let mut index = CarIndex::new();
        while let Some(entry) = indexer.next().await? {
            index.insert(entry);
        }
        Ok(index)
    }

    /// Appends an entry. A repeated key shadows the earlier entry for
    /// lookups while both stay in the ordered entry list.
    pub fn insert(&mut self, entry: IndexEntry) {
        self.by_key.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Looks up the (last-seen) entry for a key
    pub fn get(&self, key: &str) -> Option<&IndexEntry> {
        self.by_key.get(key).map(|&i| &self.entries[i])
    }

    /// True when an entry exists for the key
    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// All entries, in archive order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries (counting duplicates)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the archive holds no blocks
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lazy archive scanner: parses the header on construction, then yields one
/// [`IndexEntry`] per frame without retaining payloads.
#[derive(Debug)]
pub struct Indexer<S> {
    source: S,
    roots: Vec<RawCid>,
    done: bool,
}

impl Indexer<FileSource> {
    /// Opens an archive file for scanning with the default buffer size
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let source = FileSource::open(path).await?;
        Self::new(source).await
    }

    /// Opens an archive file for scanning, reading in `buffer_size` chunks
    pub async fn open_with_buffer_size(
        path: impl AsRef<Path>,
        buffer_size: usize,
    ) -> Result<Self> {
        let source = FileSource::open_with_buffer_size(path, buffer_size).await?;
        Self::new(source).await
    }
}

impl<R: AsyncRead + Send + Unpin> Indexer<StreamSource<R>> {
    /// Scans an archive arriving on a forward byte stream
    pub async fn from_stream(stream: R) -> Result<Self> {
        Self::new(StreamSource::new(stream)).await
    }
}

impl<S: ByteSource> Indexer<S> {
    /// Wraps any byte source, reading and validating the header up front
    pub async fn new(mut source: S) -> Result<Self> {
        let header = read_header_frame(&mut source).await?;
        Ok(Indexer {
            source,
            roots: header.into_roots(),
            done: false,
        })
    }

    /// Root CIDs from the archive header
    pub fn roots(&self) -> &[RawCid] {
        &self.roots
    }

    /// Yields the next entry, or `None` once the archive ends cleanly.
    pub async fn next(&mut self) -> Result<Option<IndexEntry>> {
        if self.done {
            return Ok(None);
        }
        if self.source.peek(1).await?.is_empty() {
            self.done = true;
            return Ok(None);
        }
        let frame_len = read_varint(&mut self.source).await?;
        if frame_len == 0 {
            return Err(Error::malformed_section("zero-length section"));
        }
        let body_start = self.source.position();
        let frame = self.source.read_exact(frame_len as usize).await?;
        let section = Section::parse(&frame)?;
        let (cid, _) = section.into_parts();
        let cid_len = cid.len() as u64;
        Ok(Some(IndexEntry {
            key: cid.to_base58(),
            block_offset: body_start + cid_len,
            block_length: frame_len - cid_len,
            cid,
        }))
    }

    /// Releases the scanner, handing back its source
    pub fn into_source(self) -> S {
        self.source
    }
}

/// Reads a single block payload given a previously scanned entry.
pub async fn read_raw(file: &mut File, entry: &IndexEntry) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(entry.block_offset)).await?;
    let mut payload = vec![0u8; entry.block_length as usize];
    file.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEnd
        } else {
            Error::Io(e)
        }
    })?;
    Ok(payload)
}

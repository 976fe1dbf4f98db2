//! Streaming, append-only CAR encoder.
//!
//! The writer owns its sink and runs a small header latch: it starts
//! `pre-header`, moves to `post-header` when the header frame goes out (an
//! explicit [`CarWriter::set_roots`], or an automatic empty-roots header on
//! the first [`CarWriter::put`]), and ends `closed`. `set_roots` is legal
//! only while `pre-header`; blocks append in submission order after it.
//!
//! All methods take `&self`: the sink sits behind a fair async mutex, so a
//! caller may issue a batch of `put`s without awaiting each (for example
//! through `futures::future::join_all`) and the emitted byte order still
//! matches the submission order. A sink error is fatal; the writer moves
//! straight to `closed` and every later operation fails
//! [`Error::AlreadyClosed`].

use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::wire::cid::{CidFormatError, RawCid};
use crate::wire::header::CarHeader;
use crate::wire::section::encode_frame;

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    PreHeader,
    PostHeader,
    Closed,
}

struct WriterInner {
    sink: Sink,
    state: WriterState,
}

impl WriterInner {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self.sink.write_all(bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Sink errors are fatal
                self.state = WriterState::Closed;
                Err(Error::Io(e))
            }
        }
    }

    async fn write_header(&mut self, roots: Vec<RawCid>) -> Result<()> {
        let bytes = CarHeader::new(roots).encode();
        self.write(&bytes).await?;
        self.state = WriterState::PostHeader;
        Ok(())
    }
}

/// Streaming encoder emitting one valid archive to its sink.
pub struct CarWriter {
    inner: Arc<Mutex<WriterInner>>,
}

impl CarWriter {
    /// Creates a writer over a byte sink. Nothing is written until the
    /// first `set_roots` or `put`.
    pub fn new(sink: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        CarWriter {
            inner: Arc::new(Mutex::new(WriterInner {
                sink: Box::new(sink),
                state: WriterState::PreHeader,
            })),
        }
    }

    /// Writes the header frame with the given roots.
    ///
    /// Legal exactly once, before any `put`; afterwards it fails with
    /// [`Error::HeaderAlreadyWritten`]. Each root must be a well-formed CID
    /// ([`Error::InvalidRoots`] otherwise) of version ≥ 1.
    pub async fn set_roots(&self, roots: &[RawCid]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            WriterState::Closed => Err(Error::AlreadyClosed),
            WriterState::PostHeader => Err(Error::HeaderAlreadyWritten),
            WriterState::PreHeader => {
                for root in roots {
                    check_cid(root).map_err(|e| match e {
                        CidError::UnsupportedVersion(v) => Error::UnsupportedCidVersion(v),
                        CidError::Invalid(msg) => Error::InvalidRoots(msg),
                    })?;
                }
                inner.write_header(roots.to_vec()).await
            }
        }
    }

    /// Appends one block frame, writing the empty-roots header first if
    /// none has been written yet.
    pub async fn put(&self, cid: &RawCid, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == WriterState::Closed {
            return Err(Error::AlreadyClosed);
        }
        check_cid(cid).map_err(|e| match e {
            CidError::UnsupportedVersion(v) => Error::UnsupportedCidVersion(v),
            CidError::Invalid(msg) => Error::InvalidBlock(msg),
        })?;
        if inner.state == WriterState::PreHeader {
            inner.write_header(Vec::new()).await?;
        }
        let frame = encode_frame(cid, payload);
        inner.write(&frame).await
    }

    /// Archives are append-only; always fails with
    /// [`Error::UnsupportedOperation`].
    pub async fn delete(&self, _cid: &RawCid) -> Result<()> {
        Err(Error::UnsupportedOperation("delete"))
    }

    /// Flushes and shuts the sink down. A writer still `pre-header` emits
    /// the empty-roots header first, so a closed archive always decodes.
    /// A second close fails with [`Error::AlreadyClosed`].
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == WriterState::Closed {
            return Err(Error::AlreadyClosed);
        }
        if inner.state == WriterState::PreHeader {
            inner.write_header(Vec::new()).await?;
        }
        if let Err(e) = inner.sink.flush().await {
            inner.state = WriterState::Closed;
            return Err(Error::Io(e));
        }
        let shutdown = inner.sink.shutdown().await;
        inner.state = WriterState::Closed;
        shutdown.map_err(Error::Io)
    }
}

impl std::fmt::Debug for CarWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarWriter").finish_non_exhaustive()
    }
}

enum CidError {
    UnsupportedVersion(u64),
    Invalid(String),
}

fn check_cid(cid: &RawCid) -> std::result::Result<(), CidError> {
    cid.check().map_err(|e| match e {
        CidFormatError::UnsupportedVersion(v) => CidError::UnsupportedVersion(v),
        other => CidError::Invalid(other.to_string()),
    })
}

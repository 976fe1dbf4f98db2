//! Error types for cairn-car

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the CAR codec, readers, writer and datastore facade
#[derive(Error, Debug)]
pub enum Error {
    /// Source ran out of bytes mid-varint or mid-frame
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// Varint needs more than 9 bytes
    #[error("varint exceeds 9 bytes")]
    VarintOverflow,

    /// Header is not a CBOR map with exactly `roots` and `version`
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Header carries a version other than 1
    #[error("unsupported CAR version {0}, expected 1")]
    UnsupportedVersion(u64),

    /// A CIDv0 (or otherwise unsupported CID version) was seen
    #[error("unsupported CID version {0}")]
    UnsupportedCidVersion(u64),

    /// Frame length disagrees with CID length + payload
    #[error("malformed section: {0}")]
    MalformedSection(String),

    /// `set_roots` argument is not a sequence of well-formed CIDs
    #[error("invalid roots: {0}")]
    InvalidRoots(String),

    /// `put` argument is not a well-formed CID plus bytes
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// `set_roots` called after the writer left its pre-header state
    #[error("header has already been written")]
    HeaderAlreadyWritten,

    /// Operation on a closed reader, writer or datastore
    #[error("already closed")]
    AlreadyClosed,

    /// Capability matrix violation for the current access mode
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Second `query` on a streaming reader before the first is drained
    #[error("a query is already in progress")]
    ConcurrentIteration,

    /// `get` for a CID the archive does not contain
    #[error("block not found: {0}")]
    NotFound(String),

    /// I/O errors from the underlying source or sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a malformed-header error
    pub fn malformed_header(msg: impl Into<String>) -> Self {
        Error::MalformedHeader(msg.into())
    }

    /// Create a malformed-section error
    pub fn malformed_section(msg: impl Into<String>) -> Self {
        Error::MalformedSection(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Reproduce an equivalent error.
    ///
    /// A reader that raised a format error is poisoned and keeps failing with
    /// the same error until closed; this rebuilds the stored error for each
    /// later call (`io::Error` is not `Clone`, so it is rebuilt from its kind
    /// and message).
    pub(crate) fn repeat(&self) -> Error {
        match self {
            Error::UnexpectedEnd => Error::UnexpectedEnd,
            Error::VarintOverflow => Error::VarintOverflow,
            Error::MalformedHeader(s) => Error::MalformedHeader(s.clone()),
            Error::UnsupportedVersion(v) => Error::UnsupportedVersion(*v),
            Error::UnsupportedCidVersion(v) => Error::UnsupportedCidVersion(*v),
            Error::MalformedSection(s) => Error::MalformedSection(s.clone()),
            Error::InvalidRoots(s) => Error::InvalidRoots(s.clone()),
            Error::InvalidBlock(s) => Error::InvalidBlock(s.clone()),
            Error::HeaderAlreadyWritten => Error::HeaderAlreadyWritten,
            Error::AlreadyClosed => Error::AlreadyClosed,
            Error::UnsupportedOperation(op) => Error::UnsupportedOperation(op),
            Error::ConcurrentIteration => Error::ConcurrentIteration,
            Error::NotFound(s) => Error::NotFound(s.clone()),
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

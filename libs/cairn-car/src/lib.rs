//! cairn-car is a Rust library for reading and writing CAR (Content
//! Addressable aRchive) v1 files, the container format used in the IPFS
//! ecosystem to ship sets of content-addressed blocks.
//!
//! An archive is a varint-prefixed CBOR header (`{roots, version: 1}`)
//! followed by a concatenation of length-prefixed `(CID, payload)` frames.
//! The library keeps the wire format in a small sans-io layer ([`wire`])
//! and builds four async access modes on top of it, all surfaced through
//! the [`CarDatastore`] facade:
//!
//! - [`CarDatastore::read_buffer`]: decode a whole archive resident in memory
//! - [`CarDatastore::read_stream_complete`]: drain a stream, then the same
//! - [`CarDatastore::read_streaming`]: consume a stream lazily, block by block
//! - [`CarDatastore::read_file_complete`]: index a file once, then serve
//!   point lookups with one positioned read each
//! - [`CarDatastore::write_stream`]: emit a valid archive to a sink, one
//!   block at a time
//!
//! The lower layers stay public for callers who want them directly: the
//! [`Indexer`] scanner yields block locations without building a map,
//! [`read_raw`] fetches one payload from a prior [`IndexEntry`], and
//! [`complete_graph`] archives everything reachable from a root through
//! caller-provided block loading and link enumeration.
//!
//! ## Usage
//!
//! ### Write an archive through an in-memory pipe and read it back
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cairn_car::Result<()> {
//! use cairn_car::{CarDatastore, RawCid};
//! use tokio::io::AsyncReadExt;
//!
//! // CIDv1, raw codec, identity multihash
//! let cid = RawCid::from_bytes(vec![0x01, 0x55, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
//!
//! let (tx, mut rx) = tokio::io::duplex(64 * 1024);
//! let mut store = CarDatastore::write_stream(tx);
//! store.set_roots(std::slice::from_ref(&cid)).await?;
//! store.put(&cid, b"block payload").await?;
//! store.close().await?;
//!
//! let mut bytes = Vec::new();
//! rx.read_to_end(&mut bytes).await?;
//! let mut archive = CarDatastore::read_buffer(bytes).await?;
//! assert_eq!(archive.get_roots()?, vec![cid.clone()]);
//! assert_eq!(archive.get(&cid).await?, b"block payload");
//! archive.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Alternatives
//!
//! Alternatives to this library include:
//! - [rs-car](https://crates.io/crates/rs-car)
//! - [rust-car](https://crates.io/crates/rust-car)
//! - [blockless-car](https://crates.io/crates/blockless-car)

pub mod error;
pub mod index;
pub mod read;
pub mod source;
pub mod store;
pub mod walk;
pub mod wire;
pub mod write;

pub use error::{Error, Result};
pub use index::{read_raw, CarIndex, IndexEntry, Indexer};
pub use read::{BlockStream, CarReader, CompleteReader, IndexedReader, StreamingReader};
pub use source::{BufferSource, ByteSource, FileSource, StreamSource, DEFAULT_BUFFER_SIZE};
pub use store::{CarDatastore, FileReadOptions, Mode, Query};
pub use walk::{complete_graph, BlockLoader, LinkEnumerator, WalkOptions, RAW_CODEC};
pub use wire::cid::RawCid;
pub use wire::header::CarHeader;
pub use wire::section::Section;
pub use write::CarWriter;

//! Wire-format types for CAR archives: varint framing, CIDs, the CBOR
//! header and block sections. Everything here operates on resident byte
//! slices; the async access layer lives above it.

pub mod cid;
pub mod header;
pub mod section;
pub mod varint;

use crate::error::{Error, Result};
use crate::wire::cid::{CidFormatError, RawCid};
use crate::wire::varint::UnsignedVarint;

/// A Section is one block frame of a CAR file: a CID and its payload,
/// carried on the wire as `varint(len(cid) + len(payload)) ‖ cid ‖ payload`.
///
/// The payload is opaque to the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    cid: RawCid,
    payload: Vec<u8>,
}

impl Section {
    /// Creates a new Section
    pub fn new(cid: RawCid, payload: Vec<u8>) -> Self {
        Section { cid, payload }
    }

    /// Returns the CID of the section
    pub fn cid(&self) -> &RawCid {
        &self.cid
    }

    /// Returns the payload bytes of the section
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Splits the section into its CID and payload
    pub fn into_parts(self) -> (RawCid, Vec<u8>) {
        (self.cid, self.payload)
    }

    /// Length of the frame body (CID plus payload, excluding the varint)
    pub fn frame_len(&self) -> u64 {
        (self.cid.len() + self.payload.len()) as u64
    }

    /// Converts the Section into its wire bytes, varint prefix included
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_frame(&self.cid, &self.payload)
    }

    /// Parses a Section from a complete frame body (the `L` bytes following
    /// the length varint).
    ///
    /// The CID is prefix-parsed from the head of the body; whatever remains
    /// is the payload, which may be empty. A CID that fails to parse or
    /// over-runs the frame is a [`Error::MalformedSection`]; CIDv0 is
    /// rejected with [`Error::UnsupportedCidVersion`].
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.is_empty() {
            return Err(Error::malformed_section("zero-length section"));
        }
        let (cid, cid_size) = RawCid::try_read_bytes(frame).map_err(|e| match e {
            CidFormatError::UnsupportedVersion(v) => Error::UnsupportedCidVersion(v),
            CidFormatError::Insufficient => Error::malformed_section("CID over-runs the section"),
            CidFormatError::Malformed(m) => Error::malformed_section(m),
        })?;
        let payload = frame[cid_size..].to_vec();
        Ok(Section::new(cid, payload))
    }
}

/// Encodes one block frame: `varint(len(cid) + len(payload)) ‖ cid ‖ payload`
pub fn encode_frame(cid: &RawCid, payload: &[u8]) -> Vec<u8> {
    let length_varint = UnsignedVarint((cid.len() + payload.len()) as u64).encode();
    let mut bytes = Vec::with_capacity(length_varint.len() + cid.len() + payload.len());
    bytes.extend_from_slice(&length_varint);
    bytes.extend_from_slice(cid.bytes());
    bytes.extend_from_slice(payload);
    bytes
}

use ciborium::Value;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::wire::varint::{UnsignedVarint, VarintDecodeError};

/// Wire form of a CIDv0: a bare sha2-256 multihash.
const CID_V0_PREFIX: [u8; 2] = [0x12, 0x20];

/// Represents a raw CID (Content Identifier) in byte format.
///
/// The codec treats a CID as an opaque encoded byte sequence with a known
/// length. [`RawCid::try_read_bytes`] prefix-parses one from the head of a
/// buffer and reports how many bytes it consumed; CIDs of version 0 are
/// rejected outright. Equality and hashing are defined on the encoded bytes,
/// and [`RawCid::to_base58`] gives the base58btc rendering used as a mapping
/// key throughout the crate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RawCid(Vec<u8>);

impl RawCid {
    /// Creates a new RawCid from a vector of bytes, without validation.
    ///
    /// Use [`RawCid::from_bytes`] when the bytes come from outside and need
    /// to be checked.
    pub fn new(bytes: Vec<u8>) -> Self {
        RawCid(bytes)
    }

    /// Creates a RawCid from a whole buffer, validating that it parses as a
    /// single supported CID with no trailing bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CidFormatError> {
        let cid = RawCid(bytes);
        cid.check()?;
        Ok(cid)
    }

    /// Creates a RawCid from a hexadecimal string representation
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        Ok(RawCid::new(bytes))
    }

    /// Returns the byte representation of the RawCid
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the encoded form is empty (never the case for a valid CID)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Base58btc rendering of the encoded bytes, used as a mapping key.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// CID version tag.
    ///
    /// Meaningful only for well-formed CIDs; returns 0 for the CIDv0 wire
    /// form and for garbage.
    pub fn version(&self) -> u64 {
        if self.0.starts_with(&CID_V0_PREFIX) {
            return 0;
        }
        match UnsignedVarint::decode(&self.0) {
            Ok((v, _)) => v.0,
            Err(_) => 0,
        }
    }

    /// Multicodec tag of the content this CID addresses.
    ///
    /// Meaningful only for well-formed CIDs; CIDv0 always addressed
    /// dag-protobuf (0x70).
    pub fn codec(&self) -> u64 {
        if self.0.starts_with(&CID_V0_PREFIX) {
            return 0x70;
        }
        let Ok((_, version_size)) = UnsignedVarint::decode(&self.0) else {
            return 0;
        };
        match UnsignedVarint::decode(&self.0[version_size..]) {
            Ok((codec, _)) => codec.0,
            Err(_) => 0,
        }
    }

    /// Validates that the encoded bytes are exactly one supported CID.
    pub fn check(&self) -> Result<(), CidFormatError> {
        let (_, consumed) = Self::try_read_bytes(&self.0)?;
        if consumed != self.0.len() {
            return Err(CidFormatError::Malformed("trailing bytes after CID"));
        }
        Ok(())
    }

    /// Prefix-parses a CID from the head of a buffer.
    ///
    /// Reads `varint(version) ‖ varint(codec) ‖ multihash` and returns the
    /// CID together with the number of bytes it consumed. The CIDv0 wire
    /// form (a bare `0x12 0x20` sha2-256 multihash) and an explicit version
    /// varint of 0 are both rejected with
    /// [`CidFormatError::UnsupportedVersion`].
    pub fn try_read_bytes(bytes: &[u8]) -> Result<(Self, usize), CidFormatError> {
        if bytes.len() < 2 {
            return Err(CidFormatError::Insufficient);
        }
        if bytes.starts_with(&CID_V0_PREFIX) {
            return Err(CidFormatError::UnsupportedVersion(0));
        }
        let (version, version_size) = decode_cid_varint(bytes)?;
        if version == 0 {
            return Err(CidFormatError::UnsupportedVersion(0));
        }
        // Multicodec tag
        let codec_start = version_size;
        let (_codec, codec_size) = decode_cid_varint(&bytes[codec_start..])?;
        // Multihash: code, digest length, digest
        let mh_start = codec_start + codec_size;
        let (_mh_code, mh_code_size) = decode_cid_varint(&bytes[mh_start..])?;
        let mh_len_start = mh_start + mh_code_size;
        let (mh_len, mh_len_size) = decode_cid_varint(&bytes[mh_len_start..])?;
        let total_cid_size = mh_len_start + mh_len_size + mh_len as usize;
        if bytes.len() < total_cid_size {
            return Err(CidFormatError::Insufficient);
        }
        let cid_bytes = bytes[..total_cid_size].to_vec();
        Ok((RawCid::new(cid_bytes), total_cid_size))
    }
}

fn decode_cid_varint(bytes: &[u8]) -> Result<(u64, usize), CidFormatError> {
    match UnsignedVarint::decode(bytes) {
        Ok((v, n)) => Ok((v.0, n)),
        Err(VarintDecodeError::Insufficient) => Err(CidFormatError::Insufficient),
        Err(VarintDecodeError::Overflow) => {
            Err(CidFormatError::Malformed("varint overflow inside CID"))
        }
    }
}

impl std::fmt::Debug for RawCid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawCid({})", hex::encode(&self.0))
    }
}

impl std::fmt::Display for RawCid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

// In CBOR (and thus in the CAR header) a CID is an IPLD link: tag 42 around
// the encoded bytes with a leading 0x00 identity-multibase prefix.
impl Serialize for RawCid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut link = Vec::with_capacity(self.0.len() + 1);
        link.push(0x00);
        link.extend_from_slice(&self.0);
        let value = Value::Tag(42, Box::new(Value::Bytes(link)));
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawCid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if let Value::Tag(42, boxed_value) = value {
            if let Value::Bytes(bytes) = *boxed_value {
                return match bytes.split_first() {
                    Some((0x00, cid)) => Ok(RawCid::new(cid.to_vec())),
                    _ => Err(D::Error::custom(
                        "CID link missing identity multibase prefix",
                    )),
                };
            }
        }
        Err(D::Error::custom("Invalid CID format"))
    }
}

/// Errors raised while parsing or validating a CID
#[derive(thiserror::Error, Debug)]
pub enum CidFormatError {
    #[error("insufficient data for CID")]
    Insufficient,
    #[error("unsupported CID version {0}")]
    UnsupportedVersion(u64),
    #[error("malformed CID: {0}")]
    Malformed(&'static str),
}

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wire::cid::{CidFormatError, RawCid};
use crate::wire::varint::UnsignedVarint;

/// CAR header structure
///
/// A CBOR map with exactly two keys: the root CIDs of the graph the archive
/// carries and the format version, which is always 1. On the wire the map is
/// prefixed with a varint byte length, like every other frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarHeader {
    roots: Vec<RawCid>,
    version: u64,
}

impl CarHeader {
    /// Creates a new header with the specified root CIDs
    pub fn new(roots: Vec<RawCid>) -> Self {
        CarHeader { roots, version: 1 }
    }

    /// Returns the version of the CAR format
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns a reference to the vector of root CIDs
    pub fn roots(&self) -> &[RawCid] {
        &self.roots
    }

    /// Consumes the header, returning the root CIDs
    pub fn into_roots(self) -> Vec<RawCid> {
        self.roots
    }

    /// Checks if there are no root CIDs in the header
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Serializes the header map to canonical CBOR (without the varint prefix)
    pub fn to_cbor(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .expect("Failed to serialize CAR header -- it is a bug if this happens");
        bytes
    }

    /// Encodes the complete header frame: `varint(len) ‖ cbor`
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_cbor();
        let length_varint = UnsignedVarint(bytes.len() as u64).encode();
        bytes.splice(0..0, length_varint);
        bytes
    }

    /// Decodes and validates a header from its CBOR map bytes (the frame
    /// body, without the varint prefix).
    ///
    /// Fails with [`Error::MalformedHeader`] when the bytes are not a CBOR
    /// map with the expected keys and types, [`Error::UnsupportedVersion`]
    /// when the version is not 1, and [`Error::UnsupportedCidVersion`] when
    /// any root is a CIDv0.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        let header: CarHeader = ciborium::de::from_reader(bytes)
            .map_err(|e| Error::malformed_header(e.to_string()))?;
        if header.version != 1 {
            return Err(Error::UnsupportedVersion(header.version));
        }
        for root in &header.roots {
            root.check().map_err(|e| match e {
                CidFormatError::UnsupportedVersion(v) => Error::UnsupportedCidVersion(v),
                other => Error::malformed_header(format!("bad root CID: {other}")),
            })?;
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::Value;

    const CAR_V1_HEADER1: [u8; 99] = [
        0xA2, 0x65, 0x72, 0x6F, 0x6F, 0x74, 0x73, 0x82, 0xD8, 0x2A, 0x58, 0x25, 0x00, 0x01, 0x71,
        0x12, 0x20, 0xF8, 0x8B, 0xC8, 0x53, 0x80, 0x4C, 0xF2, 0x94, 0xFE, 0x41, 0x7E, 0x4F, 0xA8,
        0x30, 0x28, 0x68, 0x9F, 0xCD, 0xB1, 0xB1, 0x59, 0x2C, 0x51, 0x02, 0xE1, 0x47, 0x4D, 0xBC,
        0x20, 0x0F, 0xAB, 0x8B, 0xD8, 0x2A, 0x58, 0x25, 0x00, 0x01, 0x71, 0x12, 0x20, 0x69, 0xEA,
        0x07, 0x40, 0xF9, 0x80, 0x7A, 0x28, 0xF4, 0xD9, 0x32, 0xC6, 0x2E, 0x7C, 0x1C, 0x83, 0xBE,
        0x05, 0x5E, 0x55, 0x07, 0x2C, 0x90, 0x26, 0x6A, 0xB3, 0xE7, 0x9D, 0xF6, 0x3A, 0x36, 0x5B,
        0x67, 0x76, 0x65, 0x72, 0x73, 0x69, 0x6F, 0x6E, 0x01,
    ];

    fn header_roots() -> (RawCid, RawCid) {
        let cid1 = RawCid::from_hex(
            "01711220f88bc853804cf294fe417e4fa83028689fcdb1b1592c5102e1474dbc200fab8b",
        )
        .unwrap();
        let cid2 = RawCid::from_hex(
            "0171122069ea0740f9807a28f4d932c62e7c1c83be055e55072c90266ab3e79df63a365b",
        )
        .unwrap();
        (cid1, cid2)
    }

    #[test]
    fn test_header_decoding() {
        let header = CarHeader::from_cbor(&CAR_V1_HEADER1).unwrap();
        let (cid1, cid2) = header_roots();
        assert_eq!(header.version(), 1);
        assert_eq!(header.roots().len(), 2);
        assert_eq!(header.roots()[0], cid1);
        assert_eq!(header.roots()[1], cid2);
    }

    #[test]
    fn test_header_encoding_is_byte_exact() {
        let (cid1, cid2) = header_roots();
        let header = CarHeader::new(vec![cid1, cid2]);
        assert_eq!(header.to_cbor(), CAR_V1_HEADER1.to_vec());

        // The full frame carries the varint length prefix
        let mut expected = vec![0x63];
        expected.extend_from_slice(&CAR_V1_HEADER1);
        assert_eq!(header.encode(), expected);
    }

    #[test]
    fn test_header_round_trip() {
        let (cid1, cid2) = header_roots();
        let header = CarHeader::new(vec![cid1, cid2]);
        let decoded = CarHeader::from_cbor(&header.to_cbor()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_empty_header_length() {
        // {roots: [], version: 1} is 17 bytes of CBOR plus a one-byte varint
        let header = CarHeader::new(Vec::new());
        let encoded = header.encode();
        assert_eq!(encoded.len(), 18);
        assert_eq!(encoded[0], 0x11);
        assert!(CarHeader::from_cbor(&encoded[1..]).unwrap().is_empty());
    }

    #[test]
    fn test_header_version_rejected() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(
            &Value::Map(vec![
                (Value::Text("roots".into()), Value::Array(vec![])),
                (Value::Text("version".into()), Value::Integer(2.into())),
            ]),
            &mut bytes,
        )
        .unwrap();
        let result = CarHeader::from_cbor(&bytes);
        assert!(matches!(result, Err(Error::UnsupportedVersion(2))));
    }

    #[test]
    fn test_header_unknown_key_rejected() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(
            &Value::Map(vec![
                (Value::Text("roots".into()), Value::Array(vec![])),
                (Value::Text("version".into()), Value::Integer(1.into())),
                (Value::Text("extra".into()), Value::Integer(7.into())),
            ]),
            &mut bytes,
        )
        .unwrap();
        let result = CarHeader::from_cbor(&bytes);
        assert!(matches!(result, Err(Error::MalformedHeader(_))));
    }

    #[test]
    fn test_header_roots_not_a_list_rejected() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(
            &Value::Map(vec![
                (Value::Text("roots".into()), Value::Integer(1.into())),
                (Value::Text("version".into()), Value::Integer(1.into())),
            ]),
            &mut bytes,
        )
        .unwrap();
        let result = CarHeader::from_cbor(&bytes);
        assert!(matches!(result, Err(Error::MalformedHeader(_))));
    }

    #[test]
    fn test_header_not_a_map_rejected() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&Value::Array(vec![]), &mut bytes).unwrap();
        let result = CarHeader::from_cbor(&bytes);
        assert!(matches!(result, Err(Error::MalformedHeader(_))));
    }

    #[test]
    fn test_header_cidv0_root_rejected() {
        let v0 =
            hex::decode("12200E7071C59DF3B9454D1D18A15270AA36D54F89606A576DC621757AFD44AD1D2E")
                .unwrap();
        let mut link = vec![0x00];
        link.extend_from_slice(&v0);
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(
            &Value::Map(vec![
                (
                    Value::Text("roots".into()),
                    Value::Array(vec![Value::Tag(42, Box::new(Value::Bytes(link)))]),
                ),
                (Value::Text("version".into()), Value::Integer(1.into())),
            ]),
            &mut bytes,
        )
        .unwrap();
        let result = CarHeader::from_cbor(&bytes);
        assert!(matches!(result, Err(Error::UnsupportedCidVersion(0))));
    }
}

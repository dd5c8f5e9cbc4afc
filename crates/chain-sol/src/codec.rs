//! Hex byte codec used wherever signatures or serialized messages cross a
//! network call.
//!
//! `encode` always produces lowercase, even-length hex without a prefix.
//! `decode` accepts an optional `0x` marker and rejects odd-length input or
//! non-hex characters with [`SolError::MalformedEncoding`].

use crate::error::SolError;

/// Optional marker in front of hex payloads received from the wire.
pub const HEX_PREFIX: &str = "0x";

/// Encode raw bytes as lowercase hex.
pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string, stripping the optional `0x` marker first.
pub fn decode(input: &str) -> Result<Vec<u8>, SolError> {
    let digits = input.strip_prefix(HEX_PREFIX).unwrap_or(input);

    if digits.len() % 2 != 0 {
        return Err(SolError::MalformedEncoding(format!(
            "hex string has odd length {}",
            digits.len()
        )));
    }

    hex::decode(digits).map_err(|e| SolError::MalformedEncoding(format!("invalid hex: {e}")))
}

/// Decode a hex string into a fixed-size array.
pub fn decode_array<const N: usize>(input: &str) -> Result<[u8; N], SolError> {
    let bytes = decode(input)?;
    bytes.try_into().map_err(|v: Vec<u8>| {
        SolError::MalformedEncoding(format!("expected {N} bytes, got {}", v.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_lowercase() {
        assert_eq!(encode(&[0xAB, 0xCD, 0x01]), "abcd01");
    }

    #[test]
    fn encode_empty() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn decode_strips_prefix() {
        assert_eq!(decode("0xdeadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn decode_odd_length_fails() {
        let err = decode("abc").unwrap_err();
        assert!(matches!(err, SolError::MalformedEncoding(_)));
        assert!(err.to_string().contains("odd length"));
    }

    #[test]
    fn decode_odd_length_after_prefix_fails() {
        assert!(matches!(decode("0x1"), Err(SolError::MalformedEncoding(_))));
    }

    #[test]
    fn decode_non_hex_fails() {
        assert!(matches!(decode("zz00"), Err(SolError::MalformedEncoding(_))));
    }

    #[test]
    fn decode_array_checks_length() {
        let ok: [u8; 2] = decode_array("0102").unwrap();
        assert_eq!(ok, [1, 2]);

        let err = decode_array::<64>("0102").unwrap_err();
        assert!(err.to_string().contains("expected 64 bytes, got 2"));
    }
}

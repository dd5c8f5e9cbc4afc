//! Solana address parsing and validation.
//!
//! Solana addresses are Base58-encoded 32-byte Ed25519 public keys (or
//! program-derived addresses, which are 32 bytes off the curve). Textual
//! input is shape-checked before it is decoded so malformed input never gets
//! as far as a network call.

use std::fmt;
use std::str::FromStr;

use crate::error::SolError;

/// The Bitcoin Base58 alphabet used by Solana (and the `bs58` crate default).
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shortest and longest Base58 renderings of 32 bytes.
pub const MIN_ADDRESS_LEN: usize = 32;
pub const MAX_ADDRESS_LEN: usize = 44;

/// A 32-byte Solana account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = SolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        address_to_bytes(s).map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bytes_to_address(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Check the textual shape of an address: 32–44 characters, all drawn from
/// the Base58 alphabet.
pub fn check_address_shape(address: &str) -> Result<(), SolError> {
    let len = address.chars().count();
    if !(MIN_ADDRESS_LEN..=MAX_ADDRESS_LEN).contains(&len) {
        return Err(SolError::InvalidAddress(format!(
            "expected {MIN_ADDRESS_LEN}-{MAX_ADDRESS_LEN} characters, got {len}"
        )));
    }

    if let Some(bad) = address.chars().find(|c| !BASE58_ALPHABET.contains(*c)) {
        return Err(SolError::InvalidAddress(format!(
            "character {bad:?} is not in the base58 alphabet"
        )));
    }

    Ok(())
}

/// Validate a Solana address string.
///
/// A valid address passes [`check_address_shape`] and decodes to exactly
/// 32 bytes.
pub fn validate_address(address: &str) -> Result<bool, SolError> {
    address_to_bytes(address).map(|_| true)
}

/// Decode a Solana address string to its 32-byte representation.
pub fn address_to_bytes(address: &str) -> Result<[u8; 32], SolError> {
    check_address_shape(address)?;

    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| SolError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        SolError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })?;

    Ok(arr)
}

/// Encode 32 bytes as a Solana address (Base58 string).
pub fn bytes_to_address(bytes: &[u8; 32]) -> String {
    bs58::encode(bytes).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The System Program address is 32 zero bytes, which encodes to
    /// "11111111111111111111111111111111" in Base58.
    #[test]
    fn system_program_address() {
        let addr = Address::new([0u8; 32]);
        assert_eq!(addr.to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn roundtrip_encode_decode() {
        let address = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
        let parsed: Address = address.parse().unwrap();
        assert_eq!(parsed.to_string(), address);
    }

    #[test]
    fn validate_token_program_address() {
        assert!(validate_address("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA").unwrap());
    }

    #[test]
    fn garbage_fails_shape_check() {
        let err = validate_address("not-a-valid-address!!!").unwrap_err();
        assert!(matches!(err, SolError::InvalidAddress(_)));
    }

    #[test]
    fn too_short_fails_shape_check() {
        let err = check_address_shape("1").unwrap_err();
        assert!(err.to_string().contains("expected 32-44 characters, got 1"));
    }

    #[test]
    fn too_long_fails_shape_check() {
        let long = "1".repeat(45);
        assert!(check_address_shape(&long).is_err());
    }

    #[test]
    fn excluded_base58_characters_rejected() {
        // '0', 'O', 'I' and 'l' are not part of the alphabet.
        let addr = "0okenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
        let err = check_address_shape(addr).unwrap_err();
        assert!(err.to_string().contains("'0'"));
    }

    #[test]
    fn well_shaped_but_wrong_length_rejected() {
        // 44 characters of 'z' decode to more than 32 bytes.
        let addr = "z".repeat(44);
        assert!(check_address_shape(&addr).is_ok());
        let err = address_to_bytes(&addr).unwrap_err();
        assert!(err.to_string().contains("expected 32 bytes"));
    }

    #[test]
    fn debug_shows_base58() {
        let addr = Address::new([0u8; 32]);
        assert_eq!(format!("{addr:?}"), "Address(11111111111111111111111111111111)");
    }
}

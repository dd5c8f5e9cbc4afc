//! Ed25519 transaction signatures.
//!
//! Signatures are produced by external signers and only ever change
//! encoding inside this crate: hex at the signer boundary, Base58 as the
//! ledger's transaction identifier.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;

use crate::address::Address;
use crate::codec;
use crate::error::SolError;

pub const SIGNATURE_LEN: usize = 64;

/// A 64-byte Ed25519 signature bound to one signer of one message.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    pub const fn new(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Decode a signature from the hex form returned by external signers.
    pub fn from_hex(input: &str) -> Result<Self, SolError> {
        codec::decode_array::<SIGNATURE_LEN>(input).map(Self)
    }

    pub fn to_hex(&self) -> String {
        codec::encode(&self.0)
    }

    /// Check this signature against `message` with `signer` as the public key.
    ///
    /// Program-derived addresses are not valid Ed25519 points and can never
    /// verify.
    pub fn verify(&self, signer: &Address, message: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(signer.as_bytes()) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&self.0);
        key.verify_strict(message, &sig).is_ok()
    }
}

impl From<ed25519_dalek::Signature> for Signature {
    fn from(sig: ed25519_dalek::Signature) -> Self {
        Self(sig.to_bytes())
    }
}

impl FromStr for Signature {
    type Err = SolError;

    /// Parse the Base58 transaction identifier form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| SolError::MalformedEncoding(format!("base58 decode failed: {e}")))?;
        let arr: [u8; SIGNATURE_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            SolError::MalformedEncoding(format!("expected 64 bytes, got {}", v.len()))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({self})")
    }
}

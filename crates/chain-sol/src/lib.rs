//! Solana primitives for sponsored SPL token transfers.
//!
//! This crate handles Solana address parsing, the hex byte codec used at
//! signer boundaries, manual transaction wire format serialization with
//! per-signer signature slots, and SPL token / associated token account
//! instructions, all without pulling in `solana-sdk`.
//!
//! Instead we implement Solana's compact binary wire format by hand, using
//! `ed25519-dalek` to verify signatures handed back by external signers and
//! `bs58` for Base58 encoding. Nothing here performs I/O.

pub mod address;
pub mod amount;
pub mod codec;
pub mod error;
pub mod signature;
pub mod spl_token;
pub mod transaction;

// Re-export key public types for ergonomic imports.
pub use address::{address_to_bytes, bytes_to_address, check_address_shape, validate_address, Address};
pub use amount::TokenAmount;
pub use error::SolError;
pub use signature::Signature;
pub use spl_token::{
    build_create_associated_token_account, build_spl_transfer, derive_associated_token_address,
    ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
pub use transaction::{
    decode_compact_u16, encode_compact_u16, AccountMeta, Blockhash, CompiledInstruction,
    Instruction, Message, MessageHeader, Transaction, SYSTEM_PROGRAM_ID,
};

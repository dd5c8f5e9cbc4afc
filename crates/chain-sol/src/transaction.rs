//! Solana legacy transaction wire format with explicit signature slots.
//!
//! We build transactions entirely by hand, with no `solana-sdk` dependency.
//! The wire format is a compact binary layout:
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```
//!
//! Signatures are only ever attached to the slot of the signer they were
//! verified against. A transaction cannot be serialized for submission
//! until every required slot is filled.

use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::error::SolError;
use crate::signature::{Signature, SIGNATURE_LEN};

/// The Solana System Program: 32 zero bytes.
/// Base58: `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Address = Address::new([0u8; 32]);

/// Account indices are a single byte on the wire.
const MAX_ACCOUNT_KEYS: usize = 256;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from a byte slice.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), SolError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    let mut consumed = 0usize;

    loop {
        let Some(&byte) = data.get(consumed) else {
            return Err(SolError::SerializationError(
                "unexpected end of data while decoding compact-u16".into(),
            ));
        };
        consumed += 1;

        value |= ((byte & 0x7f) as u32) << shift;
        shift += 7;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    if value > u16::MAX as u32 {
        return Err(SolError::SerializationError(
            "compact-u16 value overflow".into(),
        ));
    }

    Ok((value as u16, consumed))
}

// ---------------------------------------------------------------------------
// Freshness token
// ---------------------------------------------------------------------------

/// A recent blockhash binding a message to a recent ledger state.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Blockhash([u8; 32]);

impl Blockhash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Blockhash {
    type Err = SolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| SolError::MalformedEncoding(format!("blockhash: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            SolError::MalformedEncoding(format!("blockhash: expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockhash({self})")
    }
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(address: Address, is_signer: bool) -> Self {
        Self {
            address,
            is_signer,
            is_writable: false,
        }
    }
}

/// An instruction before it is compiled into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the message's `account_keys` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Number of required signatures (the first N account keys are signers).
    pub num_required_signatures: u8,
    /// How many of the signing accounts are read-only.
    pub num_readonly_signed: u8,
    /// How many of the non-signing accounts are read-only.
    pub num_readonly_unsigned: u8,
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    /// All account keys referenced by this message, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<Address>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile instructions into a message paid for by `fee_payer`.
    ///
    /// Instruction order is preserved exactly as supplied. Compilation is
    /// deterministic: identical inputs always serialize to identical bytes.
    pub fn compile(
        instructions: &[Instruction],
        fee_payer: &Address,
        recent_blockhash: &Blockhash,
    ) -> Result<Self, SolError> {
        if instructions.is_empty() {
            return Err(SolError::TransactionBuildError(
                "a transaction needs at least one instruction".into(),
            ));
        }

        struct AccountEntry {
            address: Address,
            is_signer: bool,
            is_writable: bool,
        }

        let mut entries: Vec<AccountEntry> = Vec::new();

        let mut upsert = |address: Address, signer: bool, writable: bool| {
            if let Some(entry) = entries.iter_mut().find(|e| e.address == address) {
                entry.is_signer |= signer;
                entry.is_writable |= writable;
            } else {
                entries.push(AccountEntry {
                    address,
                    is_signer: signer,
                    is_writable: writable,
                });
            }
        };

        // Fee payer is always signer + writable, and is inserted first so the
        // stable sort below keeps it at index 0.
        upsert(*fee_payer, true, true);

        for ix in instructions {
            for meta in &ix.accounts {
                upsert(meta.address, meta.is_signer, meta.is_writable);
            }
            upsert(ix.program_id, false, false);
        }

        entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        if entries.len() > MAX_ACCOUNT_KEYS {
            return Err(SolError::TransactionBuildError(format!(
                "too many account keys: {}",
                entries.len()
            )));
        }

        let count = |f: fn(&AccountEntry) -> bool| entries.iter().filter(|e| f(e)).count() as u8;
        let header = MessageHeader {
            num_required_signatures: count(|e| e.is_signer),
            num_readonly_signed: count(|e| e.is_signer && !e.is_writable),
            num_readonly_unsigned: count(|e| !e.is_signer && !e.is_writable),
        };

        let account_keys: Vec<Address> = entries.iter().map(|e| e.address).collect();
        let index_of = |address: &Address| -> Result<u8, SolError> {
            account_keys
                .iter()
                .position(|k| k == address)
                .map(|i| i as u8)
                .ok_or_else(|| {
                    SolError::TransactionBuildError(format!("{address} not in account keys"))
                })
        };

        let mut compiled = Vec::with_capacity(instructions.len());
        for ix in instructions {
            if ix.data.len() > u16::MAX as usize || ix.accounts.len() > u16::MAX as usize {
                return Err(SolError::TransactionBuildError(
                    "instruction exceeds compact-u16 limits".into(),
                ));
            }
            let account_indices = ix
                .accounts
                .iter()
                .map(|meta| index_of(&meta.address))
                .collect::<Result<Vec<u8>, SolError>>()?;

            compiled.push(CompiledInstruction {
                program_id_index: index_of(&ix.program_id)?,
                account_indices,
                data: ix.data.clone(),
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash: *recent_blockhash,
            instructions: compiled,
        })
    }

    /// The account that pays fees; always the first account key.
    pub fn fee_payer(&self) -> &Address {
        &self.account_keys[0]
    }

    /// The accounts whose signatures this message requires, in slot order.
    pub fn signer_keys(&self) -> &[Address] {
        &self.account_keys[..self.header.num_required_signatures as usize]
    }

    /// Serialize the message (the bytes that get signed).
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);

        buf.push(self.header.num_required_signatures);
        buf.push(self.header.num_readonly_signed);
        buf.push(self.header.num_readonly_unsigned);

        buf.extend_from_slice(&encode_compact_u16(self.account_keys.len() as u16));
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }

        buf.extend_from_slice(self.recent_blockhash.as_bytes());

        buf.extend_from_slice(&encode_compact_u16(self.instructions.len() as u16));
        for ix in &self.instructions {
            buf.push(ix.program_id_index);

            buf.extend_from_slice(&encode_compact_u16(ix.account_indices.len() as u16));
            buf.extend_from_slice(&ix.account_indices);

            buf.extend_from_slice(&encode_compact_u16(ix.data.len() as u16));
            buf.extend_from_slice(&ix.data);
        }

        buf
    }

    /// Parse serialized message bytes, validating every index.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, SolError> {
        let mut reader = Reader::new(bytes);
        let message = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(message)
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, SolError> {
        let header = MessageHeader {
            num_required_signatures: reader.u8()?,
            num_readonly_signed: reader.u8()?,
            num_readonly_unsigned: reader.u8()?,
        };

        let num_accounts = reader.compact_u16()? as usize;
        let mut account_keys = Vec::with_capacity(num_accounts);
        for _ in 0..num_accounts {
            account_keys.push(Address::new(reader.array32()?));
        }

        if header.num_required_signatures == 0
            || header.num_required_signatures as usize > account_keys.len()
        {
            return Err(SolError::SerializationError(format!(
                "header requires {} signatures over {} accounts",
                header.num_required_signatures,
                account_keys.len()
            )));
        }

        let recent_blockhash = Blockhash::new(reader.array32()?);

        let num_instructions = reader.compact_u16()? as usize;
        let mut instructions = Vec::with_capacity(num_instructions);
        for _ in 0..num_instructions {
            let program_id_index = reader.u8()?;
            let n = reader.compact_u16()? as usize;
            let account_indices = reader.take(n)?.to_vec();
            let len = reader.compact_u16()? as usize;
            let data = reader.take(len)?.to_vec();

            let out_of_range = std::iter::once(&program_id_index)
                .chain(account_indices.iter())
                .any(|&i| i as usize >= account_keys.len());
            if out_of_range {
                return Err(SolError::SerializationError(
                    "instruction references an account index out of range".into(),
                ));
            }

            instructions.push(CompiledInstruction {
                program_id_index,
                account_indices,
                data,
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }
}

/// A transaction: a message plus one signature slot per required signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    message: Message,
    signatures: Vec<Option<Signature>>,
}

impl Transaction {
    /// Build an unsigned transaction from an ordered list of instructions.
    pub fn build(
        fee_payer: &Address,
        recent_blockhash: &Blockhash,
        instructions: &[Instruction],
    ) -> Result<Self, SolError> {
        Message::compile(instructions, fee_payer, recent_blockhash).map(Self::new_unsigned)
    }

    pub fn new_unsigned(message: Message) -> Self {
        let slots = message.header.num_required_signatures as usize;
        Self {
            message,
            signatures: vec![None; slots],
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The bytes every signer signs.
    pub fn message_bytes(&self) -> Vec<u8> {
        self.message.serialize()
    }

    pub fn fee_payer(&self) -> &Address {
        self.message.fee_payer()
    }

    pub fn required_signers(&self) -> &[Address] {
        self.message.signer_keys()
    }

    pub fn requires_signer(&self, signer: &Address) -> bool {
        self.slot_of(signer).is_some()
    }

    /// The signature attached for `signer`, if any.
    pub fn signature_for(&self, signer: &Address) -> Option<&Signature> {
        self.slot_of(signer)
            .and_then(|idx| self.signatures[idx].as_ref())
    }

    /// Attach `signature` to the slot reserved for `signer`.
    ///
    /// The signature must verify over this message with `signer` as the
    /// public key, and the slot must be empty.
    pub fn attach_signature(
        &mut self,
        signer: &Address,
        signature: Signature,
    ) -> Result<(), SolError> {
        let idx = self
            .slot_of(signer)
            .ok_or_else(|| SolError::UnexpectedSigner(signer.to_string()))?;

        if self.signatures[idx].is_some() {
            return Err(SolError::DuplicateSignature(signer.to_string()));
        }

        if !signature.verify(signer, &self.message.serialize()) {
            return Err(SolError::SignatureMismatch(signer.to_string()));
        }

        self.signatures[idx] = Some(signature);
        Ok(())
    }

    /// Required signers that have no signature yet, in slot order.
    pub fn missing_signers(&self) -> Vec<Address> {
        self.required_signers()
            .iter()
            .zip(&self.signatures)
            .filter(|(_, sig)| sig.is_none())
            .map(|(addr, _)| *addr)
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.iter().all(Option::is_some)
    }

    /// The transaction identifier: the fee payer's signature.
    pub fn id(&self) -> Option<Signature> {
        self.signatures.first().copied().flatten()
    }

    /// Check every slot is filled with a signature that verifies.
    pub fn verify_signatures(&self) -> Result<(), SolError> {
        self.ensure_fully_signed()?;
        let message = self.message.serialize();
        for (signer, sig) in self.required_signers().iter().zip(&self.signatures) {
            if let Some(sig) = sig {
                if !sig.verify(signer, &message) {
                    return Err(SolError::SignatureMismatch(signer.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Serialize into the final wire format for submission.
    ///
    /// Fails with [`SolError::MissingSignatures`] unless every required
    /// signer slot is filled.
    pub fn to_wire(&self) -> Result<Vec<u8>, SolError> {
        self.ensure_fully_signed()?;
        Ok(self.write_wire(true))
    }

    /// Serialize with every signature slot zeroed, for presenting to an
    /// external signer. Attached signatures are never included.
    pub fn to_unsigned_wire(&self) -> Vec<u8> {
        self.write_wire(false)
    }

    /// Parse the wire format. All-zero slots are treated as unsigned.
    /// Signatures are not verified here; see [`Transaction::verify_signatures`].
    pub fn from_wire(bytes: &[u8]) -> Result<Self, SolError> {
        let mut reader = Reader::new(bytes);

        let num_sigs = reader.compact_u16()? as usize;
        let mut signatures = Vec::with_capacity(num_sigs);
        for _ in 0..num_sigs {
            let raw: [u8; SIGNATURE_LEN] = reader
                .take(SIGNATURE_LEN)?
                .try_into()
                .map_err(|_| SolError::SerializationError("signature slot".into()))?;
            signatures.push((raw != [0u8; SIGNATURE_LEN]).then(|| Signature::new(raw)));
        }

        let message = Message::read(&mut reader)?;
        reader.finish()?;

        if num_sigs != message.header.num_required_signatures as usize {
            return Err(SolError::SerializationError(format!(
                "{num_sigs} signature slots for {} required signers",
                message.header.num_required_signatures
            )));
        }

        Ok(Self {
            message,
            signatures,
        })
    }

    fn slot_of(&self, signer: &Address) -> Option<usize> {
        self.required_signers().iter().position(|k| k == signer)
    }

    fn ensure_fully_signed(&self) -> Result<(), SolError> {
        let missing = self.missing_signers();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SolError::MissingSignatures(
                missing.iter().map(Address::to_string).collect(),
            ))
        }
    }

    fn write_wire(&self, with_signatures: bool) -> Vec<u8> {
        let message = self.message.serialize();
        let mut wire =
            Vec::with_capacity(3 + self.signatures.len() * SIGNATURE_LEN + message.len());

        wire.extend_from_slice(&encode_compact_u16(self.signatures.len() as u16));
        for slot in &self.signatures {
            match slot {
                Some(sig) if with_signatures => wire.extend_from_slice(sig.as_bytes()),
                _ => wire.extend_from_slice(&[0u8; SIGNATURE_LEN]),
            }
        }
        wire.extend_from_slice(&message);

        wire
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SolError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        let Some(end) = end else {
            return Err(SolError::SerializationError(format!(
                "truncated: wanted {n} bytes at offset {}",
                self.pos
            )));
        };
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, SolError> {
        Ok(self.take(1)?[0])
    }

    fn array32(&mut self) -> Result<[u8; 32], SolError> {
        self.take(32)?
            .try_into()
            .map_err(|_| SolError::SerializationError("expected 32 bytes".into()))
    }

    fn compact_u16(&mut self) -> Result<u16, SolError> {
        let (value, consumed) = decode_compact_u16(&self.data[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    fn finish(&self) -> Result<(), SolError> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(SolError::SerializationError(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )))
        }
    }
}

//! The two token instructions a sponsored transfer needs, plus the
//! associated token account (ATA) address they operate on.

use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::error::SolError;
use crate::transaction::{AccountMeta, Instruction, SYSTEM_PROGRAM_ID};

// ---------------------------------------------------------------------------
// Well-known program IDs
// ---------------------------------------------------------------------------

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Address = Address::new([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79,
    0xac, 0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff,
    0x00, 0xa9,
]);

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Address = Address::new([
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d,
    0x83, 0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9,
    0xf8, 0x59,
]);

/// SPL Token `Transfer` instruction tag.
const TOKEN_TRANSFER_TAG: u8 = 3;

/// Associated Token Account `CreateIdempotent` instruction tag.
const ATA_CREATE_IDEMPOTENT_TAG: u8 = 1;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

// ---------------------------------------------------------------------------
// SPL Token Transfer
// ---------------------------------------------------------------------------

/// Token `Transfer` moving `amount` base units between two token accounts.
///
/// `owner` authorizes the debit of `from_token_account` and is the only
/// signer the instruction asks for. Data is the tag byte `3` and the amount
/// as little-endian `u64`.
pub fn build_spl_transfer(
    from_token_account: &Address,
    to_token_account: &Address,
    owner: &Address,
    amount: u64,
) -> Result<Instruction, SolError> {
    if amount == 0 {
        return Err(SolError::TransactionBuildError(
            "SPL transfer amount must be > 0".into(),
        ));
    }

    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_TRANSFER_TAG);
    data.extend_from_slice(&amount.to_le_bytes());

    Ok(Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*from_token_account, false),
            AccountMeta::writable(*to_token_account, false),
            AccountMeta::readonly(*owner, true),
        ],
        data,
    })
}

/// Build an Associated Token Account `CreateIdempotent` instruction.
///
/// `funder` pays rent for the new account and is the only signer; the owner
/// does not need to authorize the creation of an account it will receive
/// into. The instruction succeeds without effect if the account already
/// exists, so two racing setup transactions cannot fail each other.
///
/// Accounts: funder (signer, writable), ATA (writable), owner, mint,
/// System Program, Token Program.
pub fn build_create_associated_token_account(
    funder: &Address,
    owner: &Address,
    mint: &Address,
) -> Result<Instruction, SolError> {
    let ata = derive_associated_token_address(owner, mint)?;

    Ok(Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*funder, true),
            AccountMeta::writable(ata, false),
            AccountMeta::readonly(*owner, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_CREATE_IDEMPOTENT_TAG],
    })
}

// ---------------------------------------------------------------------------
// Associated Token Account (PDA) derivation
// ---------------------------------------------------------------------------

/// The canonical token account of `wallet` for `mint`.
///
/// Seeds are `wallet`, the token program id and `mint`, under the
/// associated token account program.
pub fn derive_associated_token_address(
    wallet: &Address,
    mint: &Address,
) -> Result<Address, SolError> {
    find_program_address(
        &[wallet.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// Highest bump whose program address falls off the Ed25519 curve.
fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), SolError> {
    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(SolError::InvalidAddress(format!(
        "no off-curve program address for {program_id}"
    )))
}

fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &Address,
) -> Option<Address> {
    let digest: [u8; 32] = seeds
        .iter()
        .fold(Sha256::new(), |hasher, seed| hasher.chain_update(seed))
        .chain_update(bump_seed)
        .chain_update(program_id.as_bytes())
        .chain_update(PDA_MARKER)
        .finalize()
        .into();

    // Program addresses have no private key, so they must be off-curve.
    (!is_on_curve(&digest)).then(|| Address::new(digest))
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_ids_match_base58() {
        assert_eq!(
            TOKEN_PROGRAM_ID.to_string(),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID.to_string(),
            "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"
        );
    }

    // -- SPL Transfer instruction -------------------------------------------

    #[test]
    fn spl_transfer_data_encoding() {
        let ix = build_spl_transfer(
            &Address::new([1; 32]),
            &Address::new([2; 32]),
            &Address::new([3; 32]),
            500_000,
        )
        .unwrap();

        assert_eq!(ix.data.len(), 9);
        assert_eq!(ix.data[0], 3);
        let encoded_amount = u64::from_le_bytes(ix.data[1..9].try_into().unwrap());
        assert_eq!(encoded_amount, 500_000);
        assert_eq!(ix.program_id, TOKEN_PROGRAM_ID);
    }

    #[test]
    fn spl_transfer_account_roles() {
        let owner = Address::new([3; 32]);
        let ix = build_spl_transfer(&Address::new([1; 32]), &Address::new([2; 32]), &owner, 100)
            .unwrap();

        assert_eq!(ix.accounts.len(), 3);
        assert!(ix.accounts[0].is_writable && !ix.accounts[0].is_signer);
        assert!(ix.accounts[1].is_writable && !ix.accounts[1].is_signer);
        assert_eq!(ix.accounts[2].address, owner);
        assert!(ix.accounts[2].is_signer && !ix.accounts[2].is_writable);
    }

    #[test]
    fn spl_transfer_zero_amount_fails() {
        let a = Address::new([1; 32]);
        assert!(build_spl_transfer(&a, &a, &a, 0).is_err());
    }

    // -- CreateIdempotent instruction ---------------------------------------

    #[test]
    fn create_ata_only_funder_signs() {
        let funder = Address::new([0x10; 32]);
        let owner = Address::new([0x20; 32]);
        let mint = Address::new([0x30; 32]);

        let ix = build_create_associated_token_account(&funder, &owner, &mint).unwrap();
        assert_eq!(ix.program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(ix.data, vec![1]);

        let signers: Vec<_> = ix.accounts.iter().filter(|m| m.is_signer).collect();
        assert_eq!(signers.len(), 1);
        assert_eq!(signers[0].address, funder);

        let ata = derive_associated_token_address(&owner, &mint).unwrap();
        assert_eq!(ix.accounts[1].address, ata);
        assert!(ix.accounts[1].is_writable);
        assert_eq!(ix.accounts[2].address, owner);
        assert!(!ix.accounts[2].is_writable);
    }

    // -- PDA derivation -----------------------------------------------------

    #[test]
    fn pda_is_not_on_curve() {
        let ata = derive_associated_token_address(&Address::new([0xAA; 32]), &Address::new([0xBB; 32]))
            .unwrap();
        assert!(!is_on_curve(ata.as_bytes()), "PDA must NOT be on the Ed25519 curve");
    }

    #[test]
    fn pda_derivation_is_deterministic() {
        let wallet = Address::new([0x11; 32]);
        let mint = Address::new([0x22; 32]);
        assert_eq!(
            derive_associated_token_address(&wallet, &mint).unwrap(),
            derive_associated_token_address(&wallet, &mint).unwrap()
        );
    }

    #[test]
    fn pda_depends_on_wallet_and_mint() {
        let mint = Address::new([0xFF; 32]);
        let a = derive_associated_token_address(&Address::new([0x01; 32]), &mint).unwrap();
        let b = derive_associated_token_address(&Address::new([0x02; 32]), &mint).unwrap();
        assert_ne!(a, b);

        let wallet = Address::new([0xAA; 32]);
        let c = derive_associated_token_address(&wallet, &Address::new([0x01; 32])).unwrap();
        let d = derive_associated_token_address(&wallet, &Address::new([0x02; 32])).unwrap();
        assert_ne!(c, d);
    }

    #[test]
    fn is_on_curve_accepts_basepoint() {
        let basepoint: [u8; 32] = [
            0x58, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
            0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
            0x66, 0x66, 0x66, 0x66,
        ];
        assert!(is_on_curve(&basepoint));
    }

    #[test]
    fn derive_ata_for_known_wallet_and_usdc_mint() {
        let usdc_mint: Address = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".parse().unwrap();
        let ata = derive_associated_token_address(&Address::new([0x42; 32]), &usdc_mint).unwrap();

        assert!(!is_on_curve(ata.as_bytes()));
        assert!(crate::address::validate_address(&ata.to_string()).is_ok());
    }
}

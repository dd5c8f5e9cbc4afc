use proptest::prelude::*;

use chain_sol::{codec, Address, Blockhash, Instruction, AccountMeta, TokenAmount, Transaction};

proptest! {
    /// decode(encode(b)) == b for every byte sequence.
    #[test]
    fn hex_codec_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let encoded = codec::encode(&bytes);
        prop_assert_eq!(encoded.len(), bytes.len() * 2);
        prop_assert!(encoded.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        prop_assert_eq!(codec::decode(&encoded).unwrap(), bytes.clone());
        prop_assert_eq!(codec::decode(&format!("0x{encoded}")).unwrap(), bytes);
    }

    /// Odd-length input never decodes.
    #[test]
    fn hex_decode_rejects_odd_length(s in "[0-9a-f]{0,63}") {
        prop_assume!(s.len() % 2 == 1);
        prop_assert!(codec::decode(&s).is_err());
    }

    /// Rendering an amount and parsing it back yields the same base units.
    #[test]
    fn amount_display_parse_roundtrip(units in any::<u64>(), decimals in 0u8..=9) {
        let amount = TokenAmount::from_base_units(units as u128, decimals);
        let parsed = TokenAmount::parse(&amount.to_string(), decimals).unwrap();
        prop_assert_eq!(parsed, amount);
    }

    /// Any compiled message parses back to the same unsigned transaction.
    #[test]
    fn unsigned_wire_roundtrip(
        payer in prop::array::uniform32(1u8..),
        other in prop::array::uniform32(1u8..),
        data in prop::collection::vec(any::<u8>(), 0..64),
        hash in prop::array::uniform32(any::<u8>()),
    ) {
        let ix = Instruction {
            program_id: Address::new([0u8; 32]),
            accounts: vec![AccountMeta::writable(Address::new(other), false)],
            data,
        };
        let tx = Transaction::build(&Address::new(payer), &Blockhash::new(hash), &[ix]).unwrap();
        let parsed = Transaction::from_wire(&tx.to_unsigned_wire()).unwrap();
        prop_assert_eq!(parsed, tx);
    }
}

use bitcoin::hashes::{sha256, Hash};
use bitcoin::opcodes::all::*;
use bitcoin::script::Builder;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{ScriptBuf, WPubkeyHash};

pub fn sha256(x: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(x).to_byte_array()
}

/// hash160 of a compressed pubkey, the way every script here refers to a
/// key by hash.
pub fn pkh(pk: &PublicKey) -> [u8; 20] {
    WPubkeyHash::hash(&pk.serialize()).to_byte_array()
}

pub fn ordered<'a>(pk1: &'a [u8; 33], pk2: &'a [u8; 33]) -> (&'a [u8; 33], &'a [u8; 33]) {
    if pk1 < pk2 {
        (pk1, pk2)
    } else {
        (pk2, pk1)
    }
}

/// The raw 2-of-2 funding script. Keys go in lexicographic order so both
/// sides construct the identical script.
pub fn new_2x2_multisig(pk1: &PublicKey, pk2: &PublicKey) -> ScriptBuf {
    let (a, b) = (pk1.serialize(), pk2.serialize());
    let (first, second) = ordered(&a, &b);
    Builder::new()
        .push_opcode(OP_PUSHNUM_2)
        .push_slice(first)
        .push_slice(second)
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

pub fn new_2x2_wsh_lock_script(pk1: &PublicKey, pk2: &PublicKey) -> ScriptBuf {
    new_2x2_multisig(pk1, pk2).to_p2wsh()
}

pub fn v0_p2wpkh(pk: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pk.serialize()))
}

pub fn v0_p2wpkh_from_hash(pkh: [u8; 20]) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(pkh))
}

//OP_IF
//    # Penalty path, spendable once the state's secret is out
//    <revocation_pubkey>
//OP_ELSE
//    `csv_delay`
//    OP_CSV
//    OP_DROP
//    <delay_pubkey>
//OP_ENDIF
//OP_CHECKSIG
pub fn to_local_script(delay_pk: &PublicKey, csv_delay: u16, revocation_pk: &PublicKey) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_IF)
        .push_slice(revocation_pk.serialize())
        .push_opcode(OP_ELSE)
        .push_int(csv_delay as i64)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_slice(delay_pk.serialize())
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_CHECKSIG)
        .into_script()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    fn pk(byte: u8) -> PublicKey {
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        PublicKey::from_secret_key(&Secp256k1::new(), &sk)
    }

    #[test]
    fn multisig_is_order_independent() {
        let (a, b) = (pk(1), pk(2));
        assert_eq!(new_2x2_multisig(&a, &b), new_2x2_multisig(&b, &a));
        assert_eq!(new_2x2_wsh_lock_script(&a, &b), new_2x2_wsh_lock_script(&b, &a));
    }

    #[test]
    fn multisig_shape() {
        let script = new_2x2_multisig(&pk(1), &pk(2));
        let bytes = script.to_bytes();
        // OP_2 <33> ... <33> OP_2 OP_CHECKMULTISIG
        assert_eq!(bytes.len(), 1 + 34 + 34 + 1 + 1);
        assert_eq!(bytes[0], 0x52);
        assert_eq!(*bytes.last().unwrap(), 0xae);
    }

    #[test]
    fn to_local_embeds_both_keys_and_the_delay() {
        let delay = pk(3);
        let revocation = pk(4);
        let script = to_local_script(&delay, 5, &revocation);
        let hex = hex::encode(script.to_bytes());
        assert!(hex.starts_with("63")); // OP_IF
        assert!(hex.contains(&hex::encode(revocation.serialize())));
        assert!(hex.contains(&hex::encode(delay.serialize())));
        assert!(hex.contains("b2")); // OP_CSV
    }

    #[test]
    fn p2wpkh_matches_hash_form() {
        let key = pk(7);
        assert_eq!(v0_p2wpkh(&key), v0_p2wpkh_from_hash(pkh(&key)));
    }
}

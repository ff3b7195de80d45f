use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::error::Error;
use crate::tools::{to_local_script, v0_p2wpkh};

/// The asymmetric commitment, from the perspective of the side that
/// would broadcast it: its own balance sits behind the CSV delay (or the
/// counterparty's revocation key), the other side's balance pays out
/// directly. Commitments are fee free, the two outputs always sum to
/// the capacity.
#[derive(Clone, Debug)]
pub struct CommitTx {
    pub funding_outpoint: OutPoint,
    /// The raw 2-of-2, not its p2wsh wrapping.
    pub funding_script: ScriptBuf,
    pub capacity: u64,

    pub to_local_sat: u64,
    pub to_remote_sat: u64,

    /// Broadcaster's key behind the CSV branch.
    pub delay_pk: PublicKey,
    pub csv_delay: u16,
    /// Revocation key for this state, derived from the watcher's
    /// basepoint and the broadcaster's elkrem point.
    pub revocation_pk: PublicKey,
    /// The other side's direct payout key.
    pub remote_refund_pk: PublicKey,
}

impl CommitTx {
    pub fn to_local_script(&self) -> ScriptBuf {
        to_local_script(&self.delay_pk, self.csv_delay, &self.revocation_pk)
    }

    /// Builds the unsigned transaction. Output order is fixed: the
    /// delayed output first, the direct one second; an empty balance
    /// drops its output entirely.
    pub fn get_tx(&self) -> Transaction {
        let mut output = Vec::with_capacity(2);
        if self.to_local_sat > 0 {
            output.push(TxOut {
                value: Amount::from_sat(self.to_local_sat),
                script_pubkey: self.to_local_script().to_p2wsh(),
            });
        }
        if self.to_remote_sat > 0 {
            output.push(TxOut {
                value: Amount::from_sat(self.to_remote_sat),
                script_pubkey: v0_p2wpkh(&self.remote_refund_pk),
            });
        }
        Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: self.funding_outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output,
        }
    }

    pub fn txid(&self) -> bitcoin::Txid {
        self.get_tx().compute_txid()
    }

    /// BIP143 sighash of the single input against the funding script.
    pub fn sighash(&self) -> Result<Message, Error> {
        let tx = self.get_tx();
        let mut cache = SighashCache::new(&tx);
        let sighash = cache
            .p2wsh_signature_hash(
                0,
                &self.funding_script,
                Amount::from_sat(self.capacity),
                EcdsaSighashType::All,
            )
            .map_err(|e| Error::Sighash(e.to_string()))?;
        Ok(Message::from_digest(sighash.to_byte_array()))
    }

    /// Compact signature over the sighash, as it travels on the wire.
    pub fn sign<C: Signing>(&self, secp: &Secp256k1<C>, sk: &SecretKey) -> Result<[u8; 64], Error> {
        let sig = secp.sign_ecdsa(&self.sighash()?, sk);
        Ok(sig.serialize_compact())
    }

    pub fn verify<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        sig: &[u8; 64],
        pk: &PublicKey,
    ) -> Result<(), Error> {
        let sig = Signature::from_compact(&sig[..])?;
        secp.verify_ecdsa(&self.sighash()?, &sig, pk)
            .map_err(|_| Error::BadSignature)
    }

    /// The broadcastable commitment (the break transaction): both
    /// funding signatures expanded into the 2-of-2 witness, low key
    /// first to match the funding script order.
    pub fn finalize(
        &self,
        sig_a: &[u8; 64],
        pk_a: &PublicKey,
        sig_b: &[u8; 64],
        pk_b: &PublicKey,
    ) -> Result<Transaction, Error> {
        let mut tx = self.get_tx();

        let mut der_a = Signature::from_compact(&sig_a[..])?.serialize_der().to_vec();
        der_a.push(EcdsaSighashType::All as u8);
        let mut der_b = Signature::from_compact(&sig_b[..])?.serialize_der().to_vec();
        der_b.push(EcdsaSighashType::All as u8);

        let (first, second) = if pk_a.serialize() < pk_b.serialize() {
            (der_a, der_b)
        } else {
            (der_b, der_a)
        };

        let mut witness = Witness::new();
        witness.push(Vec::new()); // CHECKMULTISIG pops one extra element
        witness.push(first);
        witness.push(second);
        witness.push(self.funding_script.to_bytes());
        tx.input[0].witness = witness;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::new_2x2_multisig;
    use bitcoin::Txid;

    fn sk(byte: u8) -> SecretKey {
        SecretKey::from_slice(&[byte; 32]).unwrap()
    }

    fn commit(to_local: u64, to_remote: u64) -> CommitTx {
        let secp = Secp256k1::new();
        let local_fund = PublicKey::from_secret_key(&secp, &sk(1));
        let remote_fund = PublicKey::from_secret_key(&secp, &sk(2));
        CommitTx {
            funding_outpoint: OutPoint { txid: Txid::from_byte_array([8; 32]), vout: 0 },
            funding_script: new_2x2_multisig(&local_fund, &remote_fund),
            capacity: to_local + to_remote,
            to_local_sat: to_local,
            to_remote_sat: to_remote,
            delay_pk: PublicKey::from_secret_key(&secp, &sk(3)),
            csv_delay: 5,
            revocation_pk: PublicKey::from_secret_key(&secp, &sk(4)),
            remote_refund_pk: PublicKey::from_secret_key(&secp, &sk(5)),
        }
    }

    #[test]
    fn outputs_sum_to_capacity() {
        let c = commit(700_000, 300_000);
        let tx = c.get_tx();
        assert_eq!(tx.output.len(), 2);
        let total: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
        assert_eq!(total, 1_000_000);
        // delayed output first, and it is a p2wsh
        assert!(tx.output[0].script_pubkey.is_p2wsh());
        assert!(tx.output[1].script_pubkey.is_p2wpkh());
    }

    #[test]
    fn empty_side_drops_its_output() {
        let c = commit(1_000_000, 0);
        let tx = c.get_tx();
        assert_eq!(tx.output.len(), 1);
        assert!(tx.output[0].script_pubkey.is_p2wsh());
    }

    #[test]
    fn sign_verify_round_trip() {
        let secp = Secp256k1::new();
        let c = commit(600_000, 400_000);
        let sig = c.sign(&secp, &sk(1)).unwrap();
        let pk = PublicKey::from_secret_key(&secp, &sk(1));
        c.verify(&secp, &sig, &pk).unwrap();

        let wrong = PublicKey::from_secret_key(&secp, &sk(2));
        assert_eq!(c.verify(&secp, &sig, &wrong), Err(Error::BadSignature));
    }

    #[test]
    fn txid_depends_on_state_split() {
        let a = commit(700_000, 300_000);
        let b = commit(700_100, 299_900);
        assert_ne!(a.txid(), b.txid());
    }
}

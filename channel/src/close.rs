use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::error::Error;
use crate::CLOSE_TX_FEE;

/// The cooperative close template. Both parties construct it from the
/// same channel data, so the result has to be byte identical no matter
/// which side builds it: outputs are sorted by value, then by script,
/// and the flat fee always comes out of the initiator's balance.
#[derive(Clone, Debug)]
pub struct CloseTx {
    pub funding_outpoint: OutPoint,
    pub funding_script: ScriptBuf,
    pub capacity: u64,

    pub initiator_sat: u64,
    pub responder_sat: u64,
    pub initiator_script: ScriptBuf,
    pub responder_script: ScriptBuf,
}

impl CloseTx {
    pub fn get_tx(&self) -> Transaction {
        let (initiator_sat, responder_sat) = if self.initiator_sat >= CLOSE_TX_FEE {
            (self.initiator_sat - CLOSE_TX_FEE, self.responder_sat)
        } else {
            // an initiator with no balance cannot pay, the fee shifts over
            (self.initiator_sat, self.responder_sat.saturating_sub(CLOSE_TX_FEE))
        };

        let mut output: Vec<TxOut> = Vec::with_capacity(2);
        if initiator_sat > 0 {
            output.push(TxOut {
                value: Amount::from_sat(initiator_sat),
                script_pubkey: self.initiator_script.clone(),
            });
        }
        if responder_sat > 0 {
            output.push(TxOut {
                value: Amount::from_sat(responder_sat),
                script_pubkey: self.responder_script.clone(),
            });
        }
        output.sort_by(|a, b| {
            a.value
                .cmp(&b.value)
                .then_with(|| a.script_pubkey.as_bytes().cmp(b.script_pubkey.as_bytes()))
        });

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

    /// The broadcastable close: both compact signatures expanded into the
    /// 2-of-2 witness, low key first to match the funding script order.
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

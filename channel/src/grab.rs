use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::error::Error;
use crate::GRAB_TX_FEE;

/// The grab transaction: sweeps whatever a revoked commitment exposes
/// into the destination script. The delayed output is taken through the
/// revocation branch (signable once the state's secret is known), the
/// direct refund output with the owner's pre-signed signature. Inputs
/// are ordered by the vout they spend, so the owner pre-signing and the
/// tower reconstructing always build the identical transaction.
#[derive(Clone, Debug)]
pub struct GrabTx {
    tx: Transaction,
    revocation_input: Option<usize>,
    refund_input: Option<usize>,
    to_local_script: ScriptBuf,
    to_local_value: u64,
    refund_script_pubkey: ScriptBuf,
    refund_value: u64,
}

impl GrabTx {
    /// Locates the commitment's outputs by their scripts and assembles
    /// the unsigned sweep. Fails if the transaction shows neither
    /// expected output or the swept value cannot cover the fee.
    pub fn from_commitment(
        commit: &Transaction,
        to_local_script: &Script,
        refund_script_pubkey: &Script,
        dest_script: ScriptBuf,
    ) -> Result<GrabTx, Error> {
        let commit_txid = commit.compute_txid();
        let to_local_wsh = to_local_script.to_p2wsh();

        let mut spends: Vec<(u32, u64, bool)> = Vec::new(); // vout, value, is_revocation
        for (vout, out) in commit.output.iter().enumerate() {
            if out.script_pubkey == to_local_wsh {
                spends.push((vout as u32, out.value.to_sat(), true));
            } else if out.script_pubkey == *refund_script_pubkey {
                spends.push((vout as u32, out.value.to_sat(), false));
            }
        }
        if spends.is_empty() {
            return Err(Error::NoMatchingOutputs);
        }
        spends.sort_by_key(|s| s.0);

        let total: u64 = spends.iter().map(|s| s.1).sum();
        if total <= GRAB_TX_FEE {
            return Err(Error::ValueBelowFee);
        }

        let mut revocation_input = None;
        let mut refund_input = None;
        let mut to_local_value = 0;
        let mut refund_value = 0;
        let mut input = Vec::with_capacity(spends.len());
        for (i, (vout, value, is_revocation)) in spends.iter().enumerate() {
            if *is_revocation {
                revocation_input = Some(i);
                to_local_value = *value;
            } else {
                refund_input = Some(i);
                refund_value = *value;
            }
            input.push(TxIn {
                previous_output: OutPoint { txid: commit_txid, vout: *vout },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            });
        }

        Ok(GrabTx {
            tx: Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input,
                output: vec![TxOut {
                    value: Amount::from_sat(total - GRAB_TX_FEE),
                    script_pubkey: dest_script,
                }],
            },
            revocation_input,
            refund_input,
            to_local_script: to_local_script.to_owned(),
            to_local_value,
            refund_script_pubkey: refund_script_pubkey.to_owned(),
            refund_value,
        })
    }

    pub fn unsigned_tx(&self) -> &Transaction {
        &self.tx
    }

    /// Sighash of the refund input, the piece the channel owner
    /// pre-signs when feeding the tower.
    pub fn refund_sighash(&self) -> Result<Option<Message>, Error> {
        let index = match self.refund_input {
            Some(index) => index,
            None => return Ok(None),
        };
        let mut cache = SighashCache::new(&self.tx);
        let sighash = cache
            .p2wpkh_signature_hash(
                index,
                &self.refund_script_pubkey,
                Amount::from_sat(self.refund_value),
                EcdsaSighashType::All,
            )
            .map_err(|e| Error::Sighash(e.to_string()))?;
        Ok(Some(Message::from_digest(sighash.to_byte_array())))
    }

    fn revocation_sighash(&self) -> Result<Option<Message>, Error> {
        let index = match self.revocation_input {
            Some(index) => index,
            None => return Ok(None),
        };
        let mut cache = SighashCache::new(&self.tx);
        let sighash = cache
            .p2wsh_signature_hash(
                index,
                &self.to_local_script,
                Amount::from_sat(self.to_local_value),
                EcdsaSighashType::All,
            )
            .map_err(|e| Error::Sighash(e.to_string()))?;
        Ok(Some(Message::from_digest(sighash.to_byte_array())))
    }

    /// Fills in both witnesses: the revocation input is signed here with
    /// the derived revocation secret, the refund input takes the stored
    /// compact signature.
    pub fn complete<C: Signing>(
        &self,
        secp: &Secp256k1<C>,
        revocation_sk: &SecretKey,
        refund: Option<(&[u8; 64], &PublicKey)>,
    ) -> Result<Transaction, Error> {
        let mut tx = self.tx.clone();

        if let (Some(index), Some(sighash)) = (self.revocation_input, self.revocation_sighash()?) {
            let mut der = secp.sign_ecdsa(&sighash, revocation_sk).serialize_der().to_vec();
            der.push(EcdsaSighashType::All as u8);
            let mut witness = Witness::new();
            witness.push(der);
            witness.push(vec![0x01]); // take the OP_IF penalty branch
            witness.push(self.to_local_script.to_bytes());
            tx.input[index].witness = witness;
        }

        if let Some(index) = self.refund_input {
            let (sig, pk) = refund.ok_or(Error::BadSignature)?;
            let mut der = Signature::from_compact(&sig[..])?.serialize_der().to_vec();
            der.push(EcdsaSighashType::All as u8);
            let mut witness = Witness::new();
            witness.push(der);
            witness.push(pk.serialize().to_vec());
            tx.input[index].witness = witness;
        }

        Ok(tx)
    }
}

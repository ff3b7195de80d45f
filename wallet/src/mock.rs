//! Deterministic in-memory wallet for tests: BIP32 from a fixed seed, a
//! single synthetic coin as the spendable balance, and full recording of
//! broadcasts, exports and provisional sends so scenarios can assert on
//! wallet traffic.

use std::collections::HashMap;
use std::sync::Mutex;

use bitcoin::absolute::LockTime;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, WPubkeyHash,
    Witness,
};

use crate::{KeyPath, Utxo, Wallet, WalletError};

struct Inner {
    available: u64,
    pending: HashMap<Txid, (Transaction, u64)>,
    broadcast: Vec<Transaction>,
    exported: Vec<Utxo>,
    coin_counter: u64,
}

pub struct MockWallet {
    master: Xpriv,
    secp: Secp256k1<All>,
    network: Network,
    inner: Mutex<Inner>,
}

impl MockWallet {
    pub fn new(seed: &[u8], available: u64) -> Self {
        let master = Xpriv::new_master(Network::Regtest, seed)
            .expect("valid seed");
        MockWallet {
            master,
            secp: Secp256k1::new(),
            network: Network::Regtest,
            inner: Mutex::new(Inner {
                available,
                pending: HashMap::new(),
                broadcast: Vec::new(),
                exported: Vec::new(),
                coin_counter: 0,
            }),
        }
    }

    fn derive(&self, path: KeyPath) -> Result<Xpriv, WalletError> {
        let mut steps = Vec::with_capacity(path.step.len());
        for s in &path.step {
            let child = ChildNumber::from_normal_idx(*s)
                .map_err(|e| WalletError::Derivation(e.to_string()))?;
            steps.push(child);
        }
        self.master
            .derive_priv(&self.secp, &DerivationPath::from(steps))
            .map_err(|e| WalletError::Derivation(e.to_string()))
    }

    fn change_script(&self) -> ScriptBuf {
        // all change lands on one fixed internal key
        let pk = PublicKey::from_secret_key(&self.secp, &self.master.private_key);
        ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pk.serialize()))
    }

    /// Everything pushed to the network so far, in order.
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.inner.lock().unwrap().broadcast.clone()
    }

    /// Utxos the engine handed over for safekeeping.
    pub fn exported(&self) -> Vec<Utxo> {
        self.inner.lock().unwrap().exported.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    pub fn available(&self) -> u64 {
        self.inner.lock().unwrap().available
    }
}

impl Wallet for MockWallet {
    fn get_pub(&self, path: KeyPath) -> Result<PublicKey, WalletError> {
        let xpriv = self.derive(path)?;
        Ok(PublicKey::from_secret_key(&self.secp, &xpriv.private_key))
    }

    fn get_priv(&self, path: KeyPath) -> Result<SecretKey, WalletError> {
        Ok(self.derive(path)?.private_key)
    }

    fn push_tx(&self, tx: &Transaction) -> Result<(), WalletError> {
        self.inner.lock().unwrap().broadcast.push(tx.clone());
        Ok(())
    }

    fn export_utxo(&self, utxo: Utxo) -> Result<(), WalletError> {
        self.inner.lock().unwrap().exported.push(utxo);
        Ok(())
    }

    fn maybe_send(&self, outputs: &[TxOut]) -> Result<(Txid, Vec<u32>), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        let required: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
        if required > inner.available {
            return Err(WalletError::InsufficientFunds {
                required,
                available: inner.available,
            });
        }

        // one synthetic coin covers the whole send; the remainder comes
        // back as a change output behind the requested ones, so the
        // requested indexes are simply 0..n
        inner.coin_counter += 1;
        let mut coin = [0u8; 32];
        coin[..8].copy_from_slice(&inner.coin_counter.to_be_bytes());
        let change = inner.available - required;

        let mut output = outputs.to_vec();
        if change > 0 {
            output.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: self.change_script(),
            });
        }
        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint { txid: Txid::from_byte_array(coin), vout: 0 },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output,
        };
        let txid = tx.compute_txid();
        let indexes = (0..outputs.len() as u32).collect();

        inner.available -= required;
        inner.pending.insert(txid, (tx, required));
        Ok((txid, indexes))
    }

    fn really_send(&self, txid: Txid) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        let (tx, _) = inner
            .pending
            .remove(&txid)
            .ok_or(WalletError::UnknownTransaction(txid))?;
        inner.broadcast.push(tx);
        Ok(())
    }

    fn nah_dont_send(&self, txid: Txid) -> Result<(), WalletError> {
        let mut inner = self.inner.lock().unwrap();
        let (_, frozen) = inner
            .pending
            .remove(&txid)
            .ok_or(WalletError::UnknownTransaction(txid))?;
        inner.available += frozen;
        Ok(())
    }

    fn params(&self) -> Network {
        self.network
    }
}

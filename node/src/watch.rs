use bitcoin::hashes::Hash;

use channel::derivation::elk_point;
use channel::tools::{pkh, v0_p2wpkh_from_hash};
use channel::GrabTx;
use wallet::{KeyUse, Wallet};
use wire::{Hash160, Hash256, RawSignature, WatchDesc, WatchState};

use crate::chan::parse_pk;
use crate::{LnError, Node};

impl<W: Wallet> Node<W> {
    /// The watchtower registration for a channel. Available once the
    /// first update has revealed the counterparty's secret for state 0,
    /// which seeds the tower's receiver. The destination script hash
    /// doubles as the channel's identity inside the tower.
    pub fn watch_descriptor(&self, peer_idx: u32, chan_idx: u32) -> Result<WatchDesc, LnError> {
        let lock = self.chan_lock((peer_idx, chan_idx));
        let _guard = lock.lock().unwrap();
        let chan = self.store.get_chan(peer_idx, chan_idx)?;

        if chan.state.idx < 1 {
            return Err(LnError::NotWatchable(0));
        }
        let elk_zero = chan.elk_rcv.at_index(0)?;

        let revocation_base_secret = self
            .wallet
            .get_priv(chan.desc.key_path.with_use(KeyUse::RevocationBase))?;

        Ok(WatchDesc {
            dest_pkh: Hash160(pkh(&parse_pk(&chan.desc.my_keys.refund_pk)?)),
            revocation_base_secret: Hash256(revocation_base_secret.secret_bytes()),
            delay_pk: chan.desc.their_keys.delay_pk,
            refund_pk: chan.desc.my_keys.refund_pk,
            csv_delay: chan.desc.csv_delay,
            capacity: chan.desc.capacity,
            elk_zero: Hash256(elk_zero),
        })
    }

    /// Watch material for the most recently revoked state: the txid of
    /// the counterparty's now-revoked commitment, the revealed secret,
    /// and our pre-signed refund-input signature for the grab.
    pub fn watch_message(
        &self,
        peer_idx: u32,
        chan_idx: u32,
        state_num: u64,
    ) -> Result<WatchState, LnError> {
        let lock = self.chan_lock((peer_idx, chan_idx));
        let _guard = lock.lock().unwrap();
        let chan = self.store.get_chan(peer_idx, chan_idx)?;

        // only the just-revoked state still has its balances around
        if state_num == 0 || state_num + 1 != chan.state.idx {
            return Err(LnError::NotWatchable(state_num));
        }
        let (prev_my, prev_their) =
            chan.state.prev_amts.ok_or(LnError::NotWatchable(state_num))?;

        let secret = chan.elk_rcv.at_index(state_num)?;
        let their_point = elk_point(&self.secp, &secret)?;
        let revoked_commit = chan.their_commit(&self.secp, prev_my, prev_their, &their_point)?;
        let revoked_tx = revoked_commit.get_tx();

        let my_refund_pk = parse_pk(&chan.desc.my_keys.refund_pk)?;
        let dest_pkh = pkh(&my_refund_pk);
        let grab = GrabTx::from_commitment(
            &revoked_tx,
            &revoked_commit.to_local_script(),
            &chan.my_refund_script()?,
            v0_p2wpkh_from_hash(dest_pkh),
        )?;

        // pre-sign the refund input; zero signature when our side had
        // nothing in that state
        let sig = match grab.refund_sighash()? {
            Some(sighash) => {
                let refund_priv = self
                    .wallet
                    .get_priv(chan.desc.key_path.with_use(KeyUse::Refund))?;
                RawSignature(self.secp.sign_ecdsa(&sighash, &refund_priv).serialize_compact())
            }
            None => RawSignature::default(),
        };

        Ok(WatchState {
            dest_pkh: Hash160(dest_pkh),
            commit_txid: Hash256(revoked_tx.compute_txid().to_byte_array()),
            state_num,
            elk: Hash256(secret),
            sig,
        })
    }
}

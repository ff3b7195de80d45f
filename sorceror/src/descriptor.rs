use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};

use channel::derivation::{derive_revocation_privkey, derive_revocation_pubkey};
use channel::tools::to_local_script;
use wire::WatchDesc;

use crate::error::Error;

/// Serialized width of the static channel identity:
/// dest_pkh(20) | revocation_base_secret(32) | delay_pk(33) |
/// refund_pk(33) | csv_delay(2) | capacity(8).
pub const STATIC_SIZE: usize = 128;

/// Serialized width of one revoked-state record:
/// chan_idx(4) | state_num(6) | sig(64).
pub const IDX_SIG_SIZE: usize = 74;

/// The static identity of a watched channel, everything that never
/// changes across states. Enough to rebuild both outputs of any of the
/// counterparty's commitments once the state's secret is known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChanStatic {
    pub dest_pkh: [u8; 20],
    /// The owner's delegated revocation basepoint secret.
    pub revocation_base_secret: [u8; 32],
    /// The counterparty's (the potential cheater's) delay key.
    pub delay_pk: [u8; 33],
    /// The owner's refund key, the direct output of every commitment.
    pub refund_pk: [u8; 33],
    pub csv_delay: u16,
    pub capacity: u64,
}

impl ChanStatic {
    pub fn from_watch_desc(d: &WatchDesc) -> Self {
        ChanStatic {
            dest_pkh: d.dest_pkh.0,
            revocation_base_secret: d.revocation_base_secret.0,
            delay_pk: d.delay_pk.0,
            refund_pk: d.refund_pk.0,
            csv_delay: d.csv_delay,
            capacity: d.capacity,
        }
    }

    pub fn to_bytes(&self) -> [u8; STATIC_SIZE] {
        let mut buf = [0u8; STATIC_SIZE];
        buf[..20].copy_from_slice(&self.dest_pkh);
        buf[20..52].copy_from_slice(&self.revocation_base_secret);
        buf[52..85].copy_from_slice(&self.delay_pk);
        buf[85..118].copy_from_slice(&self.refund_pk);
        buf[118..120].copy_from_slice(&self.csv_delay.to_be_bytes());
        buf[120..].copy_from_slice(&self.capacity.to_be_bytes());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() != STATIC_SIZE {
            return Err(Error::BadRecord);
        }
        let mut dest_pkh = [0u8; 20];
        dest_pkh.copy_from_slice(&data[..20]);
        let mut revocation_base_secret = [0u8; 32];
        revocation_base_secret.copy_from_slice(&data[20..52]);
        let mut delay_pk = [0u8; 33];
        delay_pk.copy_from_slice(&data[52..85]);
        let mut refund_pk = [0u8; 33];
        refund_pk.copy_from_slice(&data[85..118]);
        let mut csv_delay = [0u8; 2];
        csv_delay.copy_from_slice(&data[118..120]);
        let mut capacity = [0u8; 8];
        capacity.copy_from_slice(&data[120..]);
        Ok(ChanStatic {
            dest_pkh,
            revocation_base_secret,
            delay_pk,
            refund_pk,
            csv_delay: u16::from_be_bytes(csv_delay),
            capacity: u64::from_be_bytes(capacity),
        })
    }

    /// Revocation key pair for a state, from the delegated basepoint
    /// secret and the revealed elkrem secret.
    pub fn revocation_keys(
        &self,
        secp: &Secp256k1<All>,
        elk_secret: &[u8; 32],
    ) -> Result<(SecretKey, PublicKey), Error> {
        let base_secret = SecretKey::from_slice(&self.revocation_base_secret)
            .map_err(|_| Error::BadRecord)?;
        let state_secret = SecretKey::from_slice(elk_secret).map_err(|_| Error::BadRecord)?;
        let sk = derive_revocation_privkey(secp, &base_secret, &state_secret)?;
        let pk = derive_revocation_pubkey(
            secp,
            &PublicKey::from_secret_key(secp, &base_secret),
            &PublicKey::from_secret_key(secp, &state_secret),
        )?;
        Ok((sk, pk))
    }

    /// The delayed-output script of the cheater's commitment at the
    /// state the secret belongs to.
    pub fn to_local_script(
        &self,
        secp: &Secp256k1<All>,
        elk_secret: &[u8; 32],
    ) -> Result<bitcoin::ScriptBuf, Error> {
        let (_, revocation_pk) = self.revocation_keys(secp, elk_secret)?;
        let delay_pk = PublicKey::from_slice(&self.delay_pk).map_err(|_| Error::BadRecord)?;
        Ok(to_local_script(&delay_pk, self.csv_delay, &revocation_pk))
    }
}

/// One revoked state in the txid index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdxSig {
    pub chan_idx: u32,
    pub state_num: u64,
    pub sig: [u8; 64],
}

impl IdxSig {
    pub fn to_bytes(&self) -> [u8; IDX_SIG_SIZE] {
        let mut buf = [0u8; IDX_SIG_SIZE];
        buf[..4].copy_from_slice(&self.chan_idx.to_be_bytes());
        // state numbers stay under 2^48, six bytes carry them
        buf[4..10].copy_from_slice(&self.state_num.to_be_bytes()[2..]);
        buf[10..].copy_from_slice(&self.sig);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() != IDX_SIG_SIZE {
            return Err(Error::BadRecord);
        }
        let mut chan_idx = [0u8; 4];
        chan_idx.copy_from_slice(&data[..4]);
        let mut state_num = [0u8; 8];
        state_num[2..].copy_from_slice(&data[4..10]);
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&data[10..]);
        Ok(IdxSig {
            chan_idx: u32::from_be_bytes(chan_idx),
            state_num: u64::from_be_bytes(state_num),
            sig,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_round_trip() {
        let statik = ChanStatic {
            dest_pkh: [1; 20],
            revocation_base_secret: [2; 32],
            delay_pk: [3; 33],
            refund_pk: [4; 33],
            csv_delay: 144,
            capacity: 5_000_000,
        };
        let bytes = statik.to_bytes();
        assert_eq!(bytes.len(), STATIC_SIZE);
        assert_eq!(ChanStatic::from_bytes(&bytes).unwrap(), statik);
        assert!(ChanStatic::from_bytes(&bytes[..100]).is_err());
    }

    #[test]
    fn idx_sig_round_trip() {
        let record = IdxSig { chan_idx: 7, state_num: 0x0000_0123_4567_89ab, sig: [9; 64] };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), IDX_SIG_SIZE);
        assert_eq!(&bytes[..4], &[0, 0, 0, 7]);
        assert_eq!(&bytes[4..10], &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab]);
        assert_eq!(IdxSig::from_bytes(&bytes).unwrap(), record);
    }
}

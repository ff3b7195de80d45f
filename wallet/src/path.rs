use serde::{Serialize, Deserialize};

/// First derivation step of every channel key. Plays the role of a
/// BIP43 purpose number for the channel key tree.
pub const CHANNEL_KEY_ROOT: u32 = 508;

/// A fixed-length derivation path: root, coin, use, peer index, channel
/// index. Slot 2 is the purpose selector; the same channel path with a
/// different use yields every key a channel needs.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyPath {
    pub step: [u32; 5],
}

/// What a derived key is for. The value lands in slot 2 of the path.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum KeyUse {
    Fund = 0,
    Refund = 1,
    Delay = 2,
    RevocationBase = 3,
    Elkrem = 4,
}

impl KeyPath {
    /// Path for a channel slot, before the use is chosen.
    pub fn channel(peer_idx: u32, chan_idx: u32) -> Self {
        KeyPath { step: [CHANNEL_KEY_ROOT, 0, 0, peer_idx, chan_idx] }
    }

    /// Same path with the purpose slot set.
    pub fn with_use(mut self, purpose: KeyUse) -> Self {
        self.step[2] = purpose as u32;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_slot_is_the_only_difference() {
        let base = KeyPath::channel(3, 7);
        let fund = base.with_use(KeyUse::Fund);
        let elk = base.with_use(KeyUse::Elkrem);
        assert_eq!(fund.step[3], 3);
        assert_eq!(fund.step[4], 7);
        assert_ne!(fund, elk);
        assert_eq!(fund.with_use(KeyUse::Elkrem), elk);
    }
}

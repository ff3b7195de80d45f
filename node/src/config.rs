use serde::{Serialize, Deserialize};

/// Engine policy knobs. The defaults are what the tests and the daemon
/// run with; embedders can override per node.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Blocks the broadcaster of a commitment waits for its own funds.
    pub csv_delay: u16,
    /// Smallest channel worth opening.
    pub min_capacity: u64,
    /// Largest single push, one whole coin.
    pub max_push: u64,
    /// reserve = capacity / reserve_divisor stays on each side.
    pub reserve_divisor: u64,
    /// Seconds an update exchange may hang before the channel breaks.
    pub update_deadline_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            csv_delay: 5,
            min_capacity: 1_000_000,
            max_push: 100_000_000,
            reserve_divisor: 100,
            update_deadline_secs: 60,
        }
    }
}

//! Store inspector: opens the channel store and the watchtower store
//! read-only and dumps what they hold. The daemon proper runs embedded
//! in a host that provides wallet, transport and block source; this
//! binary is for poking at the databases those runs leave behind.

use std::error::Error;
use std::path::PathBuf;

use structopt::StructOpt;

use node::ChanStore;
use sorceror::Sorceror;

#[derive(StructOpt, Debug)]
#[structopt(name = "pcd")]
/// Payment channel daemon store inspector
struct Config {
    /// Path to the channel store
    #[structopt(long = "db-path", parse(from_os_str), default_value = "target/db/channels")]
    db_path: PathBuf,

    /// Path to the watchtower store
    #[structopt(long = "watch-db-path", parse(from_os_str), default_value = "target/db/sorceror")]
    watch_db_path: PathBuf,

    /// Skip the watchtower store
    #[structopt(long = "no-watch")]
    no_watch: bool,

    /// Print configuration information and exit
    #[structopt(long = "print-config")]
    print_config: bool,

    /// Print version and exit
    #[structopt(long = "print-version")]
    print_version: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = Config::from_args();

    if config.print_version {
        println!("pcd {}", pcd::VERSION);
        return Ok(());
    }
    if config.print_config {
        println!("{:#?}", config);
        return Ok(());
    }

    let store = ChanStore::open(&config.db_path)?;
    let channels = store.channels()?;
    println!("{} channels in {}", channels.len(), config.db_path.display());
    for chan in &channels {
        println!(
            "  ({}, {}) {:?} state {} split {}/{} capacity {} outpoint {:?}",
            chan.desc.peer_idx,
            chan.desc.chan_idx,
            chan.state.phase,
            chan.state.idx,
            chan.state.my_amt,
            chan.state.their_amt,
            chan.desc.capacity,
            chan.desc.funding,
        );
    }

    if !config.no_watch {
        let sorc = Sorceror::open(&config.watch_db_path)?;
        let watched = sorc.channels()?;
        println!("{} watched channels in {}", watched.len(), config.watch_db_path.display());
        for (idx, pkh) in &watched {
            println!("  [{}] {}", idx, hex::encode(&pkh[..]));
        }
    }

    Ok(())
}

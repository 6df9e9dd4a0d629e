use std::net::SocketAddr;

use clap::Parser;
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "COACH_CALL_RELAY_ADDRESS", default_value = "127.0.0.1:9001")]
    pub address: SocketAddr,

    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    #[arg(long, env = "COACH_CALL_RELAY_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

use clap::Parser;
use log::info;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use tokio::net::TcpListener;

use coach_call_relay::config::Config;
use coach_call_relay::router::{self, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    TermLogger::init(
        config.log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let listener = TcpListener::bind(config.address).await?;
    info!("relay listening on {}", listener.local_addr()?);
    axum::serve(listener, router::create(ServerState::default())).await?;
    Ok(())
}

#![allow(clippy::cargo_common_metadata)]

use std::process;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use xshell::{cmd, Shell};

const RELAY_PACKAGE: &str = "coach-call-relay";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Fmt,
    Check,
    Clippy,
    /// Start the relay on the default address.
    Run,
    /// Native tests of the whole workspace.
    Test,
    /// Browser tests of the library against a locally running relay.
    TestWeb,
    Doc,
    PreCommit,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let sh = Shell::new()?;

    match &cli.command {
        Command::Fmt => fmt(&sh)?,
        Command::Check => check(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Run => run(&sh)?,
        Command::Test => test(&sh)?,
        Command::TestWeb => test_web(&sh)?,
        Command::Doc => doc(&sh)?,
        Command::PreCommit => pre_commit(&sh)?,
    };

    Ok(())
}

fn fmt(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo +nightly fmt").run()?)
}

fn check(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo check --all-targets --all-features --workspace").run()?;
    Ok(cmd!(
        sh,
        "cargo check --package coach-call --target wasm32-unknown-unknown"
    )
    .run()?)
}

fn clippy(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo clippy --all-targets --all-features --workspace").run()?)
}

fn run(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo run --package {RELAY_PACKAGE}").run()?)
}

fn test(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo test --workspace").run()?)
}

fn test_web(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo build --package {RELAY_PACKAGE}").run()?;
    let mut relay = process::Command::new(format!("./target/debug/{RELAY_PACKAGE}"))
        .current_dir(project_root::get_project_root()?)
        .spawn()?;

    let result = || -> Result<()> {
        let current_dir = sh.current_dir();
        sh.change_dir(project_root::get_project_root()?.join("library/"));
        cmd!(sh, "wasm-pack test --headless --firefox").run()?;
        cmd!(sh, "wasm-pack test --headless --chrome").run()?;
        sh.change_dir(current_dir);
        Ok(())
    }();

    relay.kill()?;

    result
}

fn doc(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo doc --no-deps --all-features").run()?)
}

fn pre_commit(sh: &Shell) -> Result<()> {
    for cmd in [fmt, check, test, doc] {
        cmd(sh)?;
    }
    Ok(())
}

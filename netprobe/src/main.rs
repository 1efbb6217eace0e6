//! `netprobe` - thin binary entry point over `netprobe_core`.
//!
//! Installs tracing, parses the command line, and delegates every
//! subcommand to `netprobe_core::cli::run`.

use clap::Parser;
use netprobe_core::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Error: failed to build Tokio runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("Error: {err:?}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    netprobe_core::cli::run(cli).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn exit_code(code: i32) -> std::process::ExitCode {
    u8::try_from(code.clamp(0, 255)).map(std::process::ExitCode::from).unwrap_or(std::process::ExitCode::FAILURE)
}

mod config;
mod http;
mod render;
mod upstream;

use std::{
    io::Read,
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use platform_obs::{ObsConfig, init_tracing};
use platform_seal::{SealKey, seal_json};
use tracing::warn;

use crate::{config::AppConfig, http::ServeConfig};

#[derive(Parser, Debug)]
#[command(name = "employee-viewer", version, about = "Sealed employee list viewer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve(ServeCommand),
    /// Print a freshly generated SODIUM_KEY line.
    Keygen,
    /// Seal a JSON document with the configured key and print the payload.
    Seal(SealCommand),
}

#[derive(Args, Debug)]
struct ServeCommand {
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    #[arg(long, value_name = "FILE", default_value = ".env")]
    env_file: PathBuf,
}

impl From<&ServeCommand> for ServeConfig {
    fn from(value: &ServeCommand) -> Self {
        ServeConfig::new(value.host, value.port)
    }
}

#[derive(Args, Debug)]
struct SealCommand {
    #[arg(long, value_name = "FILE", default_value = ".env")]
    env_file: PathBuf,
    #[arg(long, value_name = "FILE", help = "JSON document to seal (stdin when omitted)")]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(ObsConfig::default())?;
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(cmd) => run_server(cmd).await,
        Command::Keygen => keygen(),
        Command::Seal(cmd) => seal_document(cmd),
    }
}

async fn run_server(cmd: ServeCommand) -> Result<()> {
    let config = AppConfig::load(&cmd.env_file)
        .with_context(|| format!("cannot start without {}", cmd.env_file.display()))?;
    http::serve((&cmd).into(), Arc::new(config)).await
}

fn keygen() -> Result<()> {
    let key = SealKey::generate();
    println!("SODIUM_KEY={}", key.to_base64());
    Ok(())
}

fn seal_document(cmd: SealCommand) -> Result<()> {
    let config = AppConfig::load(&cmd.env_file)?;
    let key = config.sealing_key()?;

    let raw = match &cmd.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    let document: serde_json::Value =
        serde_json::from_str(&raw).context("input is not valid JSON")?;
    if !document.is_array() {
        warn!("sealing a non-array document; the employee page will reject it");
    }

    println!("{}", seal_json(&document, &key)?);
    Ok(())
}

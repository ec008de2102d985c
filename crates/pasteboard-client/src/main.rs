//! `pbctl`: command-line access to the pasteboard daemon.
//!
//! ```text
//! pbctl set-text "hello"        copy text
//! pbctl get                     print what is on the clipboard
//! pbctl has --mime text/html    ask whether HTML is available
//! pbctl --json get              machine-readable output
//! ```
//!
//! Each invocation opens one connection, runs one command and exits with a
//! non-zero status if the daemon rejected it.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pasteboard_client::application::commands::{render, run_command, Command};
use pasteboard_client::infrastructure::network::{ClientConfig, PasteboardClient};
use pasteboard_core::CallerInfo;

#[derive(Debug, Parser)]
#[command(name = "pbctl", version, about = "Talk to the pasteboard daemon")]
struct Args {
    /// Address of the daemon's IPC listener.
    #[arg(long, env = "PASTEBOARD_ADDR", default_value = "127.0.0.1:24810")]
    addr: SocketAddr,

    /// Access token presented to the daemon.
    #[arg(long, env = "PASTEBOARD_TOKEN", default_value_t = 0)]
    token: u32,

    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Copy plain text.
    SetText { text: String },
    /// Copy an HTML fragment.
    SetHtml { html: String },
    /// Copy a URI.
    SetUri { uri: String },
    /// Print the clipboard contents.
    Get,
    /// Empty the clipboard.
    Clear,
    /// Whether the clipboard holds anything (or anything of one MIME type).
    Has {
        #[arg(long = "mime")]
        mime_type: Option<String>,
    },
    /// List the MIME types on the clipboard.
    MimeTypes,
    /// Print the change counter.
    ChangeCount,
    /// Print the bundle name of the app that copied the data.
    Source,
    /// Print the name of the device the data came from.
    Device,
    /// Whether the data came from another device.
    IsRemote,
    /// Check the daemon is answering.
    Ping,
}

impl From<Cmd> for Command {
    fn from(cmd: Cmd) -> Self {
        match cmd {
            Cmd::SetText { text } => Command::SetText(text),
            Cmd::SetHtml { html } => Command::SetHtml(html),
            Cmd::SetUri { uri } => Command::SetUri(uri),
            Cmd::Get => Command::Get,
            Cmd::Clear => Command::Clear,
            Cmd::Has { mime_type } => Command::Has { mime_type },
            Cmd::MimeTypes => Command::MimeTypes,
            Cmd::ChangeCount => Command::ChangeCount,
            Cmd::Source => Command::Source,
            Cmd::Device => Command::Device,
            Cmd::IsRemote => Command::IsRemote,
            Cmd::Ping => Command::Ping,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig {
        server_addr: args.addr,
        caller: CallerInfo {
            token_id: args.token,
            pid: std::process::id(),
        },
        timeout: Duration::from_millis(args.timeout_ms),
    };
    let mut client = PasteboardClient::connect(&config)
        .await
        .context("could not reach the pasteboard daemon")?;

    let command = Command::from(args.command);
    debug!(?command, "running command");
    let output = run_command(&mut client, command).await?;

    let text = render(&output, args.json).context("failed to format output")?;
    if !text.is_empty() {
        println!("{text}");
    }
    Ok(())
}

//! Interactive terminal for a remote shell server.

use anyhow::{Context, Result};
use clap::Parser;
use shellmod::controls::{EOI, EOP, PROMPT};
use shellmod::{ExpectError, Session};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shellmod")]
#[command(author, version, about = "Connect to a remote shell server", long_about = None)]
struct Args {
    /// Server address (host or host:port)
    address: String,

    /// Protobuf definition declaring the envelope type
    #[arg(short, long)]
    schema: PathBuf,

    /// Fully qualified envelope type
    #[arg(long, default_value = shellmod::DEFAULT_MESSAGE_TYPE)]
    message_type: String,

    /// Connect with ws:// instead of wss://
    #[arg(long)]
    plain: bool,

    /// URL path of the shell endpoint
    #[arg(long, default_value = "/shell")]
    path: String,

    /// Pause between failed attempts, in milliseconds
    #[arg(long, default_value_t = 3000)]
    reconnect_ms: u64,

    /// Retries allowed after the first failed attempt
    #[arg(long)]
    max_retries: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shellmod=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = Session::builder()
        .address(&args.address)
        .scheme(if args.plain { "ws" } else { "wss" })
        .path(&args.path)
        .schema_type(&args.message_type)
        .reconnect_delay(Duration::from_millis(args.reconnect_ms))
        .log_source("terminal")
        .no_timeout();
    if let Some(max) = args.max_retries {
        builder = builder.max_retries(max);
    }
    let session = builder.build()?;

    session
        .load_schema_file(&args.schema)
        .await
        .with_context(|| format!("loading {}", args.schema.display()))?;
    session.start();
    session.wait_connected().await?;
    eprintln!("connected to {}", session.url());

    let output = tokio::spawn(render(session.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Err(e) = session.write(&line) {
            eprintln!("not sent: {}", e);
        }
    }

    session.shutdown();
    output.await??;
    Ok(())
}

/// Print everything the shell sends, turning control bytes into text.
async fn render(session: Session) -> Result<()> {
    let mut status_next = false;
    loop {
        let chunk = match session.expect_raw().await {
            Ok(chunk) => chunk,
            Err(ExpectError::Shutdown) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut out = std::io::stdout().lock();
        let mut text = Vec::new();
        for &byte in chunk.iter() {
            if status_next {
                status_next = false;
                writeln!(out, "[exit {}]", byte)?;
                continue;
            }
            match byte {
                PROMPT => {
                    out.write_all(&text)?;
                    text.clear();
                    write!(out, "$ ")?;
                }
                EOP => {
                    out.write_all(&text)?;
                    text.clear();
                    status_next = true;
                }
                EOI => text.push(b'\n'),
                other => text.push(other),
            }
        }
        out.write_all(&text)?;
        out.flush()?;
    }
}

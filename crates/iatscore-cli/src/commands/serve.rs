//! The `iatscore serve` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use iatscore_bridge::{build_engine, load_settings_from, Dispatcher};

pub async fn execute(config: Option<PathBuf>) -> Result<()> {
    let settings = load_settings_from(config.as_deref())?;
    let mut dispatcher = Dispatcher::new(build_engine(&settings));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut handled = 0usize;

    tracing::info!("serving requests on stdin");
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = dispatcher.handle_line(&line).await;
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        handled += 1;
    }
    tracing::info!(handled, "stdin closed, shutting down");

    Ok(())
}

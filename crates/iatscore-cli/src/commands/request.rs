//! The `iatscore request` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

use iatscore_bridge::{build_engine, load_settings_from, Dispatcher};

pub async fn execute(config: Option<PathBuf>) -> Result<()> {
    let settings = load_settings_from(config.as_deref())?;
    let mut dispatcher = Dispatcher::new(build_engine(&settings));

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read stdin")?;

    println!("{}", dispatcher.handle_line(input.trim()).await);
    Ok(())
}

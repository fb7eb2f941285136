//! The `iatscore validate` command.

use std::path::PathBuf;

use anyhow::Result;

use iatscore_core::parser::{load_test_config, validate_test_config};

pub fn execute(path: PathBuf) -> Result<()> {
    let config = load_test_config(&path)?;
    println!(
        "Test config: {} [{}] ({} categories, {} attributes, {} block descriptors)",
        config.name,
        config.test_id,
        config.categories.len(),
        config.attributes.len(),
        config.blocks_config.len()
    );

    let warnings = validate_test_config(&config);
    for w in &warnings {
        let prefix = w
            .label
            .as_ref()
            .map(|label| format!("  [{label}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Test config valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}

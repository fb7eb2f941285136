//! The `iatscore init` command.

use std::path::Path;

use anyhow::{Context, Result};

use iatscore_bridge::config::SAMPLE_SETTINGS;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("iatscore.toml"), SAMPLE_SETTINGS)?;

    std::fs::create_dir_all("iat-configs").context("failed to create iat-configs/")?;
    write_if_missing(Path::new("iat-configs/example.json"), EXAMPLE_TEST_CONFIG)?;

    println!("\nNext steps:");
    println!("  1. Edit iat-configs/example.json with your categories and attributes");
    println!("  2. Run: iatscore validate --test-config iat-configs/example.json");
    println!("  3. Run: iatscore serve");

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const EXAMPLE_TEST_CONFIG: &str = r#"{
  "test_id": "flowers-insects",
  "name": "Flowers-Insects IAT",
  "description": "Demonstration IAT pairing flowers and insects with pleasant and unpleasant words",
  "categories": {
    "left": ["rose", "tulip", "daisy", "lily"],
    "right": ["wasp", "flea", "moth", "gnat"]
  },
  "attributes": {
    "left": ["joy", "peace", "love", "gift"],
    "right": ["agony", "filth", "grief", "rotten"]
  }
}
"#;

//! CLI command handlers.

pub mod config;
pub mod render;
pub mod replay;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// Reads `path`, or stdin when it is absent or `-`.
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display())),
        _ => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("read stdin")?;
            Ok(input)
        }
    }
}

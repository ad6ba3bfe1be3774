//! Byte pattern search

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse a hex pattern, ignoring whitespace
fn parse_pattern(pattern: &str) -> Result<Vec<u8>> {
    let compact: String = pattern.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&compact).with_context(|| format!("Invalid hex pattern {pattern:?}"))?;
    anyhow::ensure!(!bytes.is_empty(), "Search pattern is empty");
    Ok(bytes)
}

/// Handle `search`
pub fn handle(input: &Path, pattern: &str, expand: bool) -> Result<()> {
    let needle = parse_pattern(pattern)?;

    let data = if expand {
        super::blob::load(input)?.cursor.into_inner()
    } else {
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?
    };

    let hits = arksave::find_byte_sequence(&data, &needle);
    for offset in &hits {
        println!("{offset:#010x}");
    }
    println!("{} match(es) in {} bytes", hits.len(), data.len());

    Ok(())
}

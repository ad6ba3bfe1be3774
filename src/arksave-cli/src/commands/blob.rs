//! Compressed blob command handlers (expand, inspect, names)

use anyhow::{Context, Result};
use arksave::{Decompressed, Property};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::Config;

/// Read and decompress a blob file
pub fn load(input: &Path) -> Result<Decompressed> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    arksave::decompress(&data).with_context(|| format!("Failed to decompress {}", input.display()))
}

/// Handle `expand`: write the expanded stream and print the name table
pub fn expand(input: &Path, output: Option<&Path>, json: bool) -> Result<()> {
    let blob = load(input)?;
    let config = Config::load()?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.expanded_path(input));
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&output, blob.cursor.as_bytes())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let names = blob.context.names();
    if json {
        let table: BTreeMap<String, &str> = names
            .iter()
            .map(|(id, name)| (format!("{id:#010x}"), *name))
            .collect();
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        println!(
            "Expanded {} bytes (name table at {:#x}) to {}",
            blob.cursor.size(),
            blob.header.names_offset,
            output.display()
        );
        println!("Names ({}):", names.len());
        for (id, name) in names {
            println!("  {id:#010x}  {name}");
        }
    }

    Ok(())
}

/// Handle `inspect`: print the decoded property stream
pub fn inspect(input: &Path, json: bool, skip_invalid: bool) -> Result<()> {
    let mut blob = load(input)?;
    let skip_invalid = skip_invalid || Config::load()?.skip_invalid;

    let mut properties = Vec::new();
    loop {
        match arksave::read_property(&mut blob.cursor, &blob.context) {
            Ok(Some(property)) => properties.push(property),
            Ok(None) => break,
            Err(e) if skip_invalid => {
                tracing::warn!(
                    error = %e,
                    next = %blob.cursor.read_bytes_as_hex(16),
                    "Stopping at undecodable property"
                );
                break;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read properties of {}", input.display())
                })
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&properties)?);
    } else {
        print_properties(&properties)?;
    }

    Ok(())
}

fn print_properties(properties: &[Property]) -> Result<()> {
    for property in properties {
        let index = match property.index {
            0 => String::new(),
            i => format!("[{i}]"),
        };
        println!(
            "{:#08x}  {}{} ({}) = {}",
            property.offset,
            property.name,
            index,
            property.type_tree,
            serde_json::to_string(&property.value)?
        );
    }
    Ok(())
}

/// Handle `names`: scan the property stream for name ids
pub fn names(input: &Path, output: Option<&Path>) -> Result<()> {
    let blob = load(input)?;
    let found = arksave::find_names(blob.property_bytes(), &blob.context);

    match output {
        Some(path) => {
            fs::write(path, serde_json::to_string_pretty(&found)?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} names to {}", found.len(), path.display());
        }
        None => {
            for (offset, name) in &found {
                println!("{offset:#08x}  {name}");
            }
        }
    }

    Ok(())
}

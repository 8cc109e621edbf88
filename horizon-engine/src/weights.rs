//! Node-weight matrix loader
//!
//! Plain text, one matrix row per line. Entries are separated by commas,
//! whitespace, or both. Blank lines and everything after a `#` are ignored.

use anyhow::{Context, Result};
use horizon_field::WeightMatrix;
use std::path::Path;

/// Parse a weight matrix from text.
pub fn parse_weights(text: &str) -> Result<WeightMatrix> {
    let mut rows = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let row = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<f32>()
                    .with_context(|| format!("line {}: bad weight {tok:?}", lineno + 1))
            })
            .collect::<Result<Vec<f32>>>()?;
        rows.push(row);
    }
    Ok(WeightMatrix::from_rows(rows)?)
}

/// Load a weight matrix from a file.
pub fn load_weights(path: impl AsRef<Path>) -> Result<WeightMatrix> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read weight matrix {}", path.display()))?;
    parse_weights(&text).with_context(|| format!("Invalid weight matrix {}", path.display()))
}

pub mod config;
pub mod plan;
pub mod queue;
pub mod simulate;
pub mod validate;

use std::path::Path;

/// Read and deserialize a JSON input file.
pub fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&content)
        .map_err(|e| format!("cannot parse {}: {e}", path.display()))?)
}

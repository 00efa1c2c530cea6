use markowitz_core::OptimizerSettings;
use std::fs;
use std::path::{Path, PathBuf};

/// Load optimizer settings from a `.json`, `.yaml` or `.yml` file.
///
/// Fields left out of the file keep their defaults.
pub fn read_settings(path: &str) -> Result<OptimizerSettings, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    parse_settings(&contents, &extension(&canonical))
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e).into())
}

fn parse_settings(contents: &str, ext: &str) -> Result<OptimizerSettings, String> {
    match ext {
        "json" => serde_json::from_str(contents).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
        other => Err(format!(
            "unsupported settings format '{}'; use .json, .yaml or .yml",
            other
        )),
    }
}

/// Lower-cased extension, empty when there is none.
pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Resolve the path against the working directory and require a regular file.
pub fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.exists() {
        return Err(format!("File not found: {}", canonical.display()).into());
    }

    if !canonical.is_file() {
        return Err(format!("Not a file: {}", canonical.display()).into());
    }

    Ok(canonical)
}

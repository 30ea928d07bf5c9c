use std::path::{Path, PathBuf};

pub fn simplify_file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Joins a path to the directory of the configuration file. Absolute paths are kept.
pub fn resolve_path(root: Option<&Path>, path: &str) -> String {
    match root {
        Some(r) => r.join(path).display().to_string(),
        None => path.to_string(),
    }
}

/// `dir/export.csv` -> `dir/output_export<suffix>.csv`
pub fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    input.with_file_name(format!("output_{}{}.csv", stem, suffix))
}

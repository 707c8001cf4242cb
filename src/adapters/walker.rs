use std::path::{Path, PathBuf};

use crate::error::Result;

/// Normalize a user-supplied extension: `".TXT"`, `"txt"` and `"Txt"` all
/// become `"txt"`.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Files under `root` whose extension matches `extension`, sorted by path.
///
/// Hidden files and directories (names starting with `.`) are skipped.
/// Subdirectories are only visited when `recursive` is set. Symlinked
/// directories are never followed.
pub fn discover_files(
    root: &Path,
    extension: &str,
    recursive: bool,
) -> Result<Vec<PathBuf>> {
    let extension = normalize_extension(extension);
    let mut results = Vec::new();
    walk_dir(root, &extension, recursive, &mut results)?;
    results.sort();
    Ok(results)
}

fn walk_dir(
    current: &Path,
    extension: &str,
    recursive: bool,
    results: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if recursive {
                walk_dir(&path, extension, recursive, results)?;
            }
        } else if (file_type.is_file() || path.is_file())
            && has_extension(&path, extension)
        {
            results.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

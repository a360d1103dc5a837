pub mod build;
pub mod completions;
pub mod eval;
pub mod search;

use std::path::{Path, PathBuf};

/// Resolve a configured or user-supplied path against the project root.
pub fn project_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

//! Application directory paths for sage.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/sage/` | `~/.local/share/sage/` |
//!
//! Override with `SAGE_DATA_DIR` for tests or custom deployments.

use std::path::PathBuf;

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/sage/` by default. Override with the
/// `SAGE_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SAGE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("sage"))
        .unwrap_or_else(|| PathBuf::from("/tmp/sage-data"))
}

/// Knowledge store root (`data_dir()/knowledge/`).
#[must_use]
pub fn knowledge_dir() -> PathBuf {
    data_dir().join("knowledge")
}

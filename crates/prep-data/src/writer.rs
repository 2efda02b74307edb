use std::path::Path;

use prep_core::error::{PrepError, Result};
use prep_core::models::OutputDocument;
use tracing::info;

/// Serialize `doc` as compact JSON and write it to `path` in one write.
/// Missing parent directories are created. Returns the number of bytes
/// written.
pub fn write_document(doc: &OutputDocument, path: &Path) -> Result<usize> {
    let json = serde_json::to_vec(doc)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PrepError::FileWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, &json).map_err(|source| PrepError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Wrote {} bytes to {}", json.len(), path.display());
    Ok(json.len())
}

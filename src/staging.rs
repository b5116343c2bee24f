use crate::error::{DedupError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `dest` with `bytes` via a temporary sibling file and a rename, so
/// readers never observe a half-written job list.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(parent)
        .map_err(|err| DedupError::filesystem("stage temp file in", parent, err))?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|err| DedupError::filesystem("write", staged.path(), err))?;
    staged
        .persist(dest)
        .map_err(|err| DedupError::filesystem("publish", dest, err.error))?;
    Ok(())
}

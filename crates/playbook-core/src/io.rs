use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace the artifact at `path` with `data`, creating missing parent
/// directories. The bytes land in a sibling temp file first, so a runner
/// reading `path` sees either the old document or the whole new one.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

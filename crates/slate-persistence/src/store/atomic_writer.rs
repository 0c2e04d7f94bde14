use slate_core::SlateResult;
use std::path::Path;
use tokio::fs;

/// Write-to-temp-then-rename file writer.
///
/// A crash mid-write leaves the previous file contents intact; readers
/// never observe a partially written file.
pub struct AtomicWriter;

impl AtomicWriter {
    /// Atomically replace `path` with `data`, creating parent
    /// directories as needed. The temp file lives in the same directory
    /// so the rename stays on one filesystem.
    pub async fn write_atomic(path: &Path, data: &[u8]) -> SlateResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).await?;

        let temp_file = tempfile::NamedTempFile::new_in(parent)?;
        let temp_path = temp_file.path().to_path_buf();
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, path).await?;

        tracing::debug!("wrote {} bytes to {}", data.len(), path.display());
        Ok(())
    }

    pub async fn read_all(path: &Path) -> SlateResult<Vec<u8>> {
        let data = fs::read(path).await?;
        tracing::debug!("read {} bytes from {}", data.len(), path.display());
        Ok(data)
    }
}

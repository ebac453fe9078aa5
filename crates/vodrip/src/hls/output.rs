// HLS Assembler: concatenates stored segment slots, in manifest order, into a
// single transport-stream file.

use crate::hls::error::AssembleError;
use crate::hls::store::SegmentStore;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub path: PathBuf,
    pub bytes_written: u64,
    /// Positions that had no stored bytes, ascending.
    pub missing: Vec<usize>,
}

/// Write slots `0..expected` to `path`. Empty slots are skipped and reported;
/// only output I/O errors are fatal.
pub async fn assemble(
    store: &dyn SegmentStore,
    expected: usize,
    path: &Path,
) -> Result<AssemblyReport, AssembleError> {
    let io_err = |source| AssembleError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let file = File::create(path).await.map_err(io_err)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    let mut bytes_written = 0u64;
    let mut missing = Vec::new();

    for index in 0..expected {
        let slot = match store.get(index).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!(index, error = %e, "Failed to read segment slot, skipping");
                None
            }
        };
        match slot {
            Some(data) => {
                writer.write_all(&data).await.map_err(io_err)?;
                bytes_written += data.len() as u64;
                debug!(index, bytes = data.len(), "Appended segment");
            }
            None => {
                warn!(index, "Segment missing from merged output");
                missing.push(index);
            }
        }
    }

    writer.flush().await.map_err(io_err)?;
    writer.into_inner().sync_all().await.map_err(io_err)?;

    info!(
        path = %path.display(),
        bytes_written,
        segments = expected,
        missing = missing.len(),
        "Merged segments"
    );

    Ok(AssemblyReport {
        path: path.to_path_buf(),
        bytes_written,
        missing,
    })
}

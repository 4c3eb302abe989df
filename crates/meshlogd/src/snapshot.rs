//! Snapshot persistence with atomic file replacement
//!
//! A snapshot is the state map written through the shared entry codec. The
//! writer targets a temporary file next to the destination and only renames
//! it into place after a successful fsync, so a failed or interrupted save
//! leaves the previous snapshot intact.

use meshlog_core::{GossipState, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// A file that is renamed over `dst_path` on a successful [`close`].
///
/// Dropping without closing discards the temporary file and leaves the
/// destination untouched.
pub struct ReplaceFile {
    file: Option<File>,
    tmp_path: PathBuf,
    dst_path: PathBuf,
}

impl ReplaceFile {
    /// Fsync, close, and atomically move the file to its destination.
    pub fn close(mut self) -> io::Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp_path, &self.dst_path)
    }
}

impl Write for ReplaceFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(f) => f.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "file already closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for ReplaceFile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Open a temporary file `<path>.<random-hex>` that replaces `path` when
/// closed.
pub fn open_replace(path: impl AsRef<Path>) -> io::Result<ReplaceFile> {
    let dst_path = path.as_ref().to_path_buf();
    let tmp_path = PathBuf::from(format!("{}.{:016x}", dst_path.display(), rand::random::<u64>()));
    let file = File::create(&tmp_path)?;
    Ok(ReplaceFile {
        file: Some(file),
        tmp_path,
        dst_path,
    })
}

/// Load a snapshot produced by `NotificationLog::snapshot` into a fresh
/// state map. An empty stream yields an empty state.
pub fn load_snapshot(r: impl Read) -> Result<GossipState> {
    GossipState::read_from(&mut BufReader::new(r))
}

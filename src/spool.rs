//! Temp-file lifecycle for in-progress DATA payloads.
//!
//! A `SpoolFile` lives in `tmp/` while the client streams message data and
//! is atomically renamed into `queue/` once the payload is complete. An
//! unpromoted file (client disconnect, reset, oversize mail) is unlinked
//! when the `SpoolFile` is dropped.

use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::TempPath;
use uuid::Uuid;

use crate::internal;

#[derive(Debug)]
pub struct SpoolFile {
    file: File,
    path: TempPath,
    /// Local part of the sender, used to build the queue file name.
    local: String,
}

impl SpoolFile {
    /// Creates a new exclusive temp file in `tmp_dir` and writes the envelope
    /// header into it.
    pub fn create(tmp_dir: &Path, local: &str, header: &[u8]) -> io::Result<Self> {
        let named = tempfile::Builder::new().prefix("tmp.").tempfile_in(tmp_dir)?;
        let (mut file, path) = named.into_parts();
        file.write_all(header)?;

        Ok(Self {
            file,
            path,
            local: local.to_string(),
        })
    }

    /// Appends a chunk of message data.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    /// Flushes the file to disk and atomically renames it into `queue_dir`
    /// as `<local>-<uuid>.mail`. Returns the queue path.
    pub fn promote(self, queue_dir: &Path) -> io::Result<PathBuf> {
        self.file.sync_all()?;

        let mut path = self.path;
        loop {
            let target = queue_dir.join(format!("{}-{}.mail", self.local, Uuid::new_v4()));
            match path.persist_noclobber(&target) {
                Ok(()) => return Ok(target),
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    internal!("queue name collision on {}, retrying", target.display());
                    path = err.path;
                }
                Err(err) => return Err(err.error),
            }
        }
    }
}

//! Advisory run-directory locking, so two writers never race on the same
//! `run-<id>` directory (§4.1 failure mode: "fail fast ... if two writers
//! race").

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Holds an exclusive, non-blocking advisory lock on `<root>/.lock` for as
/// long as it's alive. The lock is released automatically when the
/// `Workdir` (and this guard) is dropped.
pub struct RunLock {
    file: File,
}

impl RunLock {
    pub fn acquire(root: &Path) -> io::Result<Self> {
        let path = root.join(".lock");
        let file = OpenOptions::new().create(true).write(true).open(&path)?;
        file.try_lock_exclusive()?;
        Ok(RunLock { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

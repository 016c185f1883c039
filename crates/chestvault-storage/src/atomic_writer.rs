//! Temp-file-then-rename writer for crash-safe record files

use crate::traits::StorageResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes into `<target>.tmp` and renames over the target on commit.
///
/// A writer dropped before [`commit`](AtomicWriter::commit) removes its temp
/// file and leaves the previous target contents in place.
pub struct AtomicWriter {
    temp_path: PathBuf,
    target: PathBuf,
    file: Option<File>,
}

impl AtomicWriter {
    /// Open a writer for `target`, creating missing parent directories
    pub fn create<P: AsRef<Path>>(target: P) -> StorageResult<Self> {
        let target = target.as_ref().to_path_buf();

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut temp = target.as_os_str().to_owned();
        temp.push(".tmp");
        let temp_path = PathBuf::from(temp);

        let file = File::create(&temp_path)?;

        Ok(Self {
            temp_path,
            target,
            file: Some(file),
        })
    }

    /// Append data to the pending contents
    pub fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(data)?;
        }
        Ok(())
    }

    /// Flush to disk and move the temp file over the target
    pub fn commit(mut self) -> StorageResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }

        fs::rename(&self.temp_path, &self.target)?;
        Ok(())
    }

    /// One-shot helper: write `data` to `target` atomically
    pub fn write_file<P: AsRef<Path>>(target: P, data: &[u8]) -> StorageResult<()> {
        let mut writer = Self::create(target)?;
        writer.write(data)?;
        writer.commit()
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        // After a successful commit the temp file is gone and this is a no-op
        let _ = fs::remove_file(&self.temp_path);
    }
}

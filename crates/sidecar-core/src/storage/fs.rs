use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::SidecarError;

const LOCK_FILE: &str = ".lock";

/// Advisory lock over a store directory, released on drop.
///
/// Writers take it exclusively; readers take it shared so they never observe
/// a half-finished multi-file update.
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    pub fn exclusive(dir: &Path) -> Result<Self, SidecarError> {
        let file = Self::open(dir)?;
        fs2::FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    pub fn shared(dir: &Path) -> Result<Self, SidecarError> {
        let file = Self::open(dir)?;
        fs2::FileExt::lock_shared(&file)?;
        Ok(Self { file })
    }

    fn open(dir: &Path) -> Result<File, SidecarError> {
        fs::create_dir_all(dir)?;
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Replace `path` with `contents` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), SidecarError> {
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Read a file, mapping "does not exist" to `None`.
pub fn read_optional(path: &Path) -> Result<Option<String>, SidecarError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp.{}", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc.json"]);
    }

    #[test]
    fn test_read_optional_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(read_optional(&tmp.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_lock_creates_dir_and_reacquires_after_drop() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        {
            let _guard = StoreLock::exclusive(&dir).unwrap();
            assert!(dir.join(".lock").exists());
        }
        let _shared = StoreLock::shared(&dir).unwrap();
    }
}

use crate::error::{MergeError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// File access used by the orchestrator
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read_text(&self, path: &Path) -> Result<String>;
    fn write_text(&self, path: &Path, text: &str) -> Result<()>;
    fn create_directory(&self, path: &Path) -> Result<()>;
}

/// Local disk; writes land through a `.tmp` sibling and a rename
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map_or_else(OsString::new, OsString::from);
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl FileSystem for LocalFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_text(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| MergeError::io(path, e))
    }

    fn write_text(&self, path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.create_directory(parent)?;
        }
        let tmp = Self::tmp_path(path);
        std::fs::write(&tmp, text).map_err(|e| MergeError::io(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(MergeError::io(path, e));
        }
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| MergeError::io(path, e))
    }
}

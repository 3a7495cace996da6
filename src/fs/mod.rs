// src/fs/mod.rs

//! Minimal filesystem interface used by the output tail watcher, so the
//! watcher can be driven against an in-memory tree in tests.

use std::fmt::Debug;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Last modification time.
    fn modified(&self, path: &Path) -> Result<SystemTime>;

    /// Current length in bytes.
    fn len(&self, path: &Path) -> Result<u64>;

    /// Every byte from `offset` to the current end of file.
    fn read_from(&self, path: &Path, offset: u64) -> Result<Vec<u8>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("reading mtime of {:?}", path))
    }

    fn len(&self, path: &Path) -> Result<u64> {
        Ok(fs::metadata(path)
            .with_context(|| format!("reading metadata of {:?}", path))?
            .len())
    }

    fn read_from(&self, path: &Path, offset: u64) -> Result<Vec<u8>> {
        let mut file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("seeking {:?} to {offset}", path))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .with_context(|| format!("reading file {:?}", path))?;
        Ok(buf)
    }
}

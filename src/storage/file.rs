//! # File Substrate
//!
//! `StoreFile` owns the backing file descriptor for a store and provides the
//! two primitives everything above it is built from: growing the file and
//! mapping a byte range of it into memory.
//!
//! The block cache maps individual blocks on demand rather than the whole
//! file, so growing the file never invalidates existing mappings: a region
//! mapped before a `set_len` stays valid afterwards. That is what lets the
//! cache hand out stable pointers while the allocator keeps extending the
//! file underneath it.
//!
//! `map_range` accepts arbitrary byte offsets; `memmap2` aligns the start of
//! the underlying `mmap(2)` call down to a page boundary internally and
//! offsets the returned pointer, so callers never deal with page arithmetic.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use memmap2::{MmapMut, MmapOptions};

#[derive(Debug)]
pub struct StoreFile {
    file: File,
    path: PathBuf,
}

impl StoreFile {
    /// Opens `path` read/write, creating it with mode 0600 if missing. An
    /// existing file is never truncated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let file = options
            .open(&path)
            .wrap_err_with(|| format!("failed to open store file '{}'", path.display()))?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> Result<u64> {
        let metadata = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?;
        Ok(metadata.len())
    }

    /// Grows the file to at least `len` bytes; new bytes read as zero.
    /// Never shrinks.
    pub fn ensure_len(&self, len: u64) -> Result<()> {
        if self.size()? >= len {
            return Ok(());
        }
        self.file
            .set_len(len)
            .wrap_err_with(|| format!("failed to grow '{}' to {} bytes", self.path.display(), len))
    }

    /// Maps exactly `[offset, offset + len)` of the file as a shared
    /// writable region.
    pub fn map_range(&self, offset: u64, len: usize) -> Result<MmapMut> {
        // SAFETY: MmapMut::map_mut is unsafe because a memory-mapped file can
        // be modified externally. This is safe because:
        // 1. The store owns its file for the lifetime of the engine; the
        //    format is not meant to be written by other processes.
        // 2. The caller (block cache / meta mapping) only requests ranges it
        //    has grown the file to cover, so the mapping is fully backed.
        // 3. The mapping's lifetime is managed by the cache frame or the
        //    tree's meta field, preventing use-after-unmap.
        unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map_mut(&self.file)
                .wrap_err_with(|| {
                    format!(
                        "failed to map {} bytes at offset {} of '{}'",
                        len,
                        offset,
                        self.path.display()
                    )
                })
        }
    }
}

//! Flash filesystem adapter.
//!
//! Implements [`StoragePort`] over a directory tree.  On the device the
//! tree is the wear-levelled FAT partition mounted at [`FLASH_MOUNT`]; on
//! the host any directory works (tests use a temp dir).
//!
//! # Guarantees
//!
//! - Atomic writes: data goes to `<path>.tmp`, is synced, then renamed over
//!   the target, so a power cut leaves either the old or the new file.
//! - Confinement: paths are relative to the root; `..` and absolute paths
//!   are rejected.
//! - Degradation: a store that could not be mounted is *detached*.  Every
//!   operation fails with [`StorageError::IoError`], so the boot still runs
//!   with no persistence and the Jotter under it writes nothing.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};

/// VFS mount point of the data partition on the device.
pub const FLASH_MOUNT: &str = "/flash";

#[cfg(target_os = "espidf")]
const FLASH_PARTITION: &[u8] = b"storage\0";
#[cfg(target_os = "espidf")]
const FLASH_MOUNT_C: &[u8] = b"/flash\0";

pub struct FsStore {
    root: PathBuf,
    mounted: bool,
}

impl FsStore {
    /// Use `root` as the storage root.  The directory must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: true,
        }
    }

    /// A store with nothing behind `root`; every operation fails.
    pub fn detached(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    /// [`mount`](Self::mount), falling back to a detached store.
    pub fn mount_or_detached() -> Self {
        match Self::mount() {
            Ok(store) => store,
            Err(e) => {
                warn!("FsStore: mount failed ({}), continuing without persistence", e);
                Self::detached(FLASH_MOUNT)
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Mount the FAT data partition and root the store at it.
    ///
    /// The partition is formatted if it cannot be mounted (first boot).
    #[cfg(target_os = "espidf")]
    pub fn mount() -> Result<Self, StorageError> {
        use esp_idf_svc::sys::*;

        let mount_cfg = esp_vfs_fat_mount_config_t {
            format_if_mount_failed: true,
            max_files: 8,
            allocation_unit_size: 4096,
            ..Default::default()
        };
        let mut wl_handle: wl_handle_t = WL_INVALID_HANDLE as wl_handle_t;
        // SAFETY: single call from the boot task before any file access;
        // both C strings are NUL-terminated statics.
        let ret = unsafe {
            esp_vfs_fat_spiflash_mount_rw_wl(
                FLASH_MOUNT_C.as_ptr() as *const _,
                FLASH_PARTITION.as_ptr() as *const _,
                &mount_cfg,
                &mut wl_handle,
            )
        };
        if ret != ESP_OK as i32 {
            warn!("FsStore: FAT mount failed ({})", ret);
            return Err(StorageError::IoError);
        }
        info!("FsStore: FAT partition mounted at {}", FLASH_MOUNT);
        Ok(Self::new(FLASH_MOUNT))
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn mount() -> Result<Self, StorageError> {
        let root = std::env::temp_dir().join("nodeboot-flash");
        fs::create_dir_all(&root)?;
        info!("FsStore(sim): rooted at {}", root.display());
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a store-relative `path`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if !self.mounted {
            return Err(StorageError::IoError);
        }
        let rel = Path::new(path);
        if path.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            warn!("FsStore: rejected path '{}'", path);
            return Err(StorageError::InvalidData);
        }
        Ok(self.root.join(rel))
    }
}

impl StoragePort for FsStore {
    fn read_to_string(&self, path: &str) -> Result<String, StorageError> {
        let full = self.resolve(path)?;
        Ok(fs::read_to_string(full)?)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = full.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &full)?;
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        match fs::remove_file(full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.is_file())
    }
}

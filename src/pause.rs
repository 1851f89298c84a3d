//! Pause container provisioning.
//!
//! The pause container holds the pod network namespace open. Its rootfs
//! is a single static binary staged in the host directory that is shared
//! into the guest:
//!
//! ```text
//! <shared_dir>/<pod_id>/pause-container/rootfs/pause
//! ```
//!
//! The binary is written to a temp file in the destination directory and
//! renamed into place, so the guest never sees a truncated binary.

use crate::error::{Error, Result};
use hyperbridge_protocol::{PAUSE_BIN_NAME, PAUSE_CONTAINER_NAME, ROOTFS_DIR};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Mode of the staged pause binary.
const PAUSE_BIN_MODE: u32 = 0o755;

/// Stages pause binaries under a shared directory.
///
/// The shared directory is fixed at construction. Calls for the same pod
/// are serialized; different pods proceed in parallel.
#[derive(Debug)]
pub struct PauseProvisioner {
    shared_dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PauseProvisioner {
    /// Create a provisioner rooted at `shared_dir`.
    pub fn new(shared_dir: impl Into<PathBuf>) -> Self {
        Self {
            shared_dir: shared_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    /// Shared directory of a pod.
    pub fn pod_dir(&self, pod_id: &str) -> PathBuf {
        self.shared_dir.join(pod_id)
    }

    /// Rootfs directory of the pause container for a pod.
    pub fn rootfs_dir(&self, pod_id: &str) -> PathBuf {
        self.pod_dir(pod_id).join(PAUSE_CONTAINER_NAME).join(ROOTFS_DIR)
    }

    /// Final location of the pause binary for a pod.
    pub fn destination(&self, pod_id: &str) -> PathBuf {
        self.rootfs_dir(pod_id).join(PAUSE_BIN_NAME)
    }

    /// Copy the pause binary at `source` into the pod's pause rootfs.
    ///
    /// Missing directories are created. Returns the destination path.
    pub fn provision(&self, pod_id: &str, source: &Path) -> Result<PathBuf> {
        validate_pod_id(pod_id).map_err(|e| Error::provision(pod_id, e))?;

        let lock = self.pod_lock(pod_id);
        let _guard = lock.lock();

        let rootfs = self.rootfs_dir(pod_id);
        let dest = rootfs.join(PAUSE_BIN_NAME);

        copy_atomic(source, &rootfs, &dest).map_err(|e| {
            tracing::warn!(
                pod_id,
                src = %source.display(),
                error = %e,
                "failed to stage pause binary"
            );
            Error::provision(pod_id, e)
        })?;

        tracing::info!(pod_id, path = %dest.display(), "pause binary staged");
        Ok(dest)
    }

    /// Remove a pod's pause container directory.
    ///
    /// The pod directory itself is removed only when nothing else is left
    /// in it. Anything already gone is not an error.
    pub fn remove(&self, pod_id: &str) -> Result<()> {
        validate_pod_id(pod_id).map_err(|e| Error::provision(pod_id, e))?;

        let lock = self.pod_lock(pod_id);
        {
            let _guard = lock.lock();
            let pause_dir = self.pod_dir(pod_id).join(PAUSE_CONTAINER_NAME);
            match fs::remove_dir_all(&pause_dir) {
                Ok(()) => tracing::debug!(pod_id, path = %pause_dir.display(), "removed pause rootfs"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::provision(pod_id, e)),
            }

            // Other containers may still have content here.
            let _ = fs::remove_dir(self.pod_dir(pod_id));
        }
        drop(lock);

        // Forget the lock only when no other caller holds it.
        let mut locks = self.locks.lock();
        if locks
            .get(pod_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(pod_id);
        }
        Ok(())
    }

    fn pod_lock(&self, pod_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(pod_id.to_string())
            .or_default()
            .clone()
    }
}

/// A pod id must be a single normal path component.
fn validate_pod_id(pod_id: &str) -> io::Result<()> {
    let invalid = |reason: &str| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid pod id '{}': {}", pod_id, reason),
        )
    };

    if pod_id.is_empty() {
        return Err(invalid("empty"));
    }
    if pod_id.contains('\0') {
        return Err(invalid("contains NUL"));
    }
    if pod_id.contains('/') || pod_id.contains('\\') {
        return Err(invalid("contains path separator"));
    }

    let mut components = Path::new(pod_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("not a plain directory name")),
    }
}

/// Copy `src` to `dest` through a temp file in `dir`.
fn copy_atomic(src: &Path, dir: &Path, dest: &Path) -> io::Result<()> {
    let mut source = File::open(src)?;
    if !source.metadata()?.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", src.display()),
        ));
    }

    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".pause.")
        .tempfile_in(dir)?;
    io::copy(&mut source, tmp.as_file_mut())?;
    tmp.as_file()
        .set_permissions(Permissions::from_mode(PAUSE_BIN_MODE))?;
    tmp.as_file().sync_all()?;

    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

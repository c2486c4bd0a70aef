use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Hard upper bound for any shard payload we will attempt to deserialize.
///
/// Shard corruption should degrade to an empty shard, not an out-of-memory
/// crash: a corrupted length prefix must never request an enormous allocation.
/// Real shard files are a few kilobytes.
pub(crate) const PAYLOAD_LIMIT_BYTES: usize = 8 * 1024 * 1024;

pub(crate) fn bincode_options() -> impl bincode::Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(PAYLOAD_LIMIT_BYTES as u64)
}

pub(crate) fn bincode_serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode_options().serialize(value)?)
}

pub(crate) fn bincode_deserialize<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    Ok(bincode_options().deserialize(bytes)?)
}

/// Reads a shard file, returning `None` for anything that should be treated
/// as "no prior statistics": missing file, non-file, or oversized payload.
pub(crate) fn read_file_limited(path: &Path) -> Option<Vec<u8>> {
    // Avoid following symlinks out of the statistics directory.
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    target: "sift.stats",
                    path = %path.display(),
                    error = %err,
                    "failed to stat statistics unit file"
                );
            }
            return None;
        }
    };
    if !meta.is_file() || meta.len() > PAYLOAD_LIMIT_BYTES as u64 {
        tracing::warn!(
            target: "sift.stats",
            path = %path.display(),
            len = meta.len(),
            "ignoring invalid statistics unit file"
        );
        return None;
    }

    match fs::read(path) {
        Ok(bytes) if bytes.len() <= PAYLOAD_LIMIT_BYTES => Some(bytes),
        Ok(_) => None,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    target: "sift.stats",
                    path = %path.display(),
                    error = %err,
                    "failed to read statistics unit file"
                );
            }
            None
        }
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `bytes` to `path` via a unique tempfile + rename so a crash never
/// leaves a half-written shard behind.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Err(io::Error::other("path has no parent").into());
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    fs::create_dir_all(parent)?;

    let (tmp_path, mut file) = open_unique_tmp_file(path, parent)?;
    let write_result = (|| -> Result<()> {
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(err) = write_result {
        drop(file);
        remove_tmp_best_effort(&tmp_path);
        return Err(err);
    }
    drop(file);

    let renamed = fs::rename(&tmp_path, path).or_else(|err| {
        // On Windows, `rename` doesn't overwrite. Remove the destination and
        // retry once; shard writes are serialized by the store lock.
        if cfg!(windows) && (err.kind() == io::ErrorKind::AlreadyExists || path.exists()) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                Err(remove_err) => return Err(remove_err),
            }
            fs::rename(&tmp_path, path)
        } else {
            Err(err)
        }
    });

    match renamed {
        Ok(()) => {
            sync_dir_best_effort(parent);
            Ok(())
        }
        Err(err) => {
            remove_tmp_best_effort(&tmp_path);
            Err(err.into())
        }
    }
}

fn remove_tmp_best_effort(tmp_path: &Path) {
    if let Err(err) = fs::remove_file(tmp_path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::debug!(
                target: "sift.stats",
                path = %tmp_path.display(),
                error = %err,
                "failed to remove temporary unit file"
            );
        }
    }
}

fn sync_dir_best_effort(dir: &Path) {
    // After publishing via rename, fsync the directory entry so the rename
    // survives a crash/power loss.
    #[cfg(unix)]
    {
        match fs::File::open(dir).and_then(|dir| dir.sync_all()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::debug!(
                    target: "sift.stats",
                    dir = %dir.display(),
                    error = %err,
                    "failed to sync statistics directory (best effort)"
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = dir;
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

//! Persistent mount-table registrar.
//!
//! [`FsTab`] appends one entry to the system mount table so a mount
//! survives reboot.  The device identity written is `UUID=<value>`
//! when the device's filesystem UUID can be resolved, the raw device
//! path otherwise; adding a device already present under either
//! identity is rejected.
//!
//! The table is a line-oriented text file owned by the operating
//! system: each non-empty, non-comment line is six whitespace-
//! separated fields (device, mountpoint, type, comma-joined options,
//! dump, pass).  Unaffected lines are preserved byte-for-byte; the
//! whole file is rewritten atomically (temp file + rename) so an
//! interrupted write cannot corrupt it.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::types::FstabRecord;

/// Registrar for the persistent mount table.
pub struct FsTab {
    path: PathBuf,
    by_uuid_dir: PathBuf,
    // add() is a read-check-rewrite over one shared file; concurrent
    // adds must serialize or one entry is silently dropped.
    write_lock: Mutex<()>,
}

impl FsTab {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_paths(&config.fstab_path, &config.by_uuid_dir)
    }

    pub fn with_paths(path: impl Into<PathBuf>, by_uuid_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            by_uuid_dir: by_uuid_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a device in the mount table.
    ///
    /// Fails with [`StorageError::AlreadyRegistered`] when the device
    /// is already present, matched by raw path or by resolved UUID;
    /// the table is left untouched in that case.  Bind mounts and
    /// alias device nodes for the same filesystem are not detected.
    pub async fn add(
        &self,
        device: &str,
        mount_point: &str,
        fs_type: &str,
        options: &[String],
        dump: u32,
        pass: u32,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        let uuid = self.fs_uuid(device).await;
        let uuid_identity = uuid.as_ref().map(|u| format!("UUID={u}"));

        let records = self.list().await?;
        let duplicate = records.iter().any(|record| {
            record.device == device || Some(&record.device) == uuid_identity.as_ref()
        });
        if duplicate {
            return Err(StorageError::AlreadyRegistered(device.to_owned()));
        }

        let identity = match uuid_identity {
            Some(identity) => identity,
            None => {
                warn!(device, "UUID not found for device, using raw path");
                device.to_owned()
            }
        };

        let mut content = self.read_table().await?;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!(
            "{identity}\t{mount_point}\t{fs_type}\t{}\t{dump}\t{pass}\n",
            options.join(",")
        ));

        self.safe_write(&content).await?;
        debug!(device, mount_point, "mount table entry added");
        Ok(())
    }

    /// Parse every entry of the current table.  Comment and blank
    /// lines are skipped; a missing table reads as empty.
    pub async fn list(&self) -> Result<Vec<FstabRecord>, StorageError> {
        let content = self.read_table().await?;
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(parse_record)
            .collect()
    }

    /// Resolve the filesystem UUID of `device` by scanning the
    /// UUID-indexed device-link directory and comparing canonicalized
    /// targets.
    async fn fs_uuid(&self, device: &str) -> Option<String> {
        let device = tokio::fs::canonicalize(device).await.ok()?;
        let mut dir = tokio::fs::read_dir(&self.by_uuid_dir).await.ok()?;
        while let Ok(Some(entry)) = dir.next_entry().await {
            if let Ok(target) = tokio::fs::canonicalize(entry.path()).await
                && target == device
            {
                return Some(entry.file_name().to_string_lossy().into_owned());
            }
        }
        None
    }

    async fn read_table(&self) -> Result<String, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StorageError::Io(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Write the full table contents to a temporary file next to the
    /// table, then rename it over the original.
    async fn safe_write(&self, content: &str) -> Result<(), StorageError> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "fstab".to_owned());
        let tmp = dir.join(format!(".{name}.tmp"));

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StorageError::Io(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StorageError::Io(format!("rename {}: {e}", tmp.display())))?;
        Ok(())
    }
}

fn parse_record(line: &str) -> Result<FstabRecord, StorageError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let fields: [&str; 6] = fields.try_into().map_err(|_| {
        StorageError::Io(format!("malformed mount table line: {line:?}"))
    })?;
    let [device, mount_point, fs_type, options, dump, pass] = fields;
    let parse_int = |what: &str, value: &str| {
        value
            .parse::<u32>()
            .map_err(|_| StorageError::Io(format!("bad {what} field in mount table line: {line:?}")))
    };
    Ok(FstabRecord {
        device: device.to_owned(),
        mount_point: mount_point.to_owned(),
        fs_type: fs_type.to_owned(),
        options: options.split(',').map(str::to_owned).collect(),
        dump: parse_int("dump", dump)?,
        pass: parse_int("pass", pass)?,
    })
}

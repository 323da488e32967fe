use crate::models::error::SError;
use crate::utils::logging::AUDIT_TARGET;
use crate::utils::time::{get_unix_timestamp, get_unix_timestamp_nanos};
use crate::utils::toml::Toml;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{info, instrument, warn};

const POINT_FILE: &str = "point.toml";
const FILES_DIR: &str = "files";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub target: Utf8PathBuf,
    /// Copy of the target inside the restore point; `None` when the path did not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<Utf8PathBuf>,
    /// Mod whose content was on disk when the snapshot was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
}

/// Snapshot of every enabled target path, taken before the load order is re-applied.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RestorePoint {
    pub id: String,
    pub label: String,
    pub created_at: u64,
    /// Mods that were enabled at the time; a rollback needs the same set.
    pub enabled: Vec<String>,
    #[serde(default)]
    pub entries: Vec<SnapshotEntry>,
}

/// `restore_points/<id>/point.toml` plus the copied files under `files/`.
pub struct RestorePointStore {
    root: Utf8PathBuf,
    keep: usize,
}

impl RestorePointStore {
    pub fn new(root: &Utf8Path, keep: usize) -> Self {
        Self {
            root: root.to_owned(),
            keep,
        }
    }

    pub fn enabled(&self) -> bool {
        self.keep > 0
    }

    fn dir(&self, id: &str) -> Utf8PathBuf {
        self.root.join(id)
    }

    /// Copies every existing target into a new restore point and prunes the oldest ones.
    #[instrument(skip(self, enabled, targets))]
    pub fn create(
        &self,
        label: &str,
        enabled: Vec<String>,
        targets: Vec<(Utf8PathBuf, Option<String>)>,
    ) -> Result<RestorePoint, SError> {
        let id = get_unix_timestamp_nanos().to_string();
        let dir = self.dir(&id);

        let point = match self.write_point(&dir, &id, label, enabled, targets) {
            Ok(point) => point,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&dir) {
                    warn!(dir = %dir, error = %cleanup, "failed to remove partial restore point");
                }
                return Err(e);
            }
        };

        info!(id = %point.id, paths = point.entries.len(), "restore point created");
        self.prune()?;
        Ok(point)
    }

    fn write_point(
        &self,
        dir: &Utf8Path,
        id: &str,
        label: &str,
        enabled: Vec<String>,
        targets: Vec<(Utf8PathBuf, Option<String>)>,
    ) -> Result<RestorePoint, SError> {
        let files = dir.join(FILES_DIR);
        fs::create_dir_all(&files).map_err(|e| SError::io_failure(&files, "create dir", e))?;

        let mut entries = Vec::with_capacity(targets.len());
        for (i, (target, writer)) in targets.into_iter().enumerate() {
            let stored = match target.symlink_metadata() {
                Ok(meta) if meta.is_file() => {
                    let rel = Utf8PathBuf::from(FILES_DIR).join(i.to_string());
                    fs::copy(&target, dir.join(&rel)).map_err(|e| SError::io_failure(&target, "snapshot", e))?;
                    Some(rel)
                }
                Ok(_) => return Err(SError::io_failure(&target, "snapshot", "not a regular file")),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(SError::io_failure(&target, "snapshot", e)),
            };
            entries.push(SnapshotEntry { target, stored, writer });
        }

        let point = RestorePoint {
            id: id.to_string(),
            label: label.to_string(),
            created_at: get_unix_timestamp(),
            enabled,
            entries,
        };
        Toml::write(&dir.join(POINT_FILE), &point)?;
        Ok(point)
    }

    /// Every readable restore point, newest first.
    pub fn list(&self) -> Result<Vec<RestorePoint>, SError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut points = Vec::new();
        for entry in self.root.read_dir_utf8()? {
            let entry = entry?;
            let file = entry.path().join(POINT_FILE);
            if !file.is_file() {
                continue;
            }
            match Toml::read::<RestorePoint>(&file) {
                Ok(point) => points.push(point),
                Err(e) => warn!(file = %file, error = %e, "unreadable restore point skipped"),
            }
        }
        // ids are nanosecond timestamps of equal width
        points.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(points)
    }

    pub fn load(&self, id: &str) -> Result<RestorePoint, SError> {
        let file = self.dir(id).join(POINT_FILE);
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) || !file.is_file() {
            return Err(SError::RestorePointNotFound(id.to_string()));
        }
        Toml::read(&file)
    }

    /// Writes one snapshot entry back into the target tree.
    pub fn put_back(&self, point: &RestorePoint, entry: &SnapshotEntry) -> Result<(), SError> {
        let target = &entry.target;
        match &entry.stored {
            Some(rel) => {
                let source = self.dir(&point.id).join(rel);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| SError::io_failure(parent, "create dir", e))?;
                }
                let tmp = target.with_file_name(format!("{}.modrollback", target.file_name().unwrap_or_default()));
                fs::copy(&source, &tmp).map_err(|e| SError::io_failure(&tmp, "rollback", e))?;
                if let Err(e) = fs::rename(&tmp, target) {
                    let _ = fs::remove_file(&tmp);
                    return Err(SError::io_failure(target, "rollback", e));
                }
            }
            None => match fs::remove_file(target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(SError::io_failure(target, "rollback", e)),
            },
        }
        info!(target: AUDIT_TARGET, point = %point.id, destination = %target, present = entry.stored.is_some(), "rollback");
        Ok(())
    }

    fn prune(&self) -> Result<(), SError> {
        for old in self.list()?.into_iter().skip(self.keep) {
            let dir = self.dir(&old.id);
            fs::remove_dir_all(&dir).map_err(|e| SError::io_failure(&dir, "prune restore point", e))?;
            info!(id = %old.id, "restore point pruned");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(tmp: &tempfile::TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap()
    }

    #[test]
    fn snapshot_and_put_back() {
        let tmp = tempfile::tempdir().unwrap();
        let root = utf8(&tmp);
        let store = RestorePointStore::new(&root.join("points"), 3);
        let present = root.join("game/a.bundle");
        let absent = root.join("game/b.bundle");
        fs::create_dir_all(present.parent().unwrap()).unwrap();
        fs::write(&present, "before").unwrap();

        let point = store
            .create(
                "load order",
                vec!["A".into()],
                vec![(present.clone(), Some("A".into())), (absent.clone(), None)],
            )
            .unwrap();

        fs::write(&present, "after").unwrap();
        fs::write(&absent, "introduced").unwrap();

        let loaded = store.load(&point.id).unwrap();
        for entry in &loaded.entries {
            store.put_back(&loaded, entry).unwrap();
        }
        assert_eq!(fs::read_to_string(&present).unwrap(), "before");
        assert!(!absent.exists());
        assert_eq!(loaded.entries[0].writer.as_deref(), Some("A"));
    }

    #[test]
    fn only_the_newest_are_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RestorePointStore::new(&utf8(&tmp), 2);
        let ids: Vec<_> = (0..3)
            .map(|_| store.create("load order", vec![], vec![]).unwrap().id)
            .collect();

        let listed: Vec<_> = store.list().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(listed, vec![ids[2].clone(), ids[1].clone()]);
        assert!(matches!(store.load(&ids[0]), Err(SError::RestorePointNotFound(_))));
    }
}

use crate::models::error::SError;
use crate::models::record::{BackupOrigin, BackupRecord};
use crate::utils::file::FileUtils;
use crate::utils::logging::AUDIT_TARGET;
use crate::utils::time::get_unix_timestamp;
use crate::utils::toml::Toml;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::{info, instrument, warn};

#[derive(Serialize, Deserialize, Default)]
struct Ledger {
    #[serde(default)]
    backups: Vec<BackupRecord>,
}

/// Keeps one pristine copy of every path any mod has touched.
///
/// The bytes live in a `<file>.modbak` sidecar next to the original; the ledger in
/// `backups.toml` is what makes a sidecar authoritative. A record is created by the first
/// mod to touch a path and consumed when the path is restored.
pub struct BackupManager {
    ledger_path: Utf8PathBuf,
    records: BTreeMap<Utf8PathBuf, BackupRecord>,
}

impl BackupManager {
    pub fn load(ledger_path: &Utf8Path) -> Result<Self, SError> {
        let ledger: Ledger = Toml::read_or_default(ledger_path)?;
        Ok(Self {
            ledger_path: ledger_path.to_owned(),
            records: ledger
                .backups
                .into_iter()
                .map(|r| (r.target.clone(), r))
                .collect(),
        })
    }

    pub fn has_backup(&self, target: &Utf8Path) -> bool {
        self.records.contains_key(target)
    }

    pub fn get(&self, target: &Utf8Path) -> Option<&BackupRecord> {
        self.records.get(target)
    }

    pub fn records(&self) -> impl Iterator<Item = &BackupRecord> {
        self.records.values()
    }

    /// Records the current state of `target` unless a record already exists.
    /// Returns `true` when this call created the record.
    #[instrument(skip(self), level = "debug")]
    pub fn preserve(&mut self, target: &Utf8Path, owner: &str) -> Result<bool, SError> {
        if self.records.contains_key(target) {
            return Ok(false);
        }

        let record = match target.symlink_metadata() {
            Ok(meta) if meta.is_dir() => {
                return Err(SError::io_failure(target, "backup", "target is a directory"));
            }
            Ok(_) => {
                let sidecar = BackupRecord::sidecar_for(target);
                let tmp = sidecar.with_extension(format!("{}.tmp", BackupRecord::SIDECAR_SUFFIX));
                fs::copy(target, &tmp).map_err(|e| SError::io_failure(&tmp, "backup", e))?;
                fs::rename(&tmp, &sidecar).map_err(|e| SError::io_failure(&sidecar, "backup", e))?;

                BackupRecord {
                    target: target.to_owned(),
                    owner: owner.to_string(),
                    origin: BackupOrigin::File,
                    digest: Some(FileUtils::hash_file(&sidecar)?),
                    created_at: get_unix_timestamp(),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BackupRecord {
                target: target.to_owned(),
                owner: owner.to_string(),
                origin: BackupOrigin::Absent,
                digest: None,
                created_at: get_unix_timestamp(),
            },
            Err(e) => return Err(SError::io_failure(target, "backup", e)),
        };

        info!(target: AUDIT_TARGET, path = %target, owner, origin = ?record.origin, "backup created");
        self.records.insert(target.to_owned(), record);
        self.persist()?;
        Ok(true)
    }

    /// Puts the pristine state back and forgets the record. Returns `false` when there was
    /// no record to restore. On failure the sidecar and record stay untouched.
    #[instrument(skip(self), level = "debug")]
    pub fn restore(&mut self, target: &Utf8Path) -> Result<bool, SError> {
        let Some(record) = self.records.get(target) else {
            return Ok(false);
        };
        let sidecar = record.sidecar();
        let failure = |reason: String| SError::BackupRestoreFailure {
            path: target.to_owned(),
            backup: sidecar.clone(),
            reason,
        };

        match record.origin {
            BackupOrigin::File => {
                let digest = FileUtils::hash_file(&sidecar).map_err(|e| failure(e.to_string()))?;
                if record.digest.as_deref() != Some(digest.as_str()) {
                    return Err(failure("backup digest mismatch".into()));
                }

                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| failure(e.to_string()))?;
                }
                let tmp = target.with_file_name(format!(
                    "{}.modrestore",
                    target.file_name().unwrap_or_default()
                ));
                fs::copy(&sidecar, &tmp).map_err(|e| failure(e.to_string()))?;
                if let Err(e) = fs::rename(&tmp, target) {
                    let _ = fs::remove_file(&tmp);
                    return Err(failure(e.to_string()));
                }
                if let Err(e) = fs::remove_file(&sidecar) {
                    warn!(backup = %sidecar, error = %e, "restored but sidecar could not be removed");
                }
            }
            BackupOrigin::Absent => match fs::remove_file(target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(failure(e.to_string())),
            },
        }

        info!(target: AUDIT_TARGET, path = %target, origin = ?record.origin, "backup restored");
        self.records.remove(target);
        self.persist()?;
        Ok(true)
    }

    /// Hands the record for `target` to another mod.
    pub fn transfer(&mut self, target: &Utf8Path, new_owner: &str) -> Result<(), SError> {
        let Some(record) = self.records.get_mut(target) else {
            return Ok(());
        };
        if record.owner == new_owner {
            return Ok(());
        }
        record.owner = new_owner.to_string();
        self.persist()
    }

    pub fn owned_by(&self, owner: &str) -> Vec<Utf8PathBuf> {
        self.records
            .values()
            .filter(|r| r.owner == owner)
            .map(|r| r.target.clone())
            .collect()
    }

    fn persist(&self) -> Result<(), SError> {
        let ledger = Ledger {
            backups: self.records.values().cloned().collect(),
        };
        Toml::write(&self.ledger_path, &ledger)
    }
}

use crate::core::mod_backup::BackupManager;
use crate::core::security::SecurityPolicy;
use crate::core::target::{PlannedEntry, TargetTree};
use crate::models::error::SError;
use crate::models::manifest::Operation;
use crate::utils::logging::AUDIT_TARGET;
use derive_more::Display;
use serde::Serialize;
use std::fs;
use tracing::info;

#[derive(Serialize, Clone, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    #[display("copied")]
    Copied,
    #[display("deleted")]
    Deleted,
    #[display("already absent")]
    AlreadyAbsent,
    #[display("skipped, other platform")]
    SkippedPlatform,
    #[display("shadowed by a later mod")]
    Shadowed,
    #[display("original restored")]
    Restored,
    #[display("left in place, no backup")]
    NoBackup,
    #[display("rolled back")]
    RolledBack,
    #[display("reapplied from '{_0}'")]
    Reapplied(String),
    #[display("left to '{_0}'")]
    Retained(String),
    #[display("blocked: {_0}")]
    Blocked(String),
}

impl EntryOutcome {
    /// Whether the entry left this mod's content (or its deletion) on disk.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Copied | Self::Deleted | Self::AlreadyAbsent)
    }
}

/// Applies single resolved entries to the target tree.
pub struct FileOperationExecutor<'a> {
    pub tree: &'a TargetTree,
    pub policy: &'a SecurityPolicy,
    pub backups: &'a mut BackupManager,
}

impl FileOperationExecutor<'_> {
    pub fn execute(&mut self, owner: &str, entry: &PlannedEntry) -> Result<EntryOutcome, SError> {
        if !entry.entry.platform.includes(self.tree.host) {
            return Ok(EntryOutcome::SkippedPlatform);
        }
        match entry.operation() {
            Operation::Copy => self.copy(owner, entry),
            Operation::Delete => self.delete(owner, entry),
        }
    }

    fn copy(&mut self, owner: &str, entry: &PlannedEntry) -> Result<EntryOutcome, SError> {
        let target = &entry.target;
        let source = entry
            .source
            .as_deref()
            .ok_or_else(|| SError::io_failure(target, "copy", "entry has no source"))?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| SError::io_failure(parent, "create dir", e))?;
        }
        if entry.entry.backup {
            self.backups.preserve(target, owner)?;
        }

        let result = fs::copy(source, target);
        info!(
            target: AUDIT_TARGET,
            owner,
            operation = "copy",
            source = %source,
            destination = %target,
            ok = result.is_ok(),
            "copy"
        );
        result.map_err(|e| SError::io_failure(target, "copy", e))?;
        Ok(EntryOutcome::Copied)
    }

    fn delete(&mut self, owner: &str, entry: &PlannedEntry) -> Result<EntryOutcome, SError> {
        let target = &entry.target;
        self.policy.authorize_delete(target, &self.tree.roots())?;
        // deletes are always undoable, whatever the entry's backup flag says
        self.backups.preserve(target, owner)?;

        let outcome = match fs::remove_file(target) {
            Ok(()) => EntryOutcome::Deleted,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EntryOutcome::AlreadyAbsent,
            Err(e) => {
                info!(target: AUDIT_TARGET, owner, operation = "delete", destination = %target, ok = false, "delete");
                return Err(SError::io_failure(target, "delete", e));
            }
        };
        info!(
            target: AUDIT_TARGET,
            owner,
            operation = "delete",
            destination = %target,
            outcome = %outcome,
            "delete"
        );
        Ok(outcome)
    }
}

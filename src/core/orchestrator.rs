//! Sequencing of import, enable, disable and load-order changes over one [`Workspace`].
//!
//! An enable walks `Idle → Validating → ConflictCheck → Authorizing → Executing → Committed`;
//! any error moves it to `Failed` without marking the mod enabled. Files already written
//! by a failed enable stay on disk, recorded as installed, until the mod is disabled, which
//! also walks the paths the manifest would have touched.

use crate::core::conflict::{ConflictDetector, TouchIndex};
use crate::core::executor::{EntryOutcome, FileOperationExecutor};
use crate::core::mod_stager::{ModStager, StagedMod};
use crate::core::restore_point::RestorePoint;
use crate::core::target::ModPlan;
use crate::core::workspace::Workspace;
use crate::models::conflict::{ConflictReport, Contributor};
use crate::models::error::{ErrorList, SError};
use crate::models::manifest::{HostPlatform, Operation};
use crate::models::paths::AppExecutables;
use crate::models::record::ModRecord;
use crate::models::task_status::TaskStatus;
use crate::utils::context::TaskContext;
use crate::utils::file::FileUtils;
use crate::utils::process::ProcessChecker;
use camino::{Utf8Path, Utf8PathBuf};
use derive_more::Display;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use sysinfo::System;
use tracing::{debug, info, instrument, warn};

const LOAD_ORDER: &str = "load order";
const ROLLBACK: &str = "rollback";

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Default, Display)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    #[default]
    Idle,
    Validating,
    ConflictCheck,
    Authorizing,
    Executing,
    Committed,
    Failed,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct EntryReport {
    pub target: Utf8PathBuf,
    pub outcome: EntryOutcome,
}

/// What an operation did to each target path.
#[derive(Serialize, Clone, Debug, Default)]
pub struct ApplyReport {
    pub name: String,
    pub conflicts: ConflictReport,
    pub entries: Vec<EntryReport>,
    /// Restore point taken before the operation wrote anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_point: Option<String>,
}

impl ApplyReport {
    fn new(name: &str, conflicts: ConflictReport) -> Self {
        Self {
            name: name.to_string(),
            conflicts,
            entries: Vec::new(),
            restore_point: None,
        }
    }

    fn push(&mut self, name: &str, target: &Utf8Path, outcome: EntryOutcome) {
        TaskContext::notify(TaskStatus::Entry {
            name: name.to_string(),
            target: target.to_owned(),
            outcome: outcome.to_string(),
        });
        self.entries.push(EntryReport {
            target: target.to_owned(),
            outcome,
        });
    }

    pub fn outcomes_for<'a>(&'a self, target: &'a Utf8Path) -> impl Iterator<Item = &'a EntryOutcome> {
        self.entries
            .iter()
            .filter(move |e| e.target == target)
            .map(|e| &e.outcome)
    }

    pub fn blocked(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Blocked(_)))
    }
}

pub struct ApplyOrchestrator<'a> {
    ws: &'a mut Workspace,
    state: ApplyState,
}

impl<'a> ApplyOrchestrator<'a> {
    pub fn new(ws: &'a mut Workspace) -> Self {
        Self {
            ws,
            state: ApplyState::Idle,
        }
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    pub fn records(&self) -> Vec<ModRecord> {
        self.ws.registry.records().to_vec()
    }

    fn transition(&mut self, name: &str, state: ApplyState) {
        debug!(name, from = %self.state, to = %state, "apply state");
        self.state = state;
        TaskContext::notify(TaskStatus::State {
            name: name.to_string(),
            state,
        });
    }

    fn finish<T>(&mut self, name: &str, result: Result<T, SError>) -> Result<T, SError> {
        match result {
            Ok(v) => {
                self.transition(name, ApplyState::Committed);
                Ok(v)
            }
            Err(e) => {
                warn!(name, error = %e, "operation failed");
                // keep whatever progress was recorded so a later disable can undo it
                self.sync_backup_owners();
                if let Err(persist) = self.ws.persist() {
                    warn!(error = %persist, "registry not saved");
                }
                self.transition(name, ApplyState::Failed);
                Err(e)
            }
        }
    }

    fn guard(&self) -> Result<(), SError> {
        if !self.ws.settings.guard_running_process {
            return Ok(());
        }
        let executables: Vec<Utf8PathBuf> = AppExecutables::new(&self.ws.tree.game_root)
            .all()
            .into_iter()
            .cloned()
            .collect();
        let mut sys = System::new();
        match ProcessChecker::find_running(&mut sys, &executables) {
            Some(exe) => Err(SError::ApplicationRunning(ProcessChecker::display_name(&exe))),
            None => Ok(()),
        }
    }

    fn host(&self) -> HostPlatform {
        self.ws.tree.host
    }

    /// Stores a mod folder or archive in the workspace. A disabled mod with the same name
    /// is replaced in place, keeping its load-order position.
    #[instrument(skip(self))]
    pub fn import(&mut self, input: &Utf8Path) -> Result<ModRecord, SError> {
        let stager = ModStager {
            validator: &self.ws.validator,
            extractor: &self.ws.extractor,
            staging_root: &self.ws.paths.staging,
        };
        let staged = stager.stage(input)?;
        let result = self.adopt(&staged);
        if let Err(e) = staged.clean_up() {
            warn!(error = %e, "staging left behind");
        }
        result
    }

    fn adopt(&mut self, staged: &StagedMod) -> Result<ModRecord, SError> {
        let manifest = &staged.manifest;
        let name = manifest.name.as_str();
        let dest = self.ws.payload_dir(name);

        if let Ok(existing) = self.ws.registry.get(name) {
            if existing.enabled {
                return Err(SError::ModEnabled(name.to_string()));
            }
            log_version_change(name, &existing.version, &manifest.version);
        }
        if staged.payload.starts_with(&dest) {
            return Err(SError::io_failure(&staged.payload, "import", "source is the stored payload itself"));
        }

        if dest.exists() {
            std::fs::remove_dir_all(&dest).map_err(|e| SError::io_failure(&dest, "replace payload", e))?;
        }
        FileUtils::copy_recursive(&staged.payload, &dest)?;

        if self.ws.registry.contains(name) {
            self.ws.registry.get_mut(name)?.version = manifest.version.clone();
        } else {
            self.ws.registry.insert(name, &manifest.version)?;
        }
        self.ws.persist()?;

        info!(revision = %manifest.revision(), "mod imported");
        TaskContext::notify(TaskStatus::Message {
            text: format!("imported {}", manifest.revision()),
        });
        self.ws.registry.get(name).cloned()
    }

    /// Applies a mod on top of the enabled set. `confirm` sees the conflicts the mod takes part
    /// in and decides whether to go on; it is not called when there are none.
    #[instrument(skip(self, confirm))]
    pub fn enable<F>(&mut self, name: &str, confirm: F) -> Result<ApplyReport, SError>
    where
        F: FnOnce(&ConflictReport) -> bool,
    {
        let result = self.run_enable(name, confirm);
        self.finish(name, result)
    }

    fn run_enable<F>(&mut self, name: &str, confirm: F) -> Result<ApplyReport, SError>
    where
        F: FnOnce(&ConflictReport) -> bool,
    {
        self.guard()?;
        let order = self.ws.registry.get(name)?.order;
        let host = self.host();

        self.transition(name, ApplyState::Validating);
        let manifest = self.ws.load_manifest(name)?;
        let payload = self.ws.payload_dir(name);
        self.ws.validator.verify_payload(&manifest, &payload)?;
        let plan = self.ws.tree.plan(&manifest, &payload, order)?;

        self.transition(name, ApplyState::ConflictCheck);
        let others = self.ws.enabled_plans(Some(name))?;
        let conflicts = ConflictDetector::detect(others.iter().chain([&plan]), host).involving(name);
        if !conflicts.is_empty() {
            info!(name, paths = conflicts.len(), "conflicts found");
            if !confirm(&conflicts) {
                return Err(SError::ConflictWarning(conflicts));
            }
        }

        self.transition(name, ApplyState::Authorizing);
        let mut report = ApplyReport::new(name, conflicts);
        let blocked = self.authorize(&plan, &mut report)?;

        self.transition(name, ApplyState::Executing);
        let index = ConflictDetector::index(others.iter().chain([&plan]), host);
        let mut executor = FileOperationExecutor {
            tree: &self.ws.tree,
            policy: &self.ws.policy,
            backups: &mut self.ws.backups,
        };

        for entry in &plan.entries {
            if blocked.contains(&entry.index) {
                continue;
            }
            let outcome = if !entry.entry.platform.includes(host) {
                EntryOutcome::SkippedPlatform
            } else if winner(&index, &entry.target).is_some_and(|w| w.name != name) {
                EntryOutcome::Shadowed
            } else {
                executor.execute(name, entry)?
            };

            // recorded as it happens, so a failure later on still leaves a complete trail
            if outcome.is_write() {
                self.ws.registry.set_writer(&entry.target, Some(name));
            }
            let record = self.ws.registry.get_mut(name)?;
            if outcome != EntryOutcome::SkippedPlatform && !record.touches(&entry.target) {
                record.installed.push(entry.target.clone());
            }
            report.push(name, &entry.target, outcome);
        }

        self.ws.registry.get_mut(name)?.enabled = true;
        self.sync_backup_owners();
        self.ws.persist()?;
        info!(name, entries = report.entries.len(), "mod enabled");
        Ok(report)
    }

    /// Checks every delete of `plan`. Refused deletes are reported and skipped, or fail the
    /// whole operation when the workspace escalates violations.
    fn authorize(&self, plan: &ModPlan, report: &mut ApplyReport) -> Result<BTreeSet<usize>, SError> {
        let roots = self.ws.tree.roots();
        let mut blocked = BTreeSet::new();

        for entry in plan
            .active_entries(self.host())
            .filter(|e| e.operation() == Operation::Delete)
        {
            if let Err(e) = self.ws.policy.authorize_delete(&entry.target, &roots) {
                if self.ws.settings.escalate_security_violations {
                    return Err(e);
                }
                let rule = match &e {
                    SError::SecurityViolation { rule, .. } => rule.clone(),
                    other => other.to_string(),
                };
                report.push(&plan.name, &entry.target, EntryOutcome::Blocked(rule));
                blocked.insert(entry.index);
            }
        }
        Ok(blocked)
    }

    /// Reverts a mod. Paths still written by another enabled mod go back to that mod's
    /// content; paths nobody else touches get their original back.
    #[instrument(skip(self))]
    pub fn disable(&mut self, name: &str) -> Result<ApplyReport, SError> {
        let result = self.run_disable(name);
        self.finish(name, result)
    }

    fn run_disable(&mut self, name: &str) -> Result<ApplyReport, SError> {
        self.guard()?;
        let mut record = self.ws.registry.get(name)?.clone();
        let host = self.host();

        self.transition(name, ApplyState::Validating);
        let mut paths = record.installed.clone();
        if !record.enabled {
            // an enable interrupted before its first record was saved
            match self.ws.plan(&record) {
                Ok(plan) => {
                    for target in plan.targets(host) {
                        if !paths.contains(&target) {
                            paths.push(target);
                        }
                    }
                }
                Err(e) => warn!(name, error = %e, "manifest unusable, reverting recorded paths only"),
            }
        }

        let others = self.ws.enabled_plans(Some(name))?;
        let index = ConflictDetector::index(&others, host);

        self.transition(name, ApplyState::Executing);
        let mut report = ApplyReport::new(name, ConflictReport::default());
        let mut failures = Vec::new();
        let mut executor = FileOperationExecutor {
            tree: &self.ws.tree,
            policy: &self.ws.policy,
            backups: &mut self.ws.backups,
        };

        for path in paths.iter().rev() {
            let result = match winner(&index, path) {
                None => executor.backups.restore(path).map(|restored| {
                    if restored {
                        EntryOutcome::Restored
                    } else {
                        EntryOutcome::NoBackup
                    }
                }),
                Some(top) => hand_over(&mut executor, &others, &record, top, path, host),
            };
            match result {
                Ok(outcome) => {
                    match &outcome {
                        EntryOutcome::Reapplied(top) => self.ws.registry.set_writer(path, Some(top.as_str())),
                        EntryOutcome::Restored | EntryOutcome::NoBackup => {
                            self.ws.registry.set_writer(path, None)
                        }
                        _ => {}
                    }
                    record.forget(path);
                    report.push(name, path, outcome);
                }
                Err(e) => {
                    warn!(name, path = %path, error = %e, "path not reverted");
                    failures.push(e);
                }
            }
        }

        record.enabled = false;
        self.commit(record)?;

        if failures.is_empty() {
            info!(name, "mod disabled");
            Ok(report)
        } else {
            Err(SError::RestoreIncomplete {
                name: name.to_string(),
                failures: ErrorList(failures),
            })
        }
    }

    /// Moves `name` to `position` in the load order. Files on disk are not touched; run
    /// [`reapply`](Self::reapply) to bring them in line with the new order.
    pub fn reorder(&mut self, name: &str, position: usize) -> Result<(), SError> {
        self.ws.registry.reorder(name, position)?;
        self.ws.persist()?;
        info!(name, position, "load order changed");
        Ok(())
    }

    /// Replaces the whole load order. Like [`reorder`](Self::reorder), nothing is rewritten.
    pub fn set_order(&mut self, names: &[String]) -> Result<(), SError> {
        self.ws.registry.set_order(names)?;
        self.ws.persist()?;
        info!(?names, "load order replaced");
        Ok(())
    }

    /// Writes the winning content of every enabled path, walking mods in load order.
    /// A restore point of those paths is taken first.
    #[instrument(skip(self))]
    pub fn reapply(&mut self) -> Result<ApplyReport, SError> {
        let result = self.run_reapply();
        self.finish(LOAD_ORDER, result)
    }

    fn run_reapply(&mut self) -> Result<ApplyReport, SError> {
        self.guard()?;
        let host = self.host();

        self.transition(LOAD_ORDER, ApplyState::Validating);
        let plans = self.ws.enabled_plans(None)?;

        self.transition(LOAD_ORDER, ApplyState::ConflictCheck);
        let index = ConflictDetector::index(&plans, host);
        let mut report = ApplyReport::new(LOAD_ORDER, ConflictDetector::detect(&plans, host));

        self.transition(LOAD_ORDER, ApplyState::Authorizing);
        let mut blocked = Vec::with_capacity(plans.len());
        for plan in &plans {
            blocked.push(self.authorize(plan, &mut report)?);
        }

        if self.ws.restore_points.enabled() && !index.is_empty() {
            let point = self.snapshot(&plans, &index)?;
            report.restore_point = Some(point.id);
        }

        self.transition(LOAD_ORDER, ApplyState::Executing);
        let mut executor = FileOperationExecutor {
            tree: &self.ws.tree,
            policy: &self.ws.policy,
            backups: &mut self.ws.backups,
        };
        for (plan, blocked) in plans.iter().zip(&blocked) {
            for entry in plan.active_entries(host) {
                if blocked.contains(&entry.index)
                    || winner(&index, &entry.target).is_some_and(|w| w.name != plan.name)
                {
                    continue;
                }
                let outcome = executor.execute(&plan.name, entry)?;
                if outcome.is_write() {
                    self.ws.registry.set_writer(&entry.target, Some(plan.name.as_str()));
                }
                report.push(&plan.name, &entry.target, outcome);
            }
        }

        self.sync_backup_owners();
        self.ws.persist()?;
        Ok(report)
    }

    fn snapshot(&self, plans: &[ModPlan], index: &TouchIndex) -> Result<RestorePoint, SError> {
        let enabled = plans.iter().map(|p| p.name.clone()).collect();
        let targets = index
            .keys()
            .map(|path| (path.clone(), self.ws.registry.writer_of(path).map(str::to_string)))
            .collect();
        let point = self.ws.restore_points.create(LOAD_ORDER, enabled, targets)?;
        TaskContext::notify(TaskStatus::Message {
            text: format!("restore point {} created", point.id),
        });
        Ok(point)
    }

    /// Restore points, newest first.
    pub fn restore_points(&self) -> Result<Vec<RestorePoint>, SError> {
        self.ws.restore_points.list()
    }

    /// Puts every path of a restore point back as it was. The enabled set must still match
    /// the one the point was taken with.
    #[instrument(skip(self))]
    pub fn rollback(&mut self, id: &str) -> Result<ApplyReport, SError> {
        let result = self.run_rollback(id);
        self.finish(ROLLBACK, result)
    }

    fn run_rollback(&mut self, id: &str) -> Result<ApplyReport, SError> {
        self.guard()?;

        self.transition(ROLLBACK, ApplyState::Validating);
        let point = self.ws.restore_points.load(id)?;
        let enabled: BTreeSet<&str> = self.ws.registry.enabled().map(|r| r.name.as_str()).collect();
        let recorded: BTreeSet<&str> = point.enabled.iter().map(String::as_str).collect();
        if enabled != recorded {
            return Err(SError::RestorePointStale(id.to_string()));
        }

        self.transition(ROLLBACK, ApplyState::Executing);
        let mut report = ApplyReport::new(ROLLBACK, ConflictReport::default());
        report.restore_point = Some(point.id.clone());
        for entry in &point.entries {
            self.ws.restore_points.put_back(&point, entry)?;
            self.ws.registry.set_writer(&entry.target, entry.writer.as_deref());
            report.push(ROLLBACK, &entry.target, EntryOutcome::RolledBack);
        }

        self.ws.persist()?;
        info!(id, paths = report.entries.len(), "rolled back");
        Ok(report)
    }

    /// Disables the mod if anything of it may be on disk, then deletes its payload and record.
    #[instrument(skip(self))]
    pub fn remove(&mut self, name: &str) -> Result<(), SError> {
        let record = self.ws.registry.get(name)?;
        let leftovers = record.enabled
            || !record.installed.is_empty()
            || !record.written.is_empty()
            || !self.ws.backups.owned_by(name).is_empty();
        if leftovers {
            self.disable(name)?;
        }

        let dir = self.ws.payload_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| SError::io_failure(&dir, "remove payload", e))?;
        }
        self.ws.registry.remove(name)?;
        self.sync_backup_owners();
        self.ws.persist()?;

        info!(name, "mod removed");
        TaskContext::notify(TaskStatus::Message {
            text: format!("removed {name}"),
        });
        Ok(())
    }

    /// Conflicts `name` would take part in if enabled now, or every conflict among the
    /// enabled mods when no name is given.
    pub fn preview_conflicts(&self, name: Option<&str>) -> Result<ConflictReport, SError> {
        let host = self.host();
        match name {
            Some(name) => {
                let plan = self.ws.plan(self.ws.registry.get(name)?)?;
                let others = self.ws.enabled_plans(Some(name))?;
                Ok(ConflictDetector::detect(others.iter().chain([&plan]), host).involving(name))
            }
            None => Ok(ConflictDetector::detect(&self.ws.enabled_plans(None)?, host)),
        }
    }

    fn commit(&mut self, record: ModRecord) -> Result<(), SError> {
        let name = record.name.clone();
        *self.ws.registry.get_mut(&name)? = record;
        self.sync_backup_owners();
        self.ws.persist()
    }

    fn sync_backup_owners(&mut self) {
        for record in self.ws.registry.records_mut() {
            record.backups = self.ws.backups.owned_by(&record.name).into_iter().collect();
        }
    }
}

fn winner<'i>(index: &'i TouchIndex, path: &Utf8Path) -> Option<&'i Contributor> {
    index.get(path).and_then(|c| c.last())
}

/// Leaves `path` to `top`, the highest remaining contributor. When the leaving mod's content
/// is the one on disk, `top`'s own entries are written again.
fn hand_over(
    executor: &mut FileOperationExecutor<'_>,
    others: &[ModPlan],
    leaving: &ModRecord,
    top: &Contributor,
    path: &Utf8Path,
    host: HostPlatform,
) -> Result<EntryOutcome, SError> {
    let outcome = if leaving.wrote(path) {
        let plan = others
            .iter()
            .find(|p| p.name == top.name)
            .ok_or_else(|| SError::ModNotFound(top.name.clone()))?;
        for entry in plan.entries_for(path, host) {
            executor.execute(&top.name, entry)?;
        }
        EntryOutcome::Reapplied(top.name.clone())
    } else {
        EntryOutcome::Retained(top.name.clone())
    };

    if executor
        .backups
        .get(path)
        .is_some_and(|b| b.owner == leaving.name)
    {
        executor.backups.transfer(path, &top.name)?;
    }
    Ok(outcome)
}

fn log_version_change(name: &str, from: &str, to: &str) {
    let (Ok(old), Ok(new)) = (semver::Version::parse(from), semver::Version::parse(to)) else {
        return;
    };
    match new.cmp(&old) {
        Ordering::Greater => info!(name, %old, %new, "upgrading"),
        Ordering::Less => warn!(name, %old, %new, "downgrading"),
        Ordering::Equal => info!(name, version = %new, "reinstalling"),
    }
}

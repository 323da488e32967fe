use crate::config::AppSettings;
use crate::core::decompression::SafeArchiveExtractor;
use crate::core::mod_backup::BackupManager;
use crate::core::registry::ModRegistry;
use crate::core::restore_point::RestorePointStore;
use crate::core::security::SecurityPolicy;
use crate::core::target::{ModPlan, TargetTree};
use crate::core::validator::ManifestValidator;
use crate::models::error::SError;
use crate::models::manifest::ModManifest;
use crate::models::paths::{ModPaths, WorkspacePaths};
use crate::models::record::ModRecord;
use camino::Utf8PathBuf;
use tracing::info;

/// Everything one set of mods needs: payload storage, persisted state and the target tree.
pub struct Workspace {
    pub settings: AppSettings,
    pub paths: WorkspacePaths,
    pub tree: TargetTree,
    pub registry: ModRegistry,
    pub backups: BackupManager,
    pub restore_points: RestorePointStore,
    pub policy: SecurityPolicy,
    pub validator: ManifestValidator,
    pub extractor: SafeArchiveExtractor,
}

impl Workspace {
    pub fn open(settings: AppSettings) -> Result<Self, SError> {
        let paths = WorkspacePaths::new(&settings.workspace);
        for dir in [&paths.mods, &paths.staging, &paths.logs, &paths.restore_points] {
            std::fs::create_dir_all(dir).map_err(|e| SError::io_failure(dir, "create dir", e))?;
        }

        let tree = TargetTree::from_settings(&settings)?;
        let registry = ModRegistry::load(&paths.registry)?;
        let backups = BackupManager::load(&paths.backups)?;

        info!(
            workspace = %settings.workspace,
            mods = registry.records().len(),
            "workspace opened"
        );

        Ok(Self {
            restore_points: RestorePointStore::new(&paths.restore_points, settings.restore_points_kept),
            policy: SecurityPolicy::new()?,
            extractor: SafeArchiveExtractor::new(settings.limits.clone()),
            validator: ManifestValidator::new()?,
            settings,
            paths,
            tree,
            registry,
            backups,
        })
    }

    pub fn payload_dir(&self, name: &str) -> Utf8PathBuf {
        self.paths.mods.join(name)
    }

    /// Re-reads and re-validates the stored manifest of an imported mod.
    pub fn load_manifest(&self, name: &str) -> Result<ModManifest, SError> {
        let manifest = self
            .validator
            .read(&ModPaths::new(&self.payload_dir(name)).manifest)?;
        if manifest.name != name {
            return Err(SError::ParseError(format!(
                "stored manifest of '{name}' names '{}'",
                manifest.name
            )));
        }
        Ok(manifest)
    }

    pub fn plan(&self, record: &ModRecord) -> Result<ModPlan, SError> {
        let manifest = self.load_manifest(&record.name)?;
        self.tree
            .plan(&manifest, &self.payload_dir(&record.name), record.order)
    }

    /// Plans of every enabled mod except `skip`, in load order.
    pub fn enabled_plans(&self, skip: Option<&str>) -> Result<Vec<ModPlan>, SError> {
        self.registry
            .enabled()
            .filter(|r| Some(r.name.as_str()) != skip)
            .map(|r| self.plan(r))
            .collect()
    }

    pub fn persist(&self) -> Result<(), SError> {
        self.registry.persist(&self.paths.registry)
    }
}

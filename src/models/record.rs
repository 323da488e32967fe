use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persisted state of one imported mod.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModRecord {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub order: u32,
    /// Absolute target paths this mod has touched, in the order they were applied.
    #[serde(default)]
    pub installed: Vec<Utf8PathBuf>,
    /// Target paths whose backup this mod currently owns.
    #[serde(default)]
    pub backups: BTreeSet<Utf8PathBuf>,
    /// Target paths whose current content on disk was written by this mod.
    #[serde(default)]
    pub written: BTreeSet<Utf8PathBuf>,
}

impl ModRecord {
    pub fn new(name: &str, version: &str, order: u32) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            enabled: false,
            order,
            installed: Vec::new(),
            backups: BTreeSet::new(),
            written: BTreeSet::new(),
        }
    }

    pub fn touches(&self, path: &Utf8Path) -> bool {
        self.installed.iter().any(|p| p == path)
    }

    pub fn wrote(&self, path: &Utf8Path) -> bool {
        self.written.contains(path)
    }

    pub fn forget(&mut self, path: &Utf8Path) {
        self.installed.retain(|p| p != path);
        self.written.remove(path);
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackupOrigin {
    /// A file existed and its bytes live in the sidecar.
    File,
    /// Nothing existed before the first mod wrote here.
    Absent,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BackupRecord {
    pub target: Utf8PathBuf,
    pub owner: String,
    pub origin: BackupOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub created_at: u64,
}

impl BackupRecord {
    pub const SIDECAR_SUFFIX: &'static str = "modbak";

    pub fn sidecar(&self) -> Utf8PathBuf {
        Self::sidecar_for(&self.target)
    }

    /// `dir/file.bundle` -> `dir/file.bundle.modbak`
    pub fn sidecar_for(target: &Utf8Path) -> Utf8PathBuf {
        let name = target.file_name().unwrap_or_default();
        target.with_file_name(format!("{name}.{}", Self::SIDECAR_SUFFIX))
    }
}

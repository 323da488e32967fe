use camino::Utf8PathBuf;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of mod categories. The category picks the default target root.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "lowercase")]
pub enum ModType {
    #[display("ui")]
    Ui,
    #[display("bundle")]
    Bundle,
    #[display("graphics")]
    Graphics,
    #[display("tactics")]
    Tactics,
    #[display("database")]
    Database,
    #[display("camera")]
    Camera,
    #[display("bepinex")]
    Bepinex,
    #[display("skin")]
    Skin,
    #[display("audio")]
    Audio,
    #[display("misc")]
    Misc,
}

impl ModType {
    pub const ALL: [ModType; 10] = [
        ModType::Ui,
        ModType::Bundle,
        ModType::Graphics,
        ModType::Tactics,
        ModType::Database,
        ModType::Camera,
        ModType::Bepinex,
        ModType::Skin,
        ModType::Audio,
        ModType::Misc,
    ];

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(tag))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Display)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[display("windows")]
    Windows,
    #[display("mac")]
    Mac,
    #[default]
    #[display("all")]
    All,
}

impl Platform {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "windows" => Some(Platform::Windows),
            "mac" => Some(Platform::Mac),
            "all" => Some(Platform::All),
            _ => None,
        }
    }

    pub fn includes(self, host: HostPlatform) -> bool {
        match self {
            Platform::All => true,
            Platform::Windows => host == HostPlatform::Windows,
            Platform::Mac => host == HostPlatform::Mac,
        }
    }
}

/// The platform the engine runs on. Entries pinned to another platform are skipped.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum HostPlatform {
    #[display("windows")]
    Windows,
    #[display("mac")]
    Mac,
    #[display("other")]
    Other,
}

impl HostPlatform {
    pub fn detect() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else if cfg!(target_os = "macos") {
            HostPlatform::Mac
        } else {
            HostPlatform::Other
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Display)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    #[display("copy")]
    Copy,
    #[display("delete")]
    Delete,
}

impl Operation {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "copy" => Some(Operation::Copy),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Utf8PathBuf>,
    pub target_subpath: Utf8PathBuf,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default = "default_backup")]
    pub backup: bool,
}

fn default_backup() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ModManifest {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub mod_type: ModType,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub compatibility: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub load_after: Vec<String>,
    pub files: Vec<FileEntry>,
}

impl ModManifest {
    /// Entries in execution order: deletes first, then copies, manifest order inside each phase.
    pub fn phased_entries(&self) -> impl Iterator<Item = (usize, &FileEntry)> {
        let deletes = self
            .files
            .iter()
            .enumerate()
            .filter(|(_, e)| e.operation == Operation::Delete);
        let copies = self
            .files
            .iter()
            .enumerate()
            .filter(|(_, e)| e.operation == Operation::Copy);
        deletes.chain(copies)
    }

    pub fn revision(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

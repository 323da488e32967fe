//! Resolution of manifest `target_subpath`s into absolute paths inside the game install or
//! the per-user documents folder. Every path the engine touches is produced here, once.

use crate::config::AppSettings;
use crate::models::error::SError;
use crate::models::manifest::{FileEntry, HostPlatform, ModManifest, ModType, Operation};
use crate::utils::file::FileUtils;
use camino::{Utf8Path, Utf8PathBuf};
use directories::{BaseDirs, UserDirs};

const GAME_FOLDER: &str = "Football Manager 26";
const USER_FOLDER: &str = "Sports Interactive/Football Manager 26";

/// Folder names stripped when walking from the asset folder up to the install root.
const ASSET_LAYERS: [&str; 7] = [
    "standalonewindows64",
    "standaloneosx",
    "standaloneosxuniversal",
    "aa",
    "streamingassets",
    "fm_data",
    "data",
];

#[derive(Clone, Debug)]
pub struct TargetTree {
    pub game_root: Utf8PathBuf,
    pub asset_root: Utf8PathBuf,
    pub user_dir: Utf8PathBuf,
    pub host: HostPlatform,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedEntry {
    /// Position of the entry in the manifest's `files` list.
    pub index: usize,
    pub entry: FileEntry,
    pub source: Option<Utf8PathBuf>,
    pub target: Utf8PathBuf,
}

impl PlannedEntry {
    pub fn operation(&self) -> Operation {
        self.entry.operation
    }
}

/// A manifest with every entry resolved, in execution order.
#[derive(Clone, Debug)]
pub struct ModPlan {
    pub name: String,
    pub order: u32,
    pub entries: Vec<PlannedEntry>,
}

impl ModPlan {
    /// Entries that apply on `host`, execution order preserved.
    pub fn active_entries(&self, host: HostPlatform) -> impl Iterator<Item = &PlannedEntry> {
        self.entries
            .iter()
            .filter(move |e| e.entry.platform.includes(host))
    }

    pub fn entries_for<'a>(
        &'a self,
        target: &'a Utf8Path,
        host: HostPlatform,
    ) -> impl Iterator<Item = &'a PlannedEntry> {
        self.active_entries(host)
            .filter(move |e| e.target.as_path() == target)
    }

    /// Distinct targets touched on `host`, first-touch order.
    pub fn targets(&self, host: HostPlatform) -> Vec<Utf8PathBuf> {
        let mut out: Vec<Utf8PathBuf> = Vec::new();
        for e in self.active_entries(host) {
            if !out.contains(&e.target) {
                out.push(e.target.clone());
            }
        }
        out
    }
}

impl TargetTree {
    pub fn from_settings(settings: &AppSettings) -> Result<Self, SError> {
        let game_root = settings
            .game_root
            .as_deref()
            .ok_or_else(|| SError::TargetNotConfigured("game_root".into()))?;
        let user_dir = settings
            .user_dir
            .as_deref()
            .ok_or_else(|| SError::TargetNotConfigured("user_dir".into()))?;
        let asset_root = settings.asset_root.as_deref().unwrap_or(game_root);

        Ok(Self {
            game_root: Self::absolute(game_root)?,
            asset_root: Self::absolute(asset_root)?,
            user_dir: Self::absolute(user_dir)?,
            host: HostPlatform::detect(),
        })
    }

    pub fn with_host(mut self, host: HostPlatform) -> Self {
        self.host = host;
        self
    }

    fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, SError> {
        if path.exists() {
            let canonical = dunce::canonicalize(path)?;
            return Utf8PathBuf::from_path_buf(canonical)
                .map_err(|p| SError::ParseError(format!("Invalid UTF-8 path: {:?}", p)));
        }
        if path.is_absolute() {
            return Ok(path.to_owned());
        }
        let cwd = std::env::current_dir()?;
        Utf8PathBuf::from_path_buf(cwd)
            .map(|c| c.join(path))
            .map_err(|p| SError::ParseError(format!("Invalid UTF-8 path: {:?}", p)))
    }

    /// Default destination for a mod type when the subpath carries no routing prefix.
    pub fn type_root(&self, mod_type: ModType, mod_name: &str) -> Utf8PathBuf {
        match mod_type {
            ModType::Ui | ModType::Bundle => self.asset_root.clone(),
            ModType::Tactics => self.user_dir.join("tactics"),
            ModType::Database => self.user_dir.join("editor data"),
            ModType::Camera | ModType::Bepinex => self.game_root.clone(),
            ModType::Graphics => {
                let graphics = self.user_dir.join("graphics");
                let name = mod_name.to_lowercase();
                if name.contains("kit") {
                    graphics.join("kits")
                } else if ["face", "portrait"].iter().any(|k| name.contains(k)) {
                    graphics.join("faces")
                } else if ["logo", "badge"].iter().any(|k| name.contains(k)) {
                    graphics.join("logos")
                } else {
                    graphics
                }
            }
            ModType::Skin | ModType::Audio | ModType::Misc => self.user_dir.clone(),
        }
    }

    /// Roots selected by the first path segment, regardless of mod type.
    fn prefix_root(&self, first: &str) -> Option<&Utf8Path> {
        match first.to_lowercase().as_str() {
            "bepinex" | "data" => Some(self.game_root.as_path()),
            "graphics" | "tactics" | "editor data" => Some(self.user_dir.as_path()),
            _ => None,
        }
    }

    pub fn resolve(&self, manifest: &ModManifest, subpath: &Utf8Path) -> Result<Utf8PathBuf, SError> {
        let rel = FileUtils::normalize_relative(subpath)
            .filter(|r| !r.as_str().is_empty())
            .ok_or_else(|| SError::SecurityViolation {
                path: subpath.to_owned(),
                rule: "target must be a relative path without '..'".into(),
            })?;

        let first = rel.components().next().map(|c| c.as_str()).unwrap_or_default();
        let root = match self.prefix_root(first) {
            Some(root) => root.to_owned(),
            None => self.type_root(manifest.mod_type, &manifest.name),
        };

        let resolved = root.join(&rel);
        if !resolved.starts_with(&root) {
            return Err(SError::SecurityViolation {
                path: resolved,
                rule: format!("escapes target root '{root}'"),
            });
        }
        Ok(resolved)
    }

    pub fn plan(
        &self,
        manifest: &ModManifest,
        payload_root: &Utf8Path,
        order: u32,
    ) -> Result<ModPlan, SError> {
        let entries = manifest
            .phased_entries()
            .map(|(index, entry)| {
                let target = self.resolve(manifest, &entry.target_subpath)?;
                let source = match (&entry.operation, &entry.source) {
                    (Operation::Copy, Some(src)) => {
                        let rel = FileUtils::normalize_relative(src).ok_or_else(|| {
                            SError::SecurityViolation {
                                path: src.clone(),
                                rule: "source escapes the mod payload".into(),
                            }
                        })?;
                        Some(payload_root.join(rel))
                    }
                    _ => None,
                };
                Ok(PlannedEntry {
                    index,
                    entry: entry.clone(),
                    source,
                    target,
                })
            })
            .collect::<Result<Vec<_>, SError>>()?;

        Ok(ModPlan {
            name: manifest.name.clone(),
            order,
            entries,
        })
    }

    /// Every root the engine may write under.
    pub fn roots(&self) -> [&Utf8Path; 3] {
        [
            self.game_root.as_path(),
            self.asset_root.as_path(),
            self.user_dir.as_path(),
        ]
    }
}

/// Walks up from `.../fm_Data/StreamingAssets/aa/StandaloneWindows64` to the install folder.
pub fn game_root_from_asset_root(asset_root: &Utf8Path) -> Utf8PathBuf {
    let mut current = asset_root;
    while let (Some(name), Some(parent)) = (current.file_name(), current.parent()) {
        if !ASSET_LAYERS.contains(&name.to_lowercase().as_str()) {
            break;
        }
        current = parent;
    }
    current.to_owned()
}

pub fn default_user_dir() -> Option<Utf8PathBuf> {
    let base = if cfg!(target_os = "macos") {
        BaseDirs::new().map(|d| d.data_dir().to_path_buf())
    } else {
        UserDirs::new().and_then(|d| d.document_dir().map(|p| p.to_path_buf()))
    }?;
    Utf8PathBuf::from_path_buf(base)
        .ok()
        .map(|b| b.join(USER_FOLDER))
}

/// Steam and Epic install locations, first existing wins.
pub fn asset_root_candidates() -> Vec<Utf8PathBuf> {
    let mut out = Vec::new();

    if cfg!(windows) {
        let x86 = std::env::var("PROGRAMFILES(X86)").unwrap_or_else(|_| "C:/Program Files (x86)".into());
        let pf = std::env::var("PROGRAMFILES").unwrap_or_else(|_| "C:/Program Files".into());
        let bases = [
            Utf8PathBuf::from(x86).join("Steam/steamapps/common").join(GAME_FOLDER),
            Utf8PathBuf::from(pf).join("Epic Games").join(GAME_FOLDER),
        ];
        for base in bases {
            for sub in [
                "fm_Data/StreamingAssets/aa/StandaloneWindows64",
                "data/StreamingAssets/aa/StandaloneWindows64",
            ] {
                out.push(base.join(sub));
            }
        }
    } else if let Some(support) = BaseDirs::new()
        .and_then(|d| Utf8PathBuf::from_path_buf(d.data_dir().to_path_buf()).ok())
    {
        let steam = support.join("Steam/steamapps/common").join(GAME_FOLDER);
        out.push(steam.join("fm.app/Contents/Resources/Data/StreamingAssets/aa/StandaloneOSX"));
        out.push(steam.join("fm_Data/StreamingAssets/aa/StandaloneOSXUniversal"));
        out.push(
            support
                .join("Epic")
                .join(GAME_FOLDER)
                .join("fm_Data/StreamingAssets/aa/StandaloneOSXUniversal"),
        );
    }

    out
}

pub fn detect_asset_root() -> Option<Utf8PathBuf> {
    asset_root_candidates().into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manifest::Platform;

    fn tree() -> TargetTree {
        TargetTree {
            game_root: Utf8PathBuf::from("/games/fm"),
            asset_root: Utf8PathBuf::from("/games/fm/fm_Data/StreamingAssets/aa/StandaloneWindows64"),
            user_dir: Utf8PathBuf::from("/home/u/fm"),
            host: HostPlatform::Windows,
        }
    }

    fn manifest(mod_type: ModType, name: &str) -> ModManifest {
        ModManifest {
            name: name.into(),
            version: "1.0.0".into(),
            mod_type,
            author: "t".into(),
            description: None,
            homepage: None,
            license: None,
            dependencies: vec![],
            conflicts: vec![],
            compatibility: Default::default(),
            load_after: vec![],
            files: vec![],
        }
    }

    #[test]
    fn prefixes_override_type_roots() {
        let t = tree();
        let m = manifest(ModType::Ui, "x");
        assert_eq!(
            t.resolve(&m, Utf8Path::new("data/db/1800/english.ltc")).unwrap(),
            "/games/fm/data/db/1800/english.ltc"
        );
        assert_eq!(
            t.resolve(&m, Utf8Path::new("tactics/442.fmf")).unwrap(),
            "/home/u/fm/tactics/442.fmf"
        );
        assert_eq!(
            t.resolve(&m, Utf8Path::new("ui-panel.bundle")).unwrap(),
            t.asset_root.join("ui-panel.bundle")
        );
    }

    #[test]
    fn graphics_subfolder_follows_mod_name() {
        let t = tree();
        let m = manifest(ModType::Graphics, "Retro Kits Pack");
        assert_eq!(
            t.resolve(&m, Utf8Path::new("club/home.png")).unwrap(),
            "/home/u/fm/graphics/kits/club/home.png"
        );
    }

    #[test]
    fn traversal_is_a_security_violation() {
        let t = tree();
        let m = manifest(ModType::Misc, "x");
        let err = t.resolve(&m, Utf8Path::new("../../etc/passwd")).unwrap_err();
        assert!(matches!(err, SError::SecurityViolation { .. }));
    }

    #[test]
    fn plan_runs_deletes_before_copies() {
        let t = tree();
        let mut m = manifest(ModType::Ui, "x");
        m.files = vec![
            FileEntry {
                source: Some("a.bundle".into()),
                target_subpath: "a.bundle".into(),
                platform: Platform::All,
                operation: Operation::Copy,
                backup: true,
            },
            FileEntry {
                source: None,
                target_subpath: "data/x.ltc".into(),
                platform: Platform::Mac,
                operation: Operation::Delete,
                backup: true,
            },
        ];
        let plan = t.plan(&m, Utf8Path::new("/payload"), 0).unwrap();
        assert_eq!(plan.entries[0].index, 1);
        assert_eq!(plan.entries[1].source.as_deref(), Some(Utf8Path::new("/payload/a.bundle")));
        // the mac-only delete is not active on windows
        assert_eq!(plan.targets(HostPlatform::Windows), vec![t.asset_root.join("a.bundle")]);
    }

    #[test]
    fn asset_layers_are_stripped() {
        let root = game_root_from_asset_root(Utf8Path::new(
            "/s/Football Manager 26/fm_Data/StreamingAssets/aa/StandaloneWindows64",
        ));
        assert_eq!(root, "/s/Football Manager 26");
    }
}

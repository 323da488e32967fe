pub mod limits;

use crate::config::limits::ExtractionLimits;
use crate::core::target;
use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "mod_deployer";

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppSettings {
    pub version: u8,
    /// Where payloads, staging, state files and logs live.
    pub workspace: Utf8PathBuf,
    /// Install folder of the game (holds `data/`, `BepInEx/`, the executable).
    pub game_root: Option<Utf8PathBuf>,
    /// Platform asset folder (`.../StreamingAssets/aa/StandaloneWindows64`); UI and bundle mods land here.
    pub asset_root: Option<Utf8PathBuf>,
    /// Per-user documents folder for tactics, graphics and editor data.
    pub user_dir: Option<Utf8PathBuf>,
    /// Turn skipped deletes into a failed apply instead of a warning.
    pub escalate_security_violations: bool,
    /// Refuse to touch files while the game is running.
    pub guard_running_process: bool,
    /// Snapshots kept under `restore_points/`; 0 turns them off.
    pub restore_points_kept: usize,
    pub limits: ExtractionLimits,
}

const DEFAULT_RESTORE_POINTS: usize = 5;

impl Default for AppSettings {
    fn default() -> Self {
        let base_dir = ProjectDirs::from("com", "martes", APP_NAME)
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
                    .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
            })
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        let asset_root = target::detect_asset_root();

        Self {
            version: 0,
            workspace: base_dir.join("workspace"),
            game_root: asset_root.as_deref().map(target::game_root_from_asset_root),
            asset_root,
            user_dir: target::default_user_dir(),
            escalate_security_violations: false,
            guard_running_process: true,
            restore_points_kept: DEFAULT_RESTORE_POINTS,
            limits: ExtractionLimits::default(),
        }
    }
}

impl AppSettings {
    pub fn load() -> Result<AppSettings, confy::ConfyError> {
        confy::load(APP_NAME, None)
    }

    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, None, self)
    }

    /// Settings rooted entirely under one directory; used by tests and portable installs.
    pub fn portable(root: &camino::Utf8Path) -> Self {
        Self {
            version: 0,
            workspace: root.join("workspace"),
            game_root: Some(root.join("game")),
            asset_root: Some(root.join("game/fm_Data/StreamingAssets/aa/StandaloneWindows64")),
            user_dir: Some(root.join("user")),
            escalate_security_violations: false,
            guard_running_process: false,
            restore_points_kept: DEFAULT_RESTORE_POINTS,
            limits: ExtractionLimits::default(),
        }
    }
}

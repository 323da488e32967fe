use crate::models::error::SError;
use camino::Utf8Path;
use glob::{MatchOptions, Pattern};
use tracing::warn;

/// Data-only files a mod may delete from the game tree.
pub const DELETE_ALLOW: &[&str] = &[
    "*.ltc",                // license files (real-name fixes)
    "*.dbc",                // database
    "*.fmf",                // tactics
    "*.rtf",                // graphics config
    "*.edt",                // editor data templates
    "editor_data_*.bundle", // editor data bundles
    "*.lnc",                // language files
];

/// Core executables, engine runtime and platform integration files. Never written to or deleted.
pub const RESERVED: &[&str] = &[
    "fm26.exe",
    "fm.exe",
    "football manager 2026.exe",
    "footballmanager.exe",
    "libsteam_api.dll",
    "libsteam_api.so",
    "libsteam_api.dylib",
    "steam_api64.dll",
    "steam_api.dll",
    "unityplayer.dll",
    "libunityplayer.so",
    "globalgamemanagers",
    "globalgamemanagers.assets",
    "resources.assets",
    "sharedassets*.assets",
    "data.unity3d",
    "maindata",
    "boot_config.txt",
];

/// Deleting anything matching these is refused even when the allow-list matches.
pub const DELETE_DENY: &[&str] = &[
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
    "*.pak",
    "level*",
    "player_prefs",
];

const UNIX_SYSTEM_DIRS: &[&str] = &["/System", "/usr", "/bin", "/sbin", "/etc", "/var", "/boot"];
const WINDOWS_SYSTEM_TREES: &[&str] = &["c:/windows"];
/// Roots whose direct children are other applications; deeper paths (Steam libraries) are fine.
const WINDOWS_SHALLOW_ROOTS: &[&str] = &["c:/program files", "c:/program files (x86)", "c:/programdata"];

/// Compiled allow/deny rules consulted before any destructive file operation.
#[derive(Clone, Debug)]
pub struct SecurityPolicy {
    reserved: Vec<(Pattern, &'static str)>,
    deny: Vec<(Pattern, &'static str)>,
    allow: Vec<Pattern>,
}

fn compile(patterns: &[&'static str]) -> Result<Vec<(Pattern, &'static str)>, SError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map(|compiled| (compiled, *p))
                .map_err(|e| SError::ParseError(format!("pattern '{p}': {e}")))
        })
        .collect()
}

impl SecurityPolicy {
    pub fn new() -> Result<Self, SError> {
        Ok(Self {
            reserved: compile(RESERVED)?,
            deny: compile(DELETE_DENY)?,
            allow: compile(DELETE_ALLOW)?.into_iter().map(|(p, _)| p).collect(),
        })
    }

    /// Reserved pattern the file name matches, if any.
    pub fn reserved_pattern(&self, file_name: &str) -> Option<&'static str> {
        let name = file_name.to_lowercase();
        matching(&self.reserved, &name)
    }

    /// Name-only delete rules. Errors carry the rule that rejected the name.
    pub fn check_delete_name(&self, file_name: &str) -> Result<(), String> {
        let name = file_name.to_lowercase();

        if let Some(p) = matching(&self.reserved, &name) {
            return Err(format!("critical game file '{name}' matches protected pattern '{p}'"));
        }
        if let Some(p) = matching(&self.deny, &name) {
            return Err(format!("'{name}' matches protected pattern '{p}'"));
        }
        if self.allow.iter().any(|p| p.matches_with(&name, NAME_MATCH)) {
            return Ok(());
        }
        Err(format!(
            "file type of '{name}' is not allowed for deletion; allowed: {}",
            DELETE_ALLOW.join(", ")
        ))
    }

    /// Full check for an absolute delete target: inside one of `roots`, outside system
    /// directories, and an allowed file name.
    pub fn authorize_delete(&self, target: &Utf8Path, roots: &[&Utf8Path]) -> Result<(), SError> {
        let rule = if !roots.iter().any(|r| target.starts_with(r)) {
            Err("outside every target root".to_string())
        } else if is_system_path(target) {
            Err("inside a protected system directory".to_string())
        } else {
            match target.file_name() {
                Some(name) => self.check_delete_name(name),
                None => Err("target has no file name".to_string()),
            }
        };

        rule.map_err(|rule| {
            warn!(path = %target, %rule, "delete blocked");
            SError::SecurityViolation {
                path: target.to_owned(),
                rule,
            }
        })
    }
}

/// File names never contain separators, so `*` may match anything.
const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

fn matching(patterns: &[(Pattern, &'static str)], name: &str) -> Option<&'static str> {
    patterns
        .iter()
        .find(|(p, _)| p.matches_with(name, NAME_MATCH))
        .map(|(_, raw)| *raw)
}

pub fn is_system_path(path: &Utf8Path) -> bool {
    if UNIX_SYSTEM_DIRS.iter().any(|d| path.starts_with(d)) {
        return true;
    }

    let lowered = path.as_str().replace('\\', "/").to_lowercase();
    let lowered = lowered.trim_end_matches('/');

    if WINDOWS_SYSTEM_TREES
        .iter()
        .any(|d| lowered == *d || lowered.starts_with(&format!("{d}/")))
    {
        return true;
    }

    let shallow = WINDOWS_SHALLOW_ROOTS.iter().any(|root| {
        lowered == *root
            || lowered
                .strip_prefix(&format!("{root}/"))
                .is_some_and(|rest| !rest.contains('/'))
    });
    if shallow {
        return true;
    }

    directories::BaseDirs::new().is_some_and(|d| d.home_dir() == path.as_std_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SecurityPolicy {
        SecurityPolicy::new().unwrap()
    }

    #[test]
    fn patterns_match_whole_names() {
        let p = policy();
        assert!(p.check_delete_name("editor_data_2026.bundle").is_ok());
        assert_eq!(p.reserved_pattern("sharedassets12.assets"), Some("sharedassets*.assets"));
        assert!(p.check_delete_name("english.ltc.bak").is_err());
        assert!(p.check_delete_name("my_level.ltc").is_ok());
        assert_eq!(p.reserved_pattern("UnityPlayer.dll"), Some("unityplayer.dll"));
    }

    #[test]
    fn data_files_may_be_deleted() {
        let p = policy();
        for name in ["english.ltc", "test.dbc", "fake.edt", "test.lnc", "my-tactic.fmf"] {
            assert!(p.check_delete_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn binaries_and_unknown_types_are_refused() {
        let p = policy();
        for name in ["fm26.exe", "FM26.exe", "winhttp.dll", "random.txt", "UnityPlayer.dll", "steam_api64.dll"] {
            assert!(p.check_delete_name(name).is_err(), "{name}");
        }
    }

    #[test]
    fn deny_wins_over_allow() {
        let p = policy();
        // matches `level*` and `*.ltc`
        let rule = p.check_delete_name("level1.ltc").unwrap_err();
        assert!(rule.contains("level*"));
    }

    #[test]
    fn system_directories() {
        assert!(is_system_path(Utf8Path::new("/usr/lib/x.ltc")));
        assert!(is_system_path(Utf8Path::new("C:\\Windows\\System32\\a.ltc")));
        assert!(is_system_path(Utf8Path::new("C:/Program Files/SomeApp")));
        assert!(!is_system_path(Utf8Path::new(
            "C:/Program Files (x86)/Steam/steamapps/common/Football Manager 26/data/a.ltc"
        )));
    }

    #[test]
    fn delete_outside_roots_is_refused() {
        let p = policy();
        let err = p
            .authorize_delete(Utf8Path::new("/elsewhere/a.ltc"), &[Utf8Path::new("/games/fm")])
            .unwrap_err();
        assert!(matches!(err, SError::SecurityViolation { .. }));
    }
}

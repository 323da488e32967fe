use camino::{Utf8Path, Utf8PathBuf};

macro_rules! define_paths {
    ($name:ident { $($field:ident : $default:expr),* $(,)? }) => {
        #[derive(Clone, Debug)]
        pub struct $name {
            $(pub $field: Utf8PathBuf,)*
        }

        impl $name {
            pub fn to_absolute(mut self, base: &Utf8Path) -> Self {
                $(self.$field = base.join(self.$field);)*
                self
            }

            pub fn new(base: &Utf8Path) -> Self {
                Self::default().to_absolute(base)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $($field: $default.into(),)*
                }
            }
        }
    };
}

define_paths!(ModPaths {
    manifest: "manifest.json",
});

define_paths!(WorkspacePaths {
    mods: "mods",
    staging: "staging",
    logs: "logs",
    registry: "registry.toml",
    backups: "backups.toml",
    restore_points: "restore_points",
});

/// Executables of the target application, relative to the game root.
define_paths!(AppExecutables {
    windows: "fm.exe",
    windows_alt: "fm26.exe",
    mac: "fm.app/Contents/MacOS/fm",
});

impl AppExecutables {
    pub fn all(&self) -> [&Utf8PathBuf; 3] {
        [&self.windows, &self.windows_alt, &self.mac]
    }
}

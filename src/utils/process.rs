use camino::{Utf8Path, Utf8PathBuf};
use sysinfo::System;

pub struct ProcessChecker;

impl ProcessChecker {
    /// Returns the first of `executables` that belongs to a live process.
    /// Paths that do not exist on disk are ignored, so a missing mac bundle on a
    /// Windows install costs nothing.
    pub fn find_running(sys: &mut System, executables: &[Utf8PathBuf]) -> Option<Utf8PathBuf> {
        let present: Vec<(Utf8PathBuf, std::path::PathBuf)> = executables
            .iter()
            .filter(|p| p.exists())
            .filter_map(|p| dunce::canonicalize(p).ok().map(|c| (p.clone(), c)))
            .collect();

        if present.is_empty() {
            return None;
        }

        sys.refresh_processes();

        sys.processes().values().find_map(|process| {
            let exe = process.exe()?;
            present
                .iter()
                .find(|(_, canonical)| exe == canonical.as_path())
                .map(|(original, _)| original.clone())
        })
    }

    pub fn display_name(path: &Utf8Path) -> String {
        path.file_name().unwrap_or(path.as_str()).to_string()
    }
}

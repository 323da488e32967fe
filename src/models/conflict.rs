use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Contributor {
    pub name: String,
    pub order: u32,
}

/// Paths written by more than one enabled mod. Contributors are sorted by load order,
/// so the last one is the mod whose content ends up on disk.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub paths: BTreeMap<Utf8PathBuf, Vec<Contributor>>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn winner(&self, path: &Utf8Path) -> Option<&Contributor> {
        self.paths.get(path).and_then(|c| c.last())
    }

    /// Keeps only the paths the given mod takes part in.
    pub fn involving(self, name: &str) -> Self {
        Self {
            paths: self
                .paths
                .into_iter()
                .filter(|(_, c)| c.iter().any(|m| m.name == name))
                .collect(),
        }
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} conflicting path(s)", self.paths.len())?;
        for (path, contributors) in &self.paths {
            let names = contributors
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(" < ");
            write!(f, "; '{path}': {names}")?;
        }
        Ok(())
    }
}

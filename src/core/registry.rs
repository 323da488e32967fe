use crate::models::error::SError;
use crate::models::record::ModRecord;
use crate::utils::toml::Toml;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Imported mods kept sorted by load order. Later entries win on shared paths.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct ModRegistry {
    #[serde(default)]
    mods: Vec<ModRecord>,
}

impl ModRegistry {
    pub fn load(path: &Utf8Path) -> Result<Self, SError> {
        let mut registry: Self = Toml::read_or_default(path)?;
        registry.mods.sort_by_key(|m| m.order);
        registry.validate_order()?;
        Ok(registry)
    }

    pub fn persist(&self, path: &Utf8Path) -> Result<(), SError> {
        Toml::write(path, self)
    }

    pub fn records(&self) -> &[ModRecord] {
        &self.mods
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut ModRecord> {
        self.mods.iter_mut()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ModRecord> {
        self.mods.iter().filter(|m| m.enabled)
    }

    pub fn get(&self, name: &str) -> Result<&ModRecord, SError> {
        self.mods
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| SError::ModNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut ModRecord, SError> {
        self.mods
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| SError::ModNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mods.iter().any(|m| m.name == name)
    }

    /// Records `writer` as the mod whose content is on disk at `path`; `None` clears it.
    pub fn set_writer(&mut self, path: &Utf8Path, writer: Option<&str>) {
        for m in &mut self.mods {
            if Some(m.name.as_str()) == writer {
                m.written.insert(path.to_owned());
            } else {
                m.written.remove(path);
            }
        }
    }

    pub fn writer_of(&self, path: &Utf8Path) -> Option<&str> {
        self.mods
            .iter()
            .find(|m| m.wrote(path))
            .map(|m| m.name.as_str())
    }

    pub fn next_order(&self) -> u32 {
        self.mods.last().map(|m| m.order + 1).unwrap_or(0)
    }

    /// Appends a new record at the end of the load order.
    pub fn insert(&mut self, name: &str, version: &str) -> Result<&ModRecord, SError> {
        if self.contains(name) {
            return Err(SError::ModExists(name.to_string()));
        }
        let order = self.next_order();
        self.mods.push(ModRecord::new(name, version, order));
        Ok(&self.mods[self.mods.len() - 1])
    }

    pub fn remove(&mut self, name: &str) -> Result<ModRecord, SError> {
        let pos = self
            .mods
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| SError::ModNotFound(name.to_string()))?;
        let record = self.mods.remove(pos);
        self.renumber();
        Ok(record)
    }

    /// Moves `name` to `position` (clamped to the end) and renumbers everything.
    pub fn reorder(&mut self, name: &str, position: usize) -> Result<(), SError> {
        let from = self
            .mods
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| SError::ModNotFound(name.to_string()))?;
        let record = self.mods.remove(from);
        let to = position.min(self.mods.len());
        self.mods.insert(to, record);
        self.renumber();
        Ok(())
    }

    /// Replaces the whole order with `names`, which must list every mod exactly once.
    pub fn set_order(&mut self, names: &[String]) -> Result<(), SError> {
        let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let present: BTreeSet<&str> = self.mods.iter().map(|m| m.name.as_str()).collect();
        if wanted.len() != names.len() || wanted != present {
            return Err(SError::InvalidLoadOrder(
                "order must name every imported mod exactly once".into(),
            ));
        }
        self.mods.sort_by_key(|m| names.iter().position(|n| *n == m.name));
        self.renumber();
        Ok(())
    }

    fn renumber(&mut self) {
        for (i, m) in self.mods.iter_mut().enumerate() {
            m.order = i as u32;
        }
    }

    pub fn validate_order(&self) -> Result<(), SError> {
        let mut seen = BTreeSet::new();
        for m in &self.mods {
            if !seen.insert(m.order) {
                return Err(SError::InvalidLoadOrder(format!(
                    "position {} is used twice ('{}')",
                    m.order, m.name
                )));
            }
        }
        let mut names = BTreeSet::new();
        for m in &self.mods {
            if !names.insert(m.name.as_str()) {
                return Err(SError::InvalidLoadOrder(format!("'{}' is listed twice", m.name)));
            }
        }
        Ok(())
    }
}

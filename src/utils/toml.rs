use crate::models::error::SError;
use camino::Utf8Path;

pub struct Toml;

impl Toml {
    /// Writes through a sibling temp file so a crash never leaves half a state file behind.
    pub fn write<T: serde::Serialize>(path: &Utf8Path, data: &T) -> Result<(), SError> {
        let text = toml::to_string(data).map_err(|e| SError::ParseError(e.to_string()))?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, text).map_err(|e| SError::IOError(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| SError::IOError(e.to_string()))
    }

    pub fn read<T: serde::de::DeserializeOwned>(path: &Utf8Path) -> Result<T, SError> {
        let s = std::fs::read_to_string(path).map_err(|e| SError::IOError(e.to_string()))?;
        toml::from_str::<T>(&s).map_err(|e| SError::ParseError(e.to_string()))
    }

    /// Missing file means a fresh workspace.
    pub fn read_or_default<T>(path: &Utf8Path) -> Result<T, SError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if !path.exists() {
            return Ok(T::default());
        }
        Self::read(path)
    }
}

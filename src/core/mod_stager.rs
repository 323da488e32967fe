use crate::core::decompression::SafeArchiveExtractor;
use crate::core::validator::ManifestValidator;
use crate::models::error::SError;
use crate::models::manifest::ModManifest;
use crate::models::paths::ModPaths;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing::{debug, warn};

/// A validated mod waiting to be copied into the workspace.
#[derive(Debug)]
pub struct StagedMod {
    pub manifest: ModManifest,
    /// Folder holding `manifest.json` and the payload files.
    pub payload: Utf8PathBuf,
    /// Temporary folder to delete once the payload has been taken over.
    staging: Option<Utf8PathBuf>,
}

impl StagedMod {
    pub fn clean_up(&self) -> Result<(), SError> {
        let Some(dir) = &self.staging else {
            return Ok(());
        };
        debug!("clean up for {dir}");
        fs::remove_dir_all(dir).map_err(|e| SError::io_failure(dir, "remove staging", e))
    }
}

pub struct ModStager<'a> {
    pub validator: &'a ManifestValidator,
    pub extractor: &'a SafeArchiveExtractor,
    pub staging_root: &'a Utf8Path,
}

impl ModStager<'_> {
    /// Accepts a mod folder or a ZIP archive and returns it validated.
    pub fn stage(&self, input: &Utf8Path) -> Result<StagedMod, SError> {
        if input.is_dir() {
            let payload = Self::locate_payload(input)?;
            let manifest = self.load(&payload)?;
            return Ok(StagedMod {
                manifest,
                payload,
                staging: None,
            });
        }

        if SafeArchiveExtractor::is_archive(input) && input.is_file() {
            let dir = self.extractor.extract(input, self.staging_root)?;
            return match self.load(&dir) {
                Ok(manifest) => Ok(StagedMod {
                    manifest,
                    payload: dir.clone(),
                    staging: Some(dir),
                }),
                Err(e) => {
                    if let Err(cleanup) = fs::remove_dir_all(&dir) {
                        warn!(staging = %dir, error = %cleanup, "failed to remove staging");
                    }
                    Err(e)
                }
            };
        }

        Err(SError::io_failure(input, "import", "not a mod folder or .zip archive"))
    }

    fn load(&self, payload: &Utf8Path) -> Result<ModManifest, SError> {
        let manifest = self.validator.read(&ModPaths::new(payload).manifest)?;
        self.validator.verify_payload(&manifest, payload)?;
        Ok(manifest)
    }

    /// A folder carries its manifest at the root, or inside its only sub-folder
    /// (the shape most archive tools produce when zipping a folder).
    fn locate_payload(dir: &Utf8Path) -> Result<Utf8PathBuf, SError> {
        if ModPaths::new(dir).manifest.is_file() {
            return Ok(dir.to_owned());
        }

        let children = dir
            .read_dir_utf8()
            .map_err(|e| SError::io_failure(dir, "read dir", e))?
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.into_path())
            .collect::<Vec<_>>();

        match children.as_slice() {
            [only] if ModPaths::new(only).manifest.is_file() => Ok(only.clone()),
            _ => Err(SError::io_failure(dir, "import", "manifest.json not found")),
        }
    }
}

use crate::config::limits::ExtractionLimits;
use crate::models::error::{ArchiveViolation, SError};
use crate::models::paths::ModPaths;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{Read, Write};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zip::ZipArchive;

const CHUNK: usize = 64 * 1024;

/// Unpacks untrusted ZIP archives into a fresh staging folder.
pub struct SafeArchiveExtractor {
    limits: ExtractionLimits,
}

impl SafeArchiveExtractor {
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    pub fn is_archive(path: &Utf8Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    }

    /// Extracts into `staging_root/<uuid>` and returns that folder.
    /// Nothing is left behind when the archive is rejected.
    #[instrument(skip(self))]
    pub fn extract(&self, archive: &Utf8Path, staging_root: &Utf8Path) -> Result<Utf8PathBuf, SError> {
        let dest = staging_root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dest).map_err(|e| SError::io_failure(&dest, "create staging", e))?;

        match self.extract_into(archive, &dest) {
            Ok(()) => {
                info!(staging = %dest, "archive extracted");
                Ok(dest)
            }
            Err(e) => {
                warn!(error = %e, "extraction aborted");
                if let Err(cleanup) = fs::remove_dir_all(&dest) {
                    warn!(staging = %dest, error = %cleanup, "failed to remove staging");
                }
                Err(e)
            }
        }
    }

    fn extract_into(&self, archive_path: &Utf8Path, dest: &Utf8Path) -> Result<(), SError> {
        let reject = |violation: ArchiveViolation| SError::ArchiveSecurity {
            archive: archive_path.to_owned(),
            violation,
        };

        let file = File::open(archive_path).map_err(|e| SError::io_failure(archive_path, "open archive", e))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| reject(ArchiveViolation::Corrupt(e.to_string())))?;

        if archive.len() > self.limits.max_entries {
            return Err(reject(ArchiveViolation::TooManyEntries(self.limits.max_entries)));
        }

        let descriptor = ModPaths::default().manifest;
        if !archive.file_names().any(|n| n == descriptor.as_str()) {
            return Err(reject(ArchiveViolation::MissingDescriptor));
        }

        // Vet every header before the first byte is written.
        let mut layout = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| reject(ArchiveViolation::Corrupt(e.to_string())))?;
            let name = entry.name().to_string();

            if entry.is_symlink() {
                return Err(reject(ArchiveViolation::Link(name)));
            }
            let rel = entry
                .enclosed_name()
                .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
                .ok_or_else(|| reject(ArchiveViolation::PathTraversal(name.clone())))?;

            layout.push((rel, entry.is_dir(), entry.compressed_size()));
        }

        let mut total: u64 = 0;
        let mut buf = vec![0u8; CHUNK];

        for (i, (rel, is_dir, compressed)) in layout.into_iter().enumerate() {
            let out_path = dest.join(&rel);
            if is_dir {
                fs::create_dir_all(&out_path).map_err(|e| SError::io_failure(&out_path, "create dir", e))?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent).map_err(|e| SError::io_failure(parent, "create dir", e))?;
            }

            let mut entry = archive
                .by_index(i)
                .map_err(|e| reject(ArchiveViolation::Corrupt(e.to_string())))?;
            let entry_limit = compressed
                .saturating_mul(self.limits.max_entry_ratio)
                .max(self.limits.ratio_grace_bytes);

            let mut out = File::create(&out_path).map_err(|e| SError::io_failure(&out_path, "create file", e))?;
            let mut written: u64 = 0;
            loop {
                let n = entry
                    .read(&mut buf)
                    .map_err(|e| reject(ArchiveViolation::Corrupt(e.to_string())))?;
                if n == 0 {
                    break;
                }
                written += n as u64;
                total += n as u64;

                if total > self.limits.max_total_bytes {
                    return Err(reject(ArchiveViolation::SizeCeiling(self.limits.max_total_bytes)));
                }
                if written > entry_limit {
                    return Err(reject(ArchiveViolation::RatioCeiling {
                        entry: rel.to_string(),
                        limit: self.limits.max_entry_ratio,
                    }));
                }
                out.write_all(&buf[..n])
                    .map_err(|e| SError::io_failure(&out_path, "write", e))?;
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o755));
                }
            }

            debug!(entry = %rel, bytes = written, "extracted");
        }

        Ok(())
    }
}

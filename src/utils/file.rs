use crate::models::error::SError;
use camino::Utf8Path;
use tracing::warn;
use walkdir::WalkDir;

pub struct FileUtils;

impl FileUtils {
    /// Recursively copies a directory tree from source to destination.
    /// Creates all necessary directories and overwrites existing files.
    /// Symbolic links are never followed nor copied.
    pub fn copy_recursive(src: &Utf8Path, dst: &Utf8Path) -> Result<(), SError> {
        std::fs::create_dir_all(dst)?;

        for entry in WalkDir::new(src) {
            let entry = entry?;
            let src_path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                SError::ParseError(format!("Invalid UTF-8 path: {:?}", entry.path()))
            })?;

            let rel_path = src_path.strip_prefix(src)?;
            let dst_path = dst.join(rel_path);

            if entry.file_type().is_symlink() {
                warn!("skipping symbolic link {src_path}");
                continue;
            }

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&dst_path)?;
            } else {
                if let Some(parent) = dst_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(src_path, &dst_path)?;
            }
        }

        Ok(())
    }

    /// Lexically normalizes a relative path, refusing anything that climbs above its start.
    pub fn normalize_relative(path: &Utf8Path) -> Option<camino::Utf8PathBuf> {
        let mut out = camino::Utf8PathBuf::new();
        for part in path.as_str().split(['/', '\\']) {
            match part {
                "" | "." => continue,
                ".." => return None,
                p => out.push(p),
            }
        }
        Some(out)
    }

    pub fn hash_file(path: &Utf8Path) -> Result<String, SError> {
        let mut hasher = blake3::Hasher::new();
        let mut file = std::fs::File::open(path)?;
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hasher.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_joins_mixed_separators() {
        let p = FileUtils::normalize_relative(Utf8Path::new("data\\db/./1800/english.ltc")).unwrap();
        assert_eq!(p.as_str(), "data/db/1800/english.ltc");
    }

    #[test]
    fn normalize_refuses_parent_segments() {
        assert!(FileUtils::normalize_relative(Utf8Path::new("a/../../b")).is_none());
        assert!(FileUtils::normalize_relative(Utf8Path::new("a/..")).is_none());
    }
}

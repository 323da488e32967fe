use crate::models::conflict::ConflictReport;
use camino::Utf8PathBuf;
use derive_more::Display;
use serde::Serialize;
use std::fmt;

/// One rule broken by a manifest, addressed by its JSON location (`files[2].target_subpath`).
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Display)]
#[display("{field}: {rule}")]
pub struct ManifestViolation {
    pub field: String,
    pub rule: String,
}

impl ManifestViolation {
    pub fn new(field: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ManifestViolations(pub Vec<ManifestViolation>);

impl ManifestViolations {
    pub fn iter(&self) -> impl Iterator<Item = &ManifestViolation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn mentions(&self, field: &str) -> bool {
        self.0.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ManifestViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{} violation(s): {}", self.0.len(), joined)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Display)]
pub enum ArchiveViolation {
    #[display("entry '{_0}' escapes the staging directory")]
    PathTraversal(String),
    #[display("entry '{_0}' is a link")]
    Link(String),
    #[display("uncompressed size exceeds {_0} bytes")]
    SizeCeiling(u64),
    #[display("entry '{entry}' exceeds compression ratio {limit}:1")]
    RatioCeiling { entry: String, limit: u64 },
    #[display("archive holds more than {_0} entries")]
    TooManyEntries(usize),
    #[display("manifest.json is missing from the archive root")]
    MissingDescriptor,
    #[display("archive is unreadable: {_0}")]
    Corrupt(String),
}

#[derive(Serialize, Debug)]
pub struct ErrorList(pub Vec<SError>);

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

#[derive(Serialize, Debug, Display)]
pub enum SError {
    #[display("invalid manifest, {_0}")]
    ManifestError(ManifestViolations),
    #[display("archive '{archive}' rejected: {violation}")]
    ArchiveSecurity {
        archive: Utf8PathBuf,
        violation: ArchiveViolation,
    },
    #[display("security violation at '{path}': {rule}")]
    SecurityViolation { path: Utf8PathBuf, rule: String },
    #[display("confirmation required: {_0}")]
    ConflictWarning(ConflictReport),
    #[display("{operation} failed for '{path}': {reason}")]
    IOFailure {
        path: Utf8PathBuf,
        operation: String,
        reason: String,
    },
    #[display("restore of '{path}' failed, backup kept at '{backup}': {reason}")]
    BackupRestoreFailure {
        path: Utf8PathBuf,
        backup: Utf8PathBuf,
        reason: String,
    },
    #[display("disabling '{name}' left modded paths behind: {failures}")]
    RestoreIncomplete { name: String, failures: ErrorList },
    #[display("parse error: {_0}")]
    ParseError(String),
    #[display("io error: {_0}")]
    IOError(String),
    #[display("mod '{_0}' not found")]
    ModNotFound(String),
    #[display("mod '{_0}' already exists")]
    ModExists(String),
    #[display("mod '{_0}' is enabled, disable it first")]
    ModEnabled(String),
    #[display("restore point '{_0}' not found")]
    RestorePointNotFound(String),
    #[display("restore point '{_0}' was taken with a different set of enabled mods")]
    RestorePointStale(String),
    #[display("invalid load order: {_0}")]
    InvalidLoadOrder(String),
    #[display("no target directory configured for '{_0}'")]
    TargetNotConfigured(String),
    #[display("'{_0}' is running, close it before changing mods")]
    ApplicationRunning(String),
    #[display("async runtime error: {_0}")]
    AsyncRuntimeError(String),
    #[display("failed to publish task status: {_0}")]
    UpdateStatusError(String),
    ContextUnprovided,
    NoActiveWorkspace,
}

impl std::error::Error for SError {}

impl SError {
    pub fn io_failure(path: &camino::Utf8Path, operation: &str, err: impl fmt::Display) -> Self {
        SError::IOFailure {
            path: path.to_owned(),
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SError {
    fn from(e: std::io::Error) -> Self {
        SError::IOError(e.to_string())
    }
}

impl From<serde_json::Error> for SError {
    fn from(e: serde_json::Error) -> Self {
        SError::ParseError(e.to_string())
    }
}

impl From<std::path::StripPrefixError> for SError {
    fn from(e: std::path::StripPrefixError) -> Self {
        SError::ParseError(e.to_string())
    }
}

impl From<confy::ConfyError> for SError {
    fn from(e: confy::ConfyError) -> Self {
        SError::ParseError(e.to_string())
    }
}

impl From<zip::result::ZipError> for SError {
    fn from(e: zip::result::ZipError) -> Self {
        SError::ParseError(e.to_string())
    }
}

impl From<walkdir::Error> for SError {
    fn from(e: walkdir::Error) -> Self {
        SError::IOError(e.to_string())
    }
}

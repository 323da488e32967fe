use serde::{Deserialize, Serialize};

/// Resource ceilings applied while unpacking untrusted archives.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractionLimits {
    /// Total decompressed bytes across the whole archive.
    pub max_total_bytes: u64,
    /// Decompressed-to-compressed ratio allowed for a single entry.
    pub max_entry_ratio: u64,
    /// Bytes an entry may produce before the ratio check kicks in; small files compress wildly.
    pub ratio_grace_bytes: u64,
    pub max_entries: usize,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 500_000_000,
            max_entry_ratio: 100,
            ratio_grace_bytes: 1 << 20,
            max_entries: 10_000,
        }
    }
}

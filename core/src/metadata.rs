use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format-independent summary every descriptor fills in.
///
/// `cluster_size` is in bytes; `clusters` and `free_clusters` count allocation
/// units of that size. Absent information stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMetadata {
    #[serde(rename = "type")]
    pub fs_type: String,
    pub volume_name: Option<String>,
    pub cluster_size: u32,
    pub clusters: u64,
    pub free_clusters: Option<u64>,
    pub files: Option<u64>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
    pub backup_date: Option<DateTime<Utc>>,
    pub bootable: bool,
    pub dirty: bool,
    pub volume_serial: Option<String>,
    pub system_identifier: Option<String>,
}

impl NormalizedMetadata {
    pub fn new(fs_type: impl Into<String>) -> Self {
        Self {
            fs_type: fs_type.into(),
            ..Default::default()
        }
    }

    /// Total size in bytes implied by cluster size and count.
    pub fn total_bytes(&self) -> u64 {
        self.cluster_size as u64 * self.clusters
    }

    /// Empty labels are recorded as absent.
    pub fn with_volume_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.volume_name = if name.is_empty() { None } else { Some(name) };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_field_name_in_json() {
        let mut meta = NormalizedMetadata::new("cramfs");
        meta.cluster_size = 4096;
        meta.clusters = 10;
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "cramfs");
        assert!(json["volume_name"].is_null());
        assert_eq!(meta.total_bytes(), 40960);
    }

    #[test]
    fn test_empty_label_is_absent() {
        assert_eq!(NormalizedMetadata::new("x").with_volume_name("").volume_name, None);
        assert_eq!(
            NormalizedMetadata::new("x").with_volume_name("DISK").volume_name.as_deref(),
            Some("DISK")
        );
    }
}

use crate::device::{Partition, SectorSource};
use crate::encoding::Encoding;
use crate::error::Result;
use crate::metadata::NormalizedMetadata;
use crate::readonly::ReadOnlyFilesystem;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReportLine {
    Text(String),
    Warning(String),
}

/// Human-readable description of a volume, one attribute per line.
///
/// Warnings are rendered after the regular lines, in the order they were raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    lines: Vec<ReportLine>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl Into<String>) -> &mut Self {
        self.lines.push(ReportLine::Text(text.into()));
        self
    }

    pub fn field(&mut self, label: &str, value: impl fmt::Display) -> &mut Self {
        self.line(format!("{}: {}", label, value))
    }

    /// Record a structural inconsistency that does not prevent decoding.
    pub fn warn(&mut self, message: impl Into<String>) -> &mut Self {
        let message = message.into();
        warn!("{}", message);
        self.lines.push(ReportLine::Warning(message));
        self
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|l| match l {
            ReportLine::Warning(w) => Some(w.as_str()),
            ReportLine::Text(_) => None,
        })
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// Rendered lines, warnings last.
    pub fn lines(&self) -> Vec<String> {
        let text = self.lines.iter().filter_map(|l| match l {
            ReportLine::Text(t) => Some(t.clone()),
            ReportLine::Warning(_) => None,
        });
        text.chain(self.warnings().map(|w| format!("WARNING: {}", w))).collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Result of describing a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesystemInfo {
    pub report: Report,
    pub metadata: NormalizedMetadata,
}

/// One on-disk format: recognizes it and summarizes its control structures.
///
/// Implementations hold no per-call state, so a single instance can probe any
/// number of unrelated partitions, concurrently if the source allows it.
pub trait Filesystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn id(&self) -> Uuid;

    fn author(&self) -> &'static str;

    /// Encoding used for text fields when the caller supplies none.
    fn default_encoding(&self) -> Encoding {
        Encoding::Ascii
    }

    /// Format-specific signature check. May fail with mismatch-class errors
    /// (`Truncated`, `OutOfRange`, `FormatMismatch`), which `identify` absorbs.
    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool>;

    /// Whether the partition holds this format. Only hard failures of the
    /// medium surface as errors.
    fn identify(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        match self.detect(source, partition) {
            Ok(found) => Ok(found),
            Err(e) if e.is_mismatch() => {
                debug!("{}: not a match ({})", self.name(), e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-read and describe the volume. Fails with `FormatMismatch` if the
    /// signature no longer matches.
    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo>;

    /// Fresh handle for file-level access, if the format offers any.
    fn read_only(&self) -> Option<Box<dyn ReadOnlyFilesystem>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_render_last() {
        let mut report = Report::new();
        report.line("Volume name: TEST");
        report.warn("checksum mismatch");
        report.field("Blocks", 42);

        assert!(report.has_warnings());
        assert_eq!(
            report.to_string(),
            "Volume name: TEST\nBlocks: 42\nWARNING: checksum mismatch"
        );
        assert_eq!(report.warnings().collect::<Vec<_>>(), vec!["checksum mismatch"]);
    }
}

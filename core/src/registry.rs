use crate::device::{Partition, SectorSource};
use crate::encoding::Encoding;
use crate::error::{RelicError, Result};
use crate::filesystem::{Filesystem, FilesystemInfo};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

/// A descriptor whose probe failed with a hard error
#[derive(Debug)]
pub struct ProbeFailure {
    pub name: &'static str,
    pub error: RelicError,
}

/// Outcome of running every registered descriptor against one partition
#[derive(Default)]
pub struct ProbeReport {
    pub matches: Vec<Arc<dyn Filesystem>>,
    pub failures: Vec<ProbeFailure>,
}

impl ProbeReport {
    pub fn names(&self) -> Vec<&'static str> {
        self.matches.iter().map(|fs| fs.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl fmt::Debug for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeReport")
            .field("matches", &self.names())
            .field("failures", &self.failures)
            .finish()
    }
}

/// One matching descriptor and what it had to say
#[derive(Debug)]
pub struct Description {
    pub name: &'static str,
    pub info: Result<FilesystemInfo>,
}

/// Ordered set of descriptors; probing follows registration order.
#[derive(Default)]
pub struct FilesystemRegistry {
    filesystems: Vec<Arc<dyn Filesystem>>,
}

impl FilesystemRegistry {
    pub fn new() -> Self {
        Self { filesystems: Vec::new() }
    }

    /// Names and ids must be unique within a registry.
    pub fn register(&mut self, filesystem: Arc<dyn Filesystem>) -> Result<()> {
        if self.get(filesystem.name()).is_some() || self.get_by_id(filesystem.id()).is_some() {
            return Err(RelicError::InvalidArgument(format!(
                "filesystem {} ({}) is already registered",
                filesystem.name(),
                filesystem.id()
            )));
        }
        debug!("Registered filesystem {} ({})", filesystem.name(), filesystem.id());
        self.filesystems.push(filesystem);
        Ok(())
    }

    /// Case-insensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Filesystem>> {
        self.filesystems
            .iter()
            .find(|fs| fs.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<Arc<dyn Filesystem>> {
        self.filesystems.iter().find(|fs| fs.id() == id).cloned()
    }

    pub fn list(&self) -> &[Arc<dyn Filesystem>] {
        &self.filesystems
    }

    pub fn len(&self) -> usize {
        self.filesystems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filesystems.is_empty()
    }

    /// Run every descriptor's identify. All matches are reported in
    /// registration order; a failing descriptor never hides the others.
    pub fn probe(&self, source: &dyn SectorSource, partition: &Partition) -> ProbeReport {
        let mut report = ProbeReport::default();
        for fs in &self.filesystems {
            Self::record(&mut report, fs, fs.identify(source, partition));
        }
        info!(
            "Probed {} filesystem(s) on LBA {}..={}: {} match(es)",
            self.filesystems.len(),
            partition.start,
            partition.end,
            report.matches.len()
        );
        report
    }

    /// Same as `probe`, with one scoped thread per descriptor.
    pub fn probe_concurrent(
        &self,
        source: &(dyn SectorSource + Sync),
        partition: &Partition,
    ) -> ProbeReport {
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .filesystems
                .iter()
                .map(|fs| scope.spawn(move || fs.identify(source, partition)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(RelicError::InvalidArgument("probe thread panicked".to_string())))
                })
                .collect()
        });

        let mut report = ProbeReport::default();
        for (fs, result) in self.filesystems.iter().zip(results) {
            Self::record(&mut report, fs, result);
        }
        report
    }

    fn record(report: &mut ProbeReport, fs: &Arc<dyn Filesystem>, result: Result<bool>) {
        match result {
            Ok(true) => {
                debug!("{} matched", fs.name());
                report.matches.push(Arc::clone(fs));
            }
            Ok(false) => {}
            Err(error) => {
                warn!("{} failed while probing: {}", fs.name(), error);
                report.failures.push(ProbeFailure { name: fs.name(), error });
            }
        }
    }

    /// First match in registration order. A convenience only: several
    /// descriptors may legitimately claim the same partition.
    pub fn first_match(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
    ) -> Option<Arc<dyn Filesystem>> {
        self.filesystems
            .iter()
            .find(|fs| matches!(fs.identify(source, partition), Ok(true)))
            .cloned()
    }

    /// Probe, then describe each match.
    pub fn describe(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> (Vec<Description>, Vec<ProbeFailure>) {
        let report = self.probe(source, partition);
        let descriptions = report
            .matches
            .iter()
            .map(|fs| Description {
                name: fs.name(),
                info: fs.get_information(source, partition, encoding),
            })
            .collect();
        (descriptions, report.failures)
    }
}

impl fmt::Debug for FilesystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.filesystems.iter().map(|fs| fs.name())).finish()
    }
}

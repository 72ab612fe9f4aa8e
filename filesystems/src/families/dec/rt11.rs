// DEC RT-11
// Home block in block 1, directory segments of two blocks each from block 6 on.
// Names and the system version are packed three characters per word in Radix-50.

use crate::families::{require_extent, AUTHOR};
use log::{debug, warn};
use relic_core::decoder::word_sum16;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const RT11_BLOCK: u64 = 512;
const HOME_BLOCK_OFFSET: u64 = RT11_BLOCK;
const CHECKSUM_OFFSET: usize = 0x1FE;
const SYSTEM_ID: &[u8; 12] = b"DECRT11A    ";
const SEGMENT_BLOCKS: u64 = 2;
const SEGMENT_HEADER_SIZE: usize = 10;
const ENTRY_BASE_SIZE: usize = 14;
const MAX_SEGMENTS: u16 = 31;
const BOOT_NOP: u16 = 0o000240;

const E_TENT: u16 = 0x0100;
const E_MPTY: u16 = 0x0200;
const E_PERM: u16 = 0x0400;
const E_EOS: u16 = 0x0800;

const RADIX50: &[u8; 40] = b" ABCDEFGHIJKLMNOPQRSTUVWXYZ$.%0123456789";

/// Three characters from one Radix-50 word.
pub fn radix50_word(word: u16) -> [char; 3] {
    if word >= 40 * 40 * 40 {
        return ['?'; 3];
    }
    let w = word as usize;
    [
        RADIX50[w / 1600] as char,
        RADIX50[(w / 40) % 40] as char,
        RADIX50[w % 40] as char,
    ]
}

pub fn radix50(words: &[u16]) -> String {
    words.iter().flat_map(|&w| radix50_word(w)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rt11HomeBlock {
    pub pack_cluster_size: u16,
    pub first_directory_block: u16,
    pub system_version: u16,
    pub volume_id: [u8; 12],
    pub owner: [u8; 12],
    pub system_id: [u8; 12],
    pub checksum: u16,
}

impl Decode for Rt11HomeBlock {
    const SIZE: usize = 512;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            pack_cluster_size: r.u16(0x1D2)?,
            first_directory_block: r.u16(0x1D4)?,
            system_version: r.u16(0x1D6)?,
            volume_id: r.bytes::<12>(0x1D8)?,
            owner: r.bytes::<12>(0x1E4)?,
            system_id: r.bytes::<12>(0x1F0)?,
            checksum: r.u16(CHECKSUM_OFFSET)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SegmentHeader {
    total_segments: u16,
    next_segment: u16,
    extra_bytes: u16,
    data_start: u16,
}

impl Decode for SegmentHeader {
    const SIZE: usize = SEGMENT_HEADER_SIZE;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        Ok(Self {
            total_segments: r.u16(0)?,
            next_segment: r.u16(2)?,
            extra_bytes: r.u16(6)?,
            data_start: r.u16(8)?,
        })
    }
}

/// Totals gathered from the directory
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DirectorySummary {
    segments: u16,
    files: u64,
    used_blocks: u64,
    free_blocks: u64,
    tentative: u64,
}

pub struct Rt11Filesystem;

impl Rt11Filesystem {
    fn read_home_block(source: &dyn SectorSource, partition: &Partition) -> Result<(Rt11HomeBlock, Vec<u8>)> {
        require_extent(source, partition, 512, HOME_BLOCK_OFFSET + RT11_BLOCK)?;
        let raw = read_bytes(source, partition, HOME_BLOCK_OFFSET, Rt11HomeBlock::SIZE)?;
        let home = Rt11HomeBlock::decode(&raw, Endianness::Little)?;
        if &home.system_id != SYSTEM_ID {
            return Err(RelicError::mismatch("RT-11 system identification"));
        }
        Ok((home, raw))
    }

    /// Walk the segment chain. Stops at the first unreadable segment or loop.
    fn scan_directory(
        source: &dyn SectorSource,
        partition: &Partition,
        first_block: u16,
        report: &mut Report,
    ) -> Result<DirectorySummary> {
        let mut summary = DirectorySummary::default();
        let mut segment = 1u16;
        let mut visited = Vec::new();

        while segment != 0 {
            if visited.contains(&segment) || segment > MAX_SEGMENTS {
                report.warn(format!("Directory segment chain is broken at segment {}", segment));
                break;
            }
            visited.push(segment);

            let offset = (first_block as u64 + (segment as u64 - 1) * SEGMENT_BLOCKS) * RT11_BLOCK;
            let raw = match read_bytes(source, partition, offset, (SEGMENT_BLOCKS * RT11_BLOCK) as usize) {
                Ok(raw) => raw,
                Err(e) if e.is_mismatch() => {
                    report.warn(format!("Directory segment {} lies outside the partition", segment));
                    break;
                }
                Err(e) => return Err(e),
            };
            let header = SegmentHeader::decode(&raw, Endianness::Little)?;
            if segment == 1 {
                summary.segments = header.total_segments;
            }
            debug!("rt11: segment {} next {} start {}", segment, header.next_segment, header.data_start);

            let entry_size = ENTRY_BASE_SIZE + header.extra_bytes as usize;
            let mut pos = SEGMENT_HEADER_SIZE;
            while pos + entry_size <= raw.len() {
                let entry = FieldReader::new(&raw[pos..], ENTRY_BASE_SIZE, Endianness::Little)?;
                let status = entry.u16(0)?;
                let length = entry.u16(8)? as u64;
                if status & E_EOS != 0 {
                    break;
                }
                if status & E_PERM != 0 {
                    summary.files += 1;
                    summary.used_blocks += length;
                } else if status & E_MPTY != 0 {
                    summary.free_blocks += length;
                } else if status & E_TENT != 0 {
                    summary.tentative += 1;
                } else {
                    warn!("rt11: unknown directory entry status {:#06x}", status);
                }
                pos += entry_size;
            }
            segment = header.next_segment;
        }

        Ok(summary)
    }
}

impl Filesystem for Rt11Filesystem {
    fn name(&self) -> &'static str {
        "RT-11 file system"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xdb3e7f5a_8c1d_4a62_9f07_5b8e2c4d6a13)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_home_block(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let (home, raw) = Self::read_home_block(source, partition)?;
        let volume_id = encoding.decode_padded(&home.volume_id);
        let owner = encoding.decode_padded(&home.owner);
        let cluster = home.pack_cluster_size.max(1) as u32;
        let boot = read_bytes(source, partition, 0, 2)?;
        let bootable = u16::from_le_bytes([boot[0], boot[1]]) == BOOT_NOP;

        let mut report = Report::new();
        report
            .line("RT-11 file system")
            .field("Volume ID", &volume_id)
            .field("Owner", &owner)
            .field("System version", radix50(&[home.system_version]).trim_end())
            .line(format!("{} bytes per cluster", cluster as u64 * RT11_BLOCK))
            .line(format!("Directory starts at block {}", home.first_directory_block));

        let computed = word_sum16(&raw[..CHECKSUM_OFFSET], Endianness::Little);
        if computed != home.checksum {
            report.warn(format!(
                "Home block checksum {:04X} does not match computed {:04X}",
                home.checksum, computed
            ));
        }

        let summary = Self::scan_directory(source, partition, home.first_directory_block, &mut report)?;
        report
            .line(format!("{} directory segments", summary.segments))
            .line(format!("{} files using {} blocks", summary.files, summary.used_blocks))
            .line(format!("{} blocks free", summary.free_blocks));
        if summary.tentative > 0 {
            report.line(format!("{} tentative files", summary.tentative));
        }
        if bootable {
            report.line("Volume is bootable");
        }

        let mut metadata = NormalizedMetadata::new("RT-11").with_volume_name(volume_id);
        metadata.cluster_size = cluster * RT11_BLOCK as u32;
        metadata.clusters = partition.size_bytes(source.info().sector_size) / metadata.cluster_size as u64;
        metadata.free_clusters = Some(summary.free_blocks / cluster as u64);
        metadata.files = Some(summary.files);
        metadata.bootable = bootable;

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    const FIRST_DIR_BLOCK: u16 = 6;

    fn home_block(good_checksum: bool) -> FieldWriter {
        let mut home = FieldWriter::new(Rt11HomeBlock::SIZE, Endianness::Little);
        home.u16(0x1D2, 1)
            .u16(0x1D4, FIRST_DIR_BLOCK)
            // "V05"
            .u16(0x1D6, 22 * 1600 + 30 * 40 + 35)
            .bytes(0x1D8, b"RT11A       ")
            .bytes(0x1E4, b"DIGITAL     ")
            .bytes(0x1F0, SYSTEM_ID);
        let sum = word_sum16(&home.as_bytes()[..CHECKSUM_OFFSET], Endianness::Little);
        home.u16(CHECKSUM_OFFSET, if good_checksum { sum } else { sum ^ 0x5555 });
        home
    }

    fn entry(segment: &mut FieldWriter, pos: usize, status: u16, length: u16) {
        segment.u16(pos, status).u16(pos + 8, length);
    }

    fn rt11_image(good_checksum: bool) -> ImageBuilder {
        let mut segment = FieldWriter::new(1024, Endianness::Little);
        segment.u16(0, 4).u16(2, 0).u16(4, 1).u16(6, 0).u16(8, 14);
        entry(&mut segment, 10, E_PERM, 20);
        entry(&mut segment, 24, E_PERM, 5);
        entry(&mut segment, 38, E_MPTY, 400);
        entry(&mut segment, 52, E_EOS, 0);

        let mut image = ImageBuilder::new(512, 494);
        image.put(0, &BOOT_NOP.to_le_bytes());
        image.put(HOME_BLOCK_OFFSET as usize, home_block(good_checksum).as_bytes());
        image.put(FIRST_DIR_BLOCK as usize * 512, segment.as_bytes());
        image
    }

    #[test]
    fn test_radix50() {
        assert_eq!(radix50(&[22 * 1600 + 30 * 40 + 35]), "V05");
        assert_eq!(radix50(&[0]), "   ");
        assert_eq!(radix50_word(0xFFFF), ['?'; 3]);
    }

    #[test]
    fn test_home_block_and_directory() {
        let image = rt11_image(true);
        assert!(identifies(&Rt11Filesystem, &image));
        assert_magic_sensitive(&Rt11Filesystem, &image, 512 + 0x1F0..512 + 0x1F8);
        assert_rejects_one_sector(&Rt11Filesystem, &image);

        let info = assert_idempotent(&Rt11Filesystem, &image);
        assert!(!info.report.has_warnings());
        let text = info.report.to_string();
        assert!(text.contains("System version: V05"));
        assert!(text.contains("2 files using 25 blocks"));
        let meta = &info.metadata;
        assert_eq!(meta.volume_name.as_deref(), Some("RT11A"));
        assert_eq!(meta.clusters, 494);
        assert_eq!(meta.free_clusters, Some(400));
        assert_eq!(meta.files, Some(2));
        assert!(meta.bootable);
    }

    #[test]
    fn test_checksum_mismatch_is_a_warning() {
        let image = rt11_image(false);
        let source = image.build();
        let info = Rt11Filesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.report.warnings().count(), 1);
        assert_eq!(info.metadata.files, Some(2));
    }

    #[test]
    fn test_rejects_small_sectors() {
        let mut image = ImageBuilder::new(256, 8);
        image.put(HOME_BLOCK_OFFSET as usize, home_block(true).as_bytes());
        assert!(!identifies(&Rt11Filesystem, &image));
    }

    #[test]
    fn test_truncated_directory_warns() {
        let mut image = ImageBuilder::new(512, 4);
        image.put(HOME_BLOCK_OFFSET as usize, home_block(true).as_bytes());
        let source = image.build();
        let info = Rt11Filesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.report.warnings().count(), 1);
        assert_eq!(info.metadata.files, Some(0));
    }
}

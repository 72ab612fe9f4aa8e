// ISO 9660 with Joliet and El Torito extensions
// Volume descriptors are 2048-byte records from byte 32768 on, ended by a type 255
// terminator. Numeric fields are recorded twice, little-endian then big-endian.

use crate::families::{require_extent, AUTHOR};
use log::debug;
use relic_core::dates::iso9660_to_datetime;
use relic_core::{
    read_bytes, Decode, Encoding, Endianness, FieldReader, Filesystem, FilesystemInfo,
    NormalizedMetadata, Partition, RelicError, Report, Result, SectorSource,
};
use uuid::Uuid;

const DESCRIPTOR_SIZE: usize = 2048;
const FIRST_DESCRIPTOR: u64 = 16 * DESCRIPTOR_SIZE as u64;
const MAX_DESCRIPTORS: u64 = 16;
const STANDARD_ID: &[u8; 5] = b"CD001";
const EL_TORITO_ID: &[u8] = b"EL TORITO SPECIFICATION";
const JOLIET_ESCAPES: [&[u8; 3]; 3] = [b"%/@", b"%/C", b"%/E"];

const TYPE_BOOT_RECORD: u8 = 0;
const TYPE_PRIMARY: u8 = 1;
const TYPE_SUPPLEMENTARY: u8 = 2;
const TYPE_TERMINATOR: u8 = 255;

/// Primary or supplementary volume descriptor.
///
/// Both-endian fields are read from the copy matching the decode endianness, so
/// decoding the same bytes both ways yields the two recorded copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoVolumeDescriptor {
    pub descriptor_type: u8,
    pub standard_id: [u8; 5],
    pub version: u8,
    pub system_id: [u8; 32],
    pub volume_id: [u8; 32],
    pub space_size: u32,
    pub escape_sequences: [u8; 32],
    pub set_size: u16,
    pub sequence: u16,
    pub block_size: u16,
    pub path_table_size: u32,
    pub volume_set_id: [u8; 128],
    pub publisher_id: [u8; 128],
    pub preparer_id: [u8; 128],
    pub application_id: [u8; 128],
    pub creation: [u8; 17],
    pub modification: [u8; 17],
    pub expiration: [u8; 17],
    pub effective: [u8; 17],
    pub structure_version: u8,
}

impl Decode for IsoVolumeDescriptor {
    const SIZE: usize = 882;

    fn decode(bytes: &[u8], endianness: Endianness) -> Result<Self> {
        let r = FieldReader::new(bytes, Self::SIZE, endianness)?;
        let pick = |le: usize, be: usize| match endianness {
            Endianness::Little => le,
            Endianness::Big => be,
        };
        Ok(Self {
            descriptor_type: r.u8(0)?,
            standard_id: r.bytes::<5>(1)?,
            version: r.u8(6)?,
            system_id: r.bytes::<32>(8)?,
            volume_id: r.bytes::<32>(40)?,
            space_size: r.u32(pick(80, 84))?,
            escape_sequences: r.bytes::<32>(88)?,
            set_size: r.u16(pick(120, 122))?,
            sequence: r.u16(pick(124, 126))?,
            block_size: r.u16(pick(128, 130))?,
            path_table_size: r.u32(pick(132, 136))?,
            volume_set_id: r.bytes::<128>(190)?,
            publisher_id: r.bytes::<128>(318)?,
            preparer_id: r.bytes::<128>(446)?,
            application_id: r.bytes::<128>(574)?,
            creation: r.bytes::<17>(813)?,
            modification: r.bytes::<17>(830)?,
            expiration: r.bytes::<17>(847)?,
            effective: r.bytes::<17>(864)?,
            structure_version: r.u8(881)?,
        })
    }
}

impl IsoVolumeDescriptor {
    fn is_joliet(&self) -> bool {
        self.descriptor_type == TYPE_SUPPLEMENTARY
            && JOLIET_ESCAPES.iter().any(|esc| self.escape_sequences[..3] == esc[..])
    }

    /// Fields whose two recorded copies differ.
    fn endian_disagreements(&self, big: &IsoVolumeDescriptor) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.space_size != big.space_size {
            fields.push("volume space size");
        }
        if self.set_size != big.set_size {
            fields.push("volume set size");
        }
        if self.sequence != big.sequence {
            fields.push("volume sequence number");
        }
        if self.block_size != big.block_size {
            fields.push("logical block size");
        }
        if self.path_table_size != big.path_table_size {
            fields.push("path table size");
        }
        fields
    }
}

/// What the descriptor set scan found
#[derive(Debug, Clone)]
struct DescriptorSet {
    primary: IsoVolumeDescriptor,
    primary_big: IsoVolumeDescriptor,
    joliet: Option<IsoVolumeDescriptor>,
    boot_catalog: Option<u32>,
    terminated: bool,
}

pub struct Iso9660Filesystem;

impl Iso9660Filesystem {
    fn read_descriptors(source: &dyn SectorSource, partition: &Partition) -> Result<DescriptorSet> {
        require_extent(source, partition, 0, FIRST_DESCRIPTOR + DESCRIPTOR_SIZE as u64)?;
        let available = partition.size_bytes(source.info().sector_size);

        let mut primary = None;
        let mut joliet = None;
        let mut boot_catalog = None;
        let mut terminated = false;

        for index in 0..MAX_DESCRIPTORS {
            let offset = FIRST_DESCRIPTOR + index * DESCRIPTOR_SIZE as u64;
            if offset + DESCRIPTOR_SIZE as u64 > available {
                break;
            }
            let raw = read_bytes(source, partition, offset, DESCRIPTOR_SIZE)?;
            if &raw[1..6] != STANDARD_ID || raw[6] != 1 {
                if index == 0 {
                    return Err(RelicError::mismatch("ISO 9660 standard identifier"));
                }
                break;
            }
            debug!("iso9660: descriptor {} has type {}", index + 16, raw[0]);
            match raw[0] {
                TYPE_BOOT_RECORD if raw[7..7 + EL_TORITO_ID.len()] == *EL_TORITO_ID => {
                    let r = FieldReader::new(&raw, 75, Endianness::Little)?;
                    boot_catalog = Some(r.u32(71)?);
                }
                TYPE_PRIMARY if primary.is_none() => {
                    primary = Some((
                        IsoVolumeDescriptor::decode(&raw, Endianness::Little)?,
                        IsoVolumeDescriptor::decode(&raw, Endianness::Big)?,
                    ));
                }
                TYPE_SUPPLEMENTARY if joliet.is_none() => {
                    let svd = IsoVolumeDescriptor::decode(&raw, Endianness::Little)?;
                    if svd.is_joliet() {
                        joliet = Some(svd);
                    }
                }
                TYPE_TERMINATOR => {
                    terminated = true;
                    break;
                }
                _ => {}
            }
        }

        let (primary, primary_big) = primary.ok_or_else(|| RelicError::mismatch("no primary volume descriptor"))?;
        Ok(DescriptorSet { primary, primary_big, joliet, boot_catalog, terminated })
    }
}

impl Filesystem for Iso9660Filesystem {
    fn name(&self) -> &'static str {
        "ISO9660 Filesystem"
    }

    fn id(&self) -> Uuid {
        Uuid::from_u128(0xd812f4d3_c357_400e_9d52_1b5b6c3a2f70)
    }

    fn author(&self) -> &'static str {
        AUTHOR
    }

    fn detect(&self, source: &dyn SectorSource, partition: &Partition) -> Result<bool> {
        Self::read_descriptors(source, partition).map(|_| true)
    }

    fn get_information(
        &self,
        source: &dyn SectorSource,
        partition: &Partition,
        encoding: Option<Encoding>,
    ) -> Result<FilesystemInfo> {
        let encoding = encoding.unwrap_or(self.default_encoding());
        let set = Self::read_descriptors(source, partition)?;
        let pvd = &set.primary;
        let created = iso9660_to_datetime(&pvd.creation);
        let modified = iso9660_to_datetime(&pvd.modification);
        let expires = iso9660_to_datetime(&pvd.expiration);
        let effective = iso9660_to_datetime(&pvd.effective);
        let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
            d.map_or_else(|| "not specified".to_string(), |d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        };
        let volume_id = encoding.decode_padded(&pvd.volume_id);
        let system_id = encoding.decode_padded(&pvd.system_id);

        let mut report = Report::new();
        report.line("ISO9660 file system");
        if set.joliet.is_some() {
            report.line("Joliet extensions present");
        }
        if let Some(catalog) = set.boot_catalog {
            report.line(format!("El Torito boot catalog at sector {}", catalog));
        }
        report
            .line("Primary volume descriptor:")
            .field("System identifier", &system_id)
            .field("Volume identifier", &volume_id)
            .field("Volume set identifier", encoding.decode_padded(&pvd.volume_set_id))
            .field("Publisher identifier", encoding.decode_padded(&pvd.publisher_id))
            .field("Data preparer identifier", encoding.decode_padded(&pvd.preparer_id))
            .field("Application identifier", encoding.decode_padded(&pvd.application_id))
            .line(format!("Volume {} of {}", pvd.sequence, pvd.set_size))
            .line(format!("{} blocks of {} bytes", pvd.space_size, pvd.block_size))
            .line(format!("Path table is {} bytes", pvd.path_table_size))
            .field("Volume created on", date(created))
            .field("Volume last modified on", date(modified))
            .field("Volume expires on", date(expires))
            .field("Volume effective from", date(effective));

        let volume_name = match &set.joliet {
            Some(svd) => {
                let name = Encoding::Utf16Be.decode_padded(&svd.volume_id);
                report
                    .line("Joliet volume descriptor:")
                    .field("System identifier", Encoding::Utf16Be.decode_padded(&svd.system_id))
                    .field("Volume identifier", &name);
                name
            }
            None => volume_id,
        };

        let disagreements = pvd.endian_disagreements(&set.primary_big);
        if !disagreements.is_empty() {
            report.warn(format!(
                "Little- and big-endian copies disagree on {}",
                disagreements.join(", ")
            ));
        }
        if !set.terminated {
            report.warn("Volume descriptor set terminator not found");
        }
        let declared = pvd.space_size as u64 * pvd.block_size as u64;
        let available = partition.size_bytes(source.info().sector_size);
        if declared > available {
            report.warn(format!("Volume claims {} bytes but the partition holds {}", declared, available));
        }

        let mut metadata = NormalizedMetadata::new("ISO9660").with_volume_name(volume_name);
        metadata.cluster_size = pvd.block_size as u32;
        metadata.clusters = pvd.space_size as u64;
        metadata.creation_date = created;
        metadata.modification_date = modified;
        metadata.bootable = set.boot_catalog.is_some();
        metadata.system_identifier = Some(system_id).filter(|s| !s.is_empty());

        Ok(FilesystemInfo { report, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::test_support::*;
    use chrono::Datelike;
    use relic_core::test_utils::ImageBuilder;
    use relic_core::FieldWriter;

    const PVD: usize = FIRST_DESCRIPTOR as usize;

    fn descriptor(kind: u8) -> FieldWriter {
        let mut d = FieldWriter::new(DESCRIPTOR_SIZE, Endianness::Little);
        d.u8(0, kind).bytes(1, STANDARD_ID).u8(6, 1);
        d
    }

    fn both_u32(d: &mut FieldWriter, offset: usize, value: u32) {
        d.bytes(offset, &value.to_le_bytes()).bytes(offset + 4, &value.to_be_bytes());
    }

    fn both_u16(d: &mut FieldWriter, offset: usize, value: u16) {
        d.bytes(offset, &value.to_le_bytes()).bytes(offset + 2, &value.to_be_bytes());
    }

    fn primary(space: u32) -> FieldWriter {
        let mut pvd = descriptor(TYPE_PRIMARY);
        pvd.bytes(8, b"LINUX                           ")
            .bytes(40, b"CDROM_1997                      ")
            .bytes(318, b"RELIC")
            .bytes(813, b"1997062012000000\0")
            .u8(881, 1);
        both_u32(&mut pvd, 80, space);
        both_u16(&mut pvd, 120, 1);
        both_u16(&mut pvd, 124, 1);
        both_u16(&mut pvd, 128, 2048);
        both_u32(&mut pvd, 132, 10);
        pvd
    }

    fn iso_image(extra: &[FieldWriter]) -> ImageBuilder {
        let mut image = ImageBuilder::new(2048, 64);
        image.put(PVD, primary(64).as_bytes());
        let mut offset = PVD + DESCRIPTOR_SIZE;
        for d in extra {
            image.put(offset, d.as_bytes());
            offset += DESCRIPTOR_SIZE;
        }
        image.put(offset, descriptor(TYPE_TERMINATOR).as_bytes());
        image
    }

    #[test]
    fn test_primary_volume_descriptor() {
        let image = iso_image(&[]);
        assert!(identifies(&Iso9660Filesystem, &image));
        assert_magic_sensitive(&Iso9660Filesystem, &image, PVD + 1..PVD + 6);
        assert_rejects_one_sector(&Iso9660Filesystem, &image);

        let info = assert_idempotent(&Iso9660Filesystem, &image);
        assert!(!info.report.has_warnings());
        let meta = &info.metadata;
        assert_eq!(meta.volume_name.as_deref(), Some("CDROM_1997"));
        assert_eq!(meta.system_identifier.as_deref(), Some("LINUX"));
        assert_eq!(meta.cluster_size, 2048);
        assert_eq!(meta.clusters, 64);
        assert_eq!(meta.creation_date.unwrap().year(), 1997);
        assert!(meta.modification_date.is_none());
        assert!(!meta.bootable);
    }

    #[test]
    fn test_joliet_and_el_torito() {
        let mut boot = descriptor(TYPE_BOOT_RECORD);
        boot.bytes(7, EL_TORITO_ID).u32(71, 20);

        let mut svd = descriptor(TYPE_SUPPLEMENTARY);
        svd.bytes(88, b"%/E");
        let name: Vec<u8> = "Ünïcode".encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        svd.bytes(40, &name);

        let image = iso_image(&[boot, svd]);
        let source = image.build();
        let info = Iso9660Filesystem.get_information(&source, &whole(&source), None).unwrap();
        assert_eq!(info.metadata.volume_name.as_deref(), Some("Ünïcode"));
        assert!(info.metadata.bootable);
        assert!(info.report.to_string().contains("El Torito boot catalog at sector 20"));
    }

    #[test]
    fn test_endian_copies_disagree() {
        let mut image = iso_image(&[]);
        image.put(PVD + 84, &65u32.to_be_bytes());
        let source = image.build();
        let info = Iso9660Filesystem.get_information(&source, &whole(&source), None).unwrap();
        let warnings: Vec<_> = info.report.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("volume space size"));
    }

    #[test]
    fn test_hard_disk_sector_size() {
        let bytes = iso_image(&[]).bytes().to_vec();
        let source = relic_core::MemorySectorSource::new(bytes, 512);
        assert!(Iso9660Filesystem.identify(&source, &whole(&source)).unwrap());
    }
}

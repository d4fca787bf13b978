use gptman::GPT;
use std::io::{self, Read, Seek, SeekFrom};

/// Practical upper bound on GPT partition entries.
pub const MAX_PARTITIONS: usize = 128;

const MBR_SECTOR_SIZE: u64 = 512;
const MBR_TABLE_OFFSET: usize = 0x1BE;
const MBR_ENTRY_SIZE: usize = 16;
const MBR_PRIMARY_ENTRIES: usize = 4;
const MBR_PROTECTIVE_TYPE: u8 = 0xEE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Gpt,
    Mbr,
    /// No GPT header and no MBR signature.
    Unpartitioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionExtent {
    pub start_bytes: u64,
    pub len_bytes: u64,
}

impl PartitionExtent {
    pub fn end_bytes(&self) -> u64 {
        self.start_bytes + self.len_bytes
    }
}

/// Partition slots in table order; unused entries are `None`.
#[derive(Debug, Clone)]
pub struct PartitionTable {
    kind: TableKind,
    slots: Vec<Option<PartitionExtent>>,
}

impl PartitionTable {
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> io::Result<Self> {
        match GPT::find_from(reader) {
            Ok(gpt) => return Ok(Self::from_gpt(&gpt)),
            Err(err) => log::debug!("no GPT header ({err}), falling back to MBR"),
        }
        reader.seek(SeekFrom::Start(0))?;
        let mut sector = [0u8; MBR_SECTOR_SIZE as usize];
        match reader.read_exact(&mut sector) {
            Ok(()) => Self::from_mbr(&sector),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(Self::unpartitioned()),
            Err(err) => Err(err),
        }
    }

    fn unpartitioned() -> Self {
        Self {
            kind: TableKind::Unpartitioned,
            slots: Vec::new(),
        }
    }

    fn from_gpt(gpt: &GPT) -> Self {
        let sector_size = gpt.sector_size;
        let slots = gpt
            .iter()
            .take(MAX_PARTITIONS)
            .map(|(_, entry)| {
                entry.is_used().then(|| PartitionExtent {
                    start_bytes: entry.starting_lba * sector_size,
                    len_bytes: (entry.ending_lba + 1 - entry.starting_lba) * sector_size,
                })
            })
            .collect();
        Self {
            kind: TableKind::Gpt,
            slots,
        }
    }

    fn from_mbr(sector: &[u8]) -> io::Result<Self> {
        if sector[510] != 0x55 || sector[511] != 0xAA {
            log::debug!("no MBR signature, treating image as unpartitioned");
            return Ok(Self::unpartitioned());
        }
        let mut slots = Vec::with_capacity(MBR_PRIMARY_ENTRIES);
        for index in 0..MBR_PRIMARY_ENTRIES {
            let offset = MBR_TABLE_OFFSET + index * MBR_ENTRY_SIZE;
            let entry = &sector[offset..offset + MBR_ENTRY_SIZE];
            let kind = entry[4];
            if kind == MBR_PROTECTIVE_TYPE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "protective MBR present but GPT header is unreadable",
                ));
            }
            let start_lba = read_u32(entry, 8) as u64;
            let sectors = read_u32(entry, 12) as u64;
            slots.push((kind != 0 && sectors != 0).then(|| PartitionExtent {
                start_bytes: start_lba * MBR_SECTOR_SIZE,
                len_bytes: sectors * MBR_SECTOR_SIZE,
            }));
        }
        Ok(Self {
            kind: TableKind::Mbr,
            slots,
        })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn slot(&self, id: usize) -> Option<PartitionExtent> {
        self.slots.get(id).copied().flatten()
    }

    pub fn used_ids(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.map(|_| id))
            .collect()
    }
}

fn read_u32(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_u32(buffer: &mut [u8], offset: usize, value: u32) {
        buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn mbr_sector(entries: &[(u8, u32, u32)]) -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        for (index, (kind, start, count)) in entries.iter().enumerate() {
            let offset = MBR_TABLE_OFFSET + index * MBR_ENTRY_SIZE;
            sector[offset + 4] = *kind;
            write_u32(&mut sector, offset + 8, *start);
            write_u32(&mut sector, offset + 12, *count);
        }
        sector[510] = 0x55;
        sector[511] = 0xAA;
        sector
    }

    #[test]
    fn reads_mbr_primary_entries() {
        let mut data = mbr_sector(&[(0x0C, 2048, 8192), (0, 0, 0), (0x83, 10240, 4096)]);
        data.resize(4096, 0);
        let table = PartitionTable::read_from(&mut Cursor::new(data)).unwrap();
        assert_eq!(table.kind(), TableKind::Mbr);
        assert_eq!(table.used_ids(), vec![0, 2]);
        assert_eq!(
            table.slot(0),
            Some(PartitionExtent {
                start_bytes: 2048 * 512,
                len_bytes: 8192 * 512
            })
        );
        assert_eq!(table.slot(1), None);
        assert_eq!(table.slot(100), None);
    }

    #[test]
    fn blank_disk_is_unpartitioned() {
        let table = PartitionTable::read_from(&mut Cursor::new(vec![0u8; 4096])).unwrap();
        assert_eq!(table.kind(), TableKind::Unpartitioned);
        assert!(table.used_ids().is_empty());
        assert_eq!(table.slot(0), None);

        let short = PartitionTable::read_from(&mut Cursor::new(vec![0u8; 100])).unwrap();
        assert_eq!(short.kind(), TableKind::Unpartitioned);
    }

    #[test]
    fn protective_mbr_without_gpt_is_rejected() {
        let mut data = mbr_sector(&[(MBR_PROTECTIVE_TYPE, 1, 0xFFFF_FFFF)]);
        data.resize(4096, 0);
        assert!(PartitionTable::read_from(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn reads_gpt_entries_in_order() {
        let mut data = vec![0u8; 8 * 1024 * 1024];
        let mut cursor = Cursor::new(&mut data);
        let mut gpt = GPT::new_from(&mut cursor, 512, [0x42; 16]).unwrap();
        gpt[2] = gptman::GPTPartitionEntry {
            partition_type_guid: [0x11; 16],
            unique_partition_guid: [0x22; 16],
            starting_lba: 2048,
            ending_lba: 4095,
            attribute_bits: 0,
            partition_name: "boot".into(),
        };
        gpt.write_into(&mut cursor).unwrap();

        let table = PartitionTable::read_from(&mut Cursor::new(&data)).unwrap();
        assert_eq!(table.kind(), TableKind::Gpt);
        assert_eq!(table.used_ids(), vec![1]);
        assert_eq!(
            table.slot(1),
            Some(PartitionExtent {
                start_bytes: 2048 * 512,
                len_bytes: 2048 * 512
            })
        );
    }
}

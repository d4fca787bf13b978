//! Builds small partitioned images in temp files.

use crate::table::{PartitionExtent, PartitionTable};
use fscommon::StreamSlice;
use gptman::{GPTPartitionEntry, GPT};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

const SECTOR: u64 = 512;
const MIB: u64 = 1024 * 1024;
const PART_MIB: u64 = 4;
const FIRST_LBA: u64 = 2048;

pub enum Part {
    Fat(Option<&'static str>),
    /// Zero-filled partition with no filesystem.
    Raw,
}

pub fn gpt_image(parts: &[Part]) -> NamedTempFile {
    let (image, mut file) = blank_image(parts.len());
    let mut gpt = GPT::new_from(&mut file, SECTOR, [0x42; 16]).unwrap();
    for (index, extent) in extents(parts.len()).into_iter().enumerate() {
        gpt[index as u32 + 1] = GPTPartitionEntry {
            partition_type_guid: [0x11; 16],
            unique_partition_guid: [index as u8 + 1; 16],
            starting_lba: extent.start_bytes / SECTOR,
            ending_lba: extent.end_bytes() / SECTOR - 1,
            attribute_bits: 0,
            partition_name: "part".into(),
        };
    }
    GPT::write_protective_mbr_into(&mut file, SECTOR).unwrap();
    gpt.write_into(&mut file).unwrap();
    format_parts(&file, parts);
    image
}

pub fn mbr_image(parts: &[Part]) -> NamedTempFile {
    assert!(parts.len() <= 4);
    let (image, mut file) = blank_image(parts.len());
    let mut sector = [0u8; SECTOR as usize];
    for (index, (part, extent)) in parts.iter().zip(extents(parts.len())).enumerate() {
        let offset = 0x1BE + index * 16;
        sector[offset + 4] = match part {
            Part::Fat(_) => 0x0C,
            Part::Raw => 0x83,
        };
        write_u32(&mut sector, offset + 8, (extent.start_bytes / SECTOR) as u32);
        write_u32(&mut sector, offset + 12, (extent.len_bytes / SECTOR) as u32);
    }
    sector[510] = 0x55;
    sector[511] = 0xAA;
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(&sector).unwrap();
    format_parts(&file, parts);
    image
}

pub fn put_file(image: &NamedTempFile, slot: usize, name: &str, data: &[u8]) {
    let file = image.reopen().unwrap();
    let fs = mount(&file, slot);
    let mut target = fs.root_dir().create_file(name).unwrap();
    target.truncate().unwrap();
    target.write_all(data).unwrap();
    drop(target);
    fs.unmount().unwrap();
}

pub fn read_file(image: &NamedTempFile, slot: usize, name: &str) -> Vec<u8> {
    let file = image.reopen().unwrap();
    let fs = mount(&file, slot);
    let mut data = Vec::new();
    fs.root_dir()
        .open_file(name)
        .unwrap()
        .read_to_end(&mut data)
        .unwrap();
    data
}

fn mount(file: &File, slot: usize) -> fatfs::FileSystem<StreamSlice<&File>> {
    let table = PartitionTable::read_from(&mut &*file).unwrap();
    let extent = table.slot(slot).unwrap();
    let slice = StreamSlice::new(file, extent.start_bytes, extent.end_bytes()).unwrap();
    fatfs::FileSystem::new(slice, fatfs::FsOptions::new()).unwrap()
}

fn blank_image(count: usize) -> (NamedTempFile, File) {
    let image = NamedTempFile::new().unwrap();
    let total = FIRST_LBA * SECTOR + count as u64 * PART_MIB * MIB + MIB;
    image.as_file().set_len(total).unwrap();
    let file = image.reopen().unwrap();
    (image, file)
}

fn extents(count: usize) -> Vec<PartitionExtent> {
    (0..count as u64)
        .map(|index| PartitionExtent {
            start_bytes: FIRST_LBA * SECTOR + index * PART_MIB * MIB,
            len_bytes: PART_MIB * MIB,
        })
        .collect()
}

fn format_parts(file: &File, parts: &[Part]) {
    for (part, extent) in parts.iter().zip(extents(parts.len())) {
        if let Part::Fat(label) = part {
            let mut slice = StreamSlice::new(file, extent.start_bytes, extent.end_bytes()).unwrap();
            let mut options = fatfs::FormatVolumeOptions::new();
            if let Some(label) = label {
                options = options.volume_label(label_bytes(label));
            }
            fatfs::format_volume(&mut slice, options).unwrap();
        }
    }
    file.sync_all().unwrap();
}

fn label_bytes(label: &str) -> [u8; 11] {
    let mut out = [b' '; 11];
    for (idx, byte) in label.as_bytes().iter().take(11).enumerate() {
        out[idx] = *byte;
    }
    out
}

fn write_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub mod table;
pub mod volume;

#[cfg(test)]
mod fixtures;

pub use table::{PartitionExtent, PartitionTable, TableKind, MAX_PARTITIONS};
pub use volume::{AccessMode, DiskImage, PartitionId, SlotStatus, Volume};

use edge_core::{ConfigDocument, EdgeError, Result};
use std::io;
use std::path::Path;

pub const BOOT_VOLUME_LABEL: &str = "resin-boot";
pub const CONFIG_FILE_PATH: &str = "config.json";

/// Compares labels ignoring case, padding and the dot that 8.3-style
/// renderings insert (`resin-bo.ot`).
pub fn is_boot_label(label: &str) -> bool {
    fn normalize(label: &str) -> String {
        label
            .chars()
            .filter(|c| *c != '.' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect()
    }
    normalize(label) == normalize(BOOT_VOLUME_LABEL)
}

pub fn locate_boot_partition(image_path: impl AsRef<Path>) -> Result<PartitionId> {
    let image = DiskImage::open(image_path, AccessMode::ReadOnly)?;
    find_boot_partition(&image)
}

/// Scans slots in table order and returns the first boot-labelled volume.
pub fn find_boot_partition(image: &DiskImage) -> Result<PartitionId> {
    for id in 0..MAX_PARTITIONS {
        match image.open_slot(id) {
            SlotStatus::Empty => {}
            SlotStatus::OpenError(err) => {
                log::debug!("partition {id}: not a FAT volume ({err})");
            }
            SlotStatus::Filesystem(volume) => match volume.label() {
                Some(label) if is_boot_label(&label) => {
                    log::info!(
                        "boot partition is {id} in {} (label {label:?})",
                        image.path().display()
                    );
                    return Ok(id);
                }
                label => log::debug!("partition {id}: label {label:?} is not the boot volume"),
            },
        }
    }
    Err(EdgeError::not_found(format!(
        "boot partition labelled {BOOT_VOLUME_LABEL:?} in {}",
        image.path().display()
    )))
}

pub fn read_config(
    image_path: impl AsRef<Path>,
    partition_id: PartitionId,
    file_path: &str,
) -> Result<ConfigDocument> {
    let image = DiskImage::open(image_path, AccessMode::ReadOnly)?;
    let volume = image.open_volume(partition_id)?;
    let data = volume.read_file(file_path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            EdgeError::not_found(format!("{file_path} in partition {partition_id}"))
        } else {
            EdgeError::image_access(image.path(), err)
        }
    })?;
    drop(volume);
    decode_config(&data, file_path)
}

/// Replaces `file_path` in the partition and flushes the filesystem
/// before returning. Not transactional: a failure part-way through leaves
/// whatever reached the disk.
pub fn write_config(
    image_path: impl AsRef<Path>,
    partition_id: PartitionId,
    file_path: &str,
    document: &ConfigDocument,
) -> Result<()> {
    let data = encode_config(document, file_path)?;
    let image = DiskImage::open(image_path, AccessMode::ReadWrite)?;
    let volume = image.open_volume(partition_id)?;
    let access = |err| EdgeError::image_access(image.path(), err);
    volume.write_file(file_path, &data).map_err(access)?;
    volume.close().map_err(access)?;
    image.sync()?;
    log::info!(
        "wrote {} bytes to {file_path} in partition {partition_id} of {}",
        data.len(),
        image.path().display()
    );
    Ok(())
}

pub fn decode_config(data: &[u8], what: &str) -> Result<ConfigDocument> {
    serde_json::from_slice(data).map_err(|source| EdgeError::Decode {
        what: what.to_string(),
        source,
    })
}

pub fn encode_config(document: &ConfigDocument, what: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(document).map_err(|source| EdgeError::Decode {
        what: what.to_string(),
        source,
    })
}

use crate::table::{PartitionExtent, PartitionTable};
use edge_core::{EdgeError, Result};
use fatfs::{FileSystem, FsOptions};
use fscommon::StreamSlice;
use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

pub type PartitionId = usize;

type FatFs<'a> = FileSystem<StreamSlice<&'a File>>;

/// FAT places this in the boot sector when a volume was formatted without a label.
const UNSET_LABEL: &str = "NO NAME";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

pub enum SlotStatus<'a> {
    /// The slot is unused or beyond the end of the table.
    Empty,
    Filesystem(Volume<'a>),
    /// The slot holds a partition that is not a readable FAT volume.
    OpenError(io::Error),
}

/// Volumes borrow the image's file handle, so every volume is released
/// before the image itself can be dropped.
pub struct DiskImage {
    path: PathBuf,
    file: File,
    table: PartitionTable,
    open_volumes: Cell<usize>,
}

impl DiskImage {
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(mode == AccessMode::ReadWrite)
            .open(path)
            .map_err(|err| EdgeError::image_access(path, err))?;
        let table =
            PartitionTable::read_from(&mut &file).map_err(|err| EdgeError::image_access(path, err))?;
        log::debug!(
            "opened {} ({:?} table, partitions {:?})",
            path.display(),
            table.kind(),
            table.used_ids()
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            table,
            open_volumes: Cell::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &PartitionTable {
        &self.table
    }

    pub fn list_partitions(&self) -> Vec<PartitionId> {
        self.table.used_ids()
    }

    pub fn open_slot(&self, id: PartitionId) -> SlotStatus<'_> {
        let Some(extent) = self.table.slot(id) else {
            return SlotStatus::Empty;
        };
        match self.mount(extent) {
            Ok(volume) => SlotStatus::Filesystem(volume),
            Err(err) => SlotStatus::OpenError(err),
        }
    }

    pub fn open_volume(&self, id: PartitionId) -> Result<Volume<'_>> {
        match self.open_slot(id) {
            SlotStatus::Filesystem(volume) => Ok(volume),
            SlotStatus::Empty => Err(EdgeError::not_found(format!(
                "partition {id} in {}",
                self.path.display()
            ))),
            SlotStatus::OpenError(err) => Err(EdgeError::image_access(&self.path, err)),
        }
    }

    pub fn open_volume_count(&self) -> usize {
        self.open_volumes.get()
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|err| EdgeError::image_access(&self.path, err))
    }

    fn mount(&self, extent: PartitionExtent) -> io::Result<Volume<'_>> {
        let slice = StreamSlice::new(&self.file, extent.start_bytes, extent.end_bytes())?;
        let fs = FileSystem::new(slice, FsOptions::new())?;
        self.open_volumes.set(self.open_volumes.get() + 1);
        Ok(Volume {
            fs,
            _lease: Lease(&self.open_volumes),
        })
    }
}

struct Lease<'a>(&'a Cell<usize>);

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Dropping a volume unmounts it; `close` does the same but reports
/// flush failures.
pub struct Volume<'a> {
    fs: FatFs<'a>,
    _lease: Lease<'a>,
}

impl Volume<'_> {
    pub fn label(&self) -> Option<String> {
        let label = self.fs.volume_label();
        let label = label.trim();
        (!label.is_empty() && label != UNSET_LABEL).then(|| label.to_string())
    }

    pub fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut file = self.fs.root_dir().open_file(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let mut file = self.fs.root_dir().create_file(path)?;
        file.truncate()?;
        file.write_all(data)?;
        file.flush()
    }

    pub fn close(self) -> io::Result<()> {
        let Volume { fs, _lease } = self;
        fs.unmount()
    }
}

use crate::Workflow;
use anyhow::{Context, Result};
use edge_core::{ConfigDocument, Device, EdgeError, LegacyKeyPolicy};
use edge_disk_image::{
    encode_config, locate_boot_partition, read_config, write_config, PartitionId, CONFIG_FILE_PATH,
};
use edge_enrollment::ConfigBuilder;
use edge_registry::{resolve_device, DeviceRegistry};
use edge_safety::can_create_local_file;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BakeParams {
    pub device_ref: String,
    /// Image mode when set; otherwise `output_path` is created locally.
    pub image: Option<PathBuf>,
    pub output_path: PathBuf,
    pub legacy_api_key: LegacyKeyPolicy,
}

impl BakeParams {
    pub fn local(device_ref: &str, output_path: impl Into<PathBuf>) -> Self {
        Self {
            device_ref: device_ref.to_string(),
            image: None,
            output_path: output_path.into(),
            legacy_api_key: LegacyKeyPolicy::default(),
        }
    }

    pub fn image(device_ref: &str, image: impl Into<PathBuf>) -> Self {
        Self {
            image: Some(image.into()),
            ..Self::local(device_ref, CONFIG_FILE_PATH)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BakeTarget {
    Image { path: PathBuf, partition: PartitionId },
    LocalFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BakeResult {
    pub device: Device,
    pub target: BakeTarget,
    pub config: ConfigDocument,
}

pub struct BakeWorkflow<'a> {
    registry: &'a dyn DeviceRegistry,
    params: BakeParams,
}

impl<'a> BakeWorkflow<'a> {
    pub fn new(registry: &'a dyn DeviceRegistry, params: BakeParams) -> Self {
        Self { registry, params }
    }

    pub fn execute(&self) -> Result<BakeResult> {
        run_bake(self.registry, &self.params)
    }
}

impl Workflow for BakeWorkflow<'_> {
    fn name(&self) -> &'static str {
        "bake"
    }

    fn run(&self) -> Result<()> {
        self.execute().map(|_| ())
    }
}

pub fn run_bake(registry: &dyn DeviceRegistry, params: &BakeParams) -> Result<BakeResult> {
    if params.image.is_none() {
        // Checked before any registry traffic so a refusal costs nothing.
        can_create_local_file(&params.output_path).into_result()?;
    }

    let device = resolve_device(registry, &params.device_ref)
        .with_context(|| format!("look up device {}", params.device_ref))?;
    let builder = ConfigBuilder::new(params.legacy_api_key);

    match &params.image {
        Some(image) => {
            let partition = locate_boot_partition(image)?;
            let existing = match read_config(image, partition, CONFIG_FILE_PATH) {
                Ok(document) => Some(document),
                Err(EdgeError::NotFound { .. }) => {
                    log::warn!(
                        "{} has no {CONFIG_FILE_PATH} in partition {partition}; starting empty",
                        image.display()
                    );
                    None
                }
                Err(err) => return Err(err.into()),
            };
            let config = builder.build(existing, &device)?;
            write_config(image, partition, CONFIG_FILE_PATH, &config)?;
            Ok(BakeResult {
                device,
                target: BakeTarget::Image {
                    path: image.clone(),
                    partition,
                },
                config,
            })
        }
        None => {
            let config = builder.build(None, &device)?;
            write_local_config(&params.output_path, &config)?;
            Ok(BakeResult {
                device,
                target: BakeTarget::LocalFile(params.output_path.clone()),
                config,
            })
        }
    }
}

fn write_local_config(path: &Path, config: &ConfigDocument) -> Result<()> {
    let data = encode_config(config, &path.display().to_string())?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            return Err(EdgeError::Refused(format!("{} already exists", path.display())).into());
        }
        Err(err) => return Err(EdgeError::io(format!("create {}", path.display()), err).into()),
    };
    file.write_all(&data)
        .and_then(|_| file.sync_all())
        .map_err(|err| EdgeError::io(format!("write {}", path.display()), err))?;
    log::info!("wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

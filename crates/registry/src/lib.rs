pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use http::DoniClient;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryRegistry;

use edge_core::{Device, DeviceRegistration, EdgeError, PatchOperation, Result};
use uuid::Uuid;

pub trait DeviceRegistry {
    fn create_device(&self, registration: &DeviceRegistration) -> Result<Device>;
    fn get_device(&self, id: Uuid) -> Result<Device>;
    fn list_devices(&self) -> Result<Vec<Device>>;
    fn update_device(&self, id: Uuid, patch: &[PatchOperation]) -> Result<Device>;
    fn delete_device(&self, id: Uuid) -> Result<()>;
    fn sync_device(&self, id: Uuid) -> Result<()>;
}

/// Turns a UUID or an exact device name into a device id.
pub fn resolve(registry: &dyn DeviceRegistry, reference: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    registry
        .list_devices()?
        .into_iter()
        .find(|device| device.name == reference)
        .map(|device| device.id)
        .ok_or_else(|| EdgeError::not_found(format!("device {reference:?}")))
}

pub fn resolve_device(registry: &dyn DeviceRegistry, reference: &str) -> Result<Device> {
    let id = resolve(registry, reference)?;
    registry.get_device(id)
}

use crate::DeviceRegistry;
use edge_core::{
    Device, DeviceRegistration, EdgeError, PatchOp, PatchOperation, Result, HARDWARE_TYPE,
};
use std::cell::{Cell, RefCell};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    devices: RefCell<Vec<Device>>,
    synced: RefCell<Vec<Uuid>>,
    list_calls: Cell<usize>,
}

impl MemoryRegistry {
    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: RefCell::new(devices),
            ..Default::default()
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    pub fn synced(&self) -> Vec<Uuid> {
        self.synced.borrow().clone()
    }

    fn missing(id: Uuid) -> EdgeError {
        EdgeError::not_found(format!("device {id}"))
    }
}

impl DeviceRegistry for MemoryRegistry {
    fn create_device(&self, registration: &DeviceRegistration) -> Result<Device> {
        let mut devices = self.devices.borrow_mut();
        if devices.iter().any(|device| device.name == registration.name) {
            return Err(EdgeError::Api(format!(
                "device named {} already exists",
                registration.name
            )));
        }
        let device = Device {
            id: Uuid::new_v4(),
            name: registration.name.clone(),
            hardware_type: Some(HARDWARE_TYPE.to_string()),
            properties: registration.properties.clone(),
            workers: Vec::new(),
            created_at: None,
        };
        devices.push(device.clone());
        Ok(device)
    }

    fn get_device(&self, id: Uuid) -> Result<Device> {
        self.devices
            .borrow()
            .iter()
            .find(|device| device.id == id)
            .cloned()
            .ok_or_else(|| Self::missing(id))
    }

    fn list_devices(&self) -> Result<Vec<Device>> {
        self.list_calls.set(self.list_calls.get() + 1);
        Ok(self.devices.borrow().clone())
    }

    fn update_device(&self, id: Uuid, patch: &[PatchOperation]) -> Result<Device> {
        let mut devices = self.devices.borrow_mut();
        let device = devices
            .iter_mut()
            .find(|device| device.id == id)
            .ok_or_else(|| Self::missing(id))?;
        for operation in patch {
            let key = operation
                .path
                .strip_prefix("/properties/")
                .ok_or_else(|| EdgeError::Api(format!("unsupported path {}", operation.path)))?;
            match operation.op {
                PatchOp::Add => {
                    device
                        .properties
                        .insert(key.to_string(), operation.value.clone());
                }
            }
        }
        Ok(device.clone())
    }

    fn delete_device(&self, id: Uuid) -> Result<()> {
        let mut devices = self.devices.borrow_mut();
        let before = devices.len();
        devices.retain(|device| device.id != id);
        if devices.len() == before {
            return Err(Self::missing(id));
        }
        Ok(())
    }

    fn sync_device(&self, id: Uuid) -> Result<()> {
        self.get_device(id)?;
        self.synced.borrow_mut().push(id);
        Ok(())
    }
}

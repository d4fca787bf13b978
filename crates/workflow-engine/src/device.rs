use anyhow::{Context, Result};
use edge_core::{
    validate_device_name, Device, DeviceRegistration, EdgeError, MachineType, PatchOperation,
    RegistrationProperties,
};
use edge_registry::{resolve, resolve_device, DeviceRegistry};
use edge_safety::{can_delete_device, SafetyContext};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RegisterParams {
    pub name: String,
    pub machine: MachineType,
    pub properties: RegistrationProperties,
}

pub fn run_register(registry: &dyn DeviceRegistry, params: &RegisterParams) -> Result<Device> {
    validate_device_name(&params.name)?;
    let registration =
        DeviceRegistration::new(&params.name, params.machine, params.properties.clone());
    let device = registry
        .create_device(&registration)
        .with_context(|| format!("register device {}", params.name))?;
    log::info!("registered {} as {}", device.name, device.id);
    Ok(device)
}

pub fn run_list(registry: &dyn DeviceRegistry) -> Result<Vec<Device>> {
    Ok(registry.list_devices()?)
}

pub fn run_show(registry: &dyn DeviceRegistry, device_ref: &str) -> Result<Device> {
    Ok(resolve_device(registry, device_ref)?)
}

#[derive(Debug, Clone, Default)]
pub struct SetParams {
    pub device_ref: String,
    pub contact_email: Option<String>,
    pub authorized_projects: Vec<String>,
    pub authorized_projects_reason: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_secret: Option<String>,
}

impl SetParams {
    pub fn patch(&self) -> Vec<PatchOperation> {
        let mut patch = Vec::new();
        if let Some(email) = &self.contact_email {
            patch.push(PatchOperation::add_property("contact_email", email.as_str()));
        }
        if !self.authorized_projects.is_empty() {
            patch.push(PatchOperation::add_property(
                "authorized_projects",
                self.authorized_projects.clone(),
            ));
        }
        let text_fields = [
            ("authorized_projects_reason", &self.authorized_projects_reason),
            ("application_credential_id", &self.application_credential_id),
            (
                "application_credential_secret",
                &self.application_credential_secret,
            ),
        ];
        for (key, value) in text_fields {
            if let Some(value) = value {
                patch.push(PatchOperation::add_property(key, value.as_str()));
            }
        }
        patch
    }
}

pub fn run_set(registry: &dyn DeviceRegistry, params: &SetParams) -> Result<Device> {
    let patch = params.patch();
    if patch.is_empty() {
        return Err(EdgeError::InvalidInput("nothing to update".to_string()).into());
    }
    let id = resolve(registry, &params.device_ref)?;
    let device = registry
        .update_device(id, &patch)
        .with_context(|| format!("update device {}", params.device_ref))?;
    log::info!("updated {} field(s) on {}", patch.len(), device.name);
    Ok(device)
}

#[derive(Debug, Clone)]
pub struct DeleteParams {
    pub device_ref: String,
    pub really_mean_it: bool,
}

/// Refuses before any registry call unless the confirmation flag was given.
pub fn run_delete(registry: &dyn DeviceRegistry, params: &DeleteParams) -> Result<Device> {
    let ctx = SafetyContext {
        really_mean_it: params.really_mean_it,
    };
    can_delete_device(&ctx, &params.device_ref).into_result()?;
    let device = resolve_device(registry, &params.device_ref)?;
    registry
        .delete_device(device.id)
        .with_context(|| format!("delete device {}", device.name))?;
    log::info!("deleted {} ({})", device.name, device.id);
    Ok(device)
}

pub fn run_sync(registry: &dyn DeviceRegistry, device_ref: &str) -> Result<Uuid> {
    let id = resolve(registry, device_ref)?;
    registry
        .sync_device(id)
        .with_context(|| format!("sync device {device_ref}"))?;
    Ok(id)
}

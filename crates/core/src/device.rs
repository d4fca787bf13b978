use crate::error::EdgeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Hardware type the inventory service uses for supervisor-managed devices.
pub const HARDWARE_TYPE: &str = "device.balena";
/// Worker type of the supervisor enrollment integration.
pub const SUPERVISOR_WORKER: &str = "balena";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineType {
    #[serde(rename = "raspberrypi3-64")]
    RaspberryPi3,
    #[serde(rename = "raspberrypi4-64")]
    RaspberryPi4,
    #[serde(rename = "jetson-nano")]
    JetsonNano,
}

impl MachineType {
    pub const ALL: [MachineType; 3] = [
        MachineType::RaspberryPi3,
        MachineType::RaspberryPi4,
        MachineType::JetsonNano,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineType::RaspberryPi3 => "raspberrypi3-64",
            MachineType::RaspberryPi4 => "raspberrypi4-64",
            MachineType::JetsonNano => "jetson-nano",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MachineType::RaspberryPi3 => "Raspberry Pi 3 (using 64bit OS)",
            MachineType::RaspberryPi4 => "Raspberry Pi 4 (using 64bit OS)",
            MachineType::JetsonNano => "NVIDIA Jetson Nano",
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineType {
    type Err = EdgeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        MachineType::ALL
            .into_iter()
            .find(|machine| machine.as_str() == value)
            .ok_or_else(|| {
                EdgeError::InvalidInput(format!("unsupported machine name {value:?}"))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    #[default]
    Pending,
    InProgress,
    Steady,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkerState::Pending => "PENDING",
            WorkerState::InProgress => "IN_PROGRESS",
            WorkerState::Steady => "STEADY",
            WorkerState::Error => "ERROR",
            WorkerState::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub worker_type: String,
    #[serde(default)]
    pub state: WorkerState,
    #[serde(default)]
    pub state_details: Map<String, Value>,
}

impl Worker {
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.state_details
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub hardware_type: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub workers: Vec<Worker>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Device {
    pub fn machine_type(&self) -> Option<MachineType> {
        self.property_str("machine_name")?.parse().ok()
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn worker(&self, worker_type: &str) -> Option<&Worker> {
        self.workers
            .iter()
            .find(|worker| worker.worker_type == worker_type)
    }

    pub fn supervisor_worker(&self) -> Option<&Worker> {
        self.worker(SUPERVISOR_WORKER)
    }

    pub fn authorized_projects(&self) -> Vec<String> {
        self.properties
            .get("authorized_projects")
            .and_then(Value::as_array)
            .map(|projects| {
                projects
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationProperties {
    pub contact_email: Option<String>,
    pub application_credential_id: Option<String>,
    pub application_credential_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceRegistration {
    pub name: String,
    pub hardware_type: String,
    pub properties: Map<String, Value>,
}

impl DeviceRegistration {
    pub fn new(name: &str, machine: MachineType, extra: RegistrationProperties) -> Self {
        let mut properties = Map::new();
        properties.insert("machine_name".to_string(), machine.as_str().into());
        let optional = [
            ("contact_email", extra.contact_email),
            ("application_credential_id", extra.application_credential_id),
            (
                "application_credential_secret",
                extra.application_credential_secret,
            ),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                properties.insert(key.to_string(), Value::String(value));
            }
        }
        Self {
            name: name.to_string(),
            hardware_type: HARDWARE_TYPE.to_string(),
            properties,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: Value,
}

impl PatchOperation {
    pub fn add_property(key: &str, value: impl Into<Value>) -> Self {
        Self {
            op: PatchOp::Add,
            path: format!("/properties/{key}"),
            value: value.into(),
        }
    }
}

pub mod runner;

pub use runner::{build_inventory, AnsibleRunner, PlaybookRunner};

use edge_core::{EdgeError, Result};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub type HostVars = BTreeMap<String, Value>;

pub const SETUP_PLAYBOOK: &str = "setup_edge_dev.yml";
const DEFAULTS_YAML: &str = include_str!("defaults.yml");

/// Inventory groups the setup playbook knows how to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    RaspberryPi,
    Nano,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 2] = [DeviceFamily::RaspberryPi, DeviceFamily::Nano];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceFamily::RaspberryPi => "raspberrypi",
            DeviceFamily::Nano => "nano",
        }
    }

    /// Set-if-absent overrides for this family.
    fn overrides(&self) -> Vec<(&'static str, Value)> {
        let mut vars = vec![("arch", Value::from("arm64"))];
        if *self == DeviceFamily::Nano {
            // L4T ships without docker-ce builds for its Ubuntu release.
            vars.push(("docker_package", Value::from("docker")));
        }
        vars
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceFamily {
    type Err = EdgeError;

    fn from_str(value: &str) -> Result<Self> {
        DeviceFamily::ALL
            .into_iter()
            .find(|family| family.as_str() == value)
            .ok_or_else(|| EdgeError::InvalidInput(format!("unsupported device type {value:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrollmentType {
    #[default]
    LegacyOpenstack,
}

impl EnrollmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentType::LegacyOpenstack => "legacy-openstack",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub host: String,
    pub family: DeviceFamily,
    pub enrollment_type: EnrollmentType,
    pub enrollment_conf: Option<HostVars>,
    pub network_interface: Option<String>,
    pub mgmt_channel_address: Option<String>,
    pub user_channel_address: Option<String>,
    pub sudo: bool,
    pub sudo_password: Option<String>,
    pub extra_vars: Vec<(String, String)>,
}

impl BootstrapRequest {
    pub fn new(host: &str, family: DeviceFamily) -> Self {
        Self {
            host: host.to_string(),
            family,
            enrollment_type: EnrollmentType::default(),
            enrollment_conf: None,
            network_interface: Some("eth0".to_string()),
            mgmt_channel_address: None,
            user_channel_address: None,
            sudo: true,
            sudo_password: None,
            extra_vars: Vec::new(),
        }
    }
}

/// Dedicated channel/interface options replace same-named extra vars.
/// Everything merged after them only fills gaps.
pub fn assemble_host_vars(request: &BootstrapRequest, site_internal_vip: &str) -> Result<HostVars> {
    let mut vars = HostVars::new();
    vars.insert("site_internal_vip".to_string(), Value::from(site_internal_vip));
    vars.insert(
        "enrollment_type".to_string(),
        Value::from(request.enrollment_type.as_str()),
    );
    for (key, value) in &request.extra_vars {
        vars.insert(key.clone(), Value::from(value.as_str()));
    }

    if let Some(conf) = &request.enrollment_conf {
        for (key, value) in conf {
            set_default(&mut vars, key, value.clone());
        }
    }

    let channel_vars = [
        ("iface", &request.network_interface),
        ("mgmt_ipv4", &request.mgmt_channel_address),
        ("user_ipv4", &request.user_channel_address),
    ];
    for (key, value) in channel_vars {
        if let Some(value) = value {
            vars.insert(key.to_string(), Value::from(value.as_str()));
        }
    }

    if request.sudo {
        set_default(&mut vars, "ansible_become", Value::from(true));
        if let Some(password) = &request.sudo_password {
            set_default(&mut vars, "ansible_sudo_pass", Value::from(password.as_str()));
        }
    }

    for (key, value) in request.family.overrides() {
        set_default(&mut vars, key, value);
    }

    for (key, value) in bundled_defaults()? {
        set_default(&mut vars, &key, value);
    }
    Ok(vars)
}

/// Runs the setup playbook once against the host; no retries.
pub fn bootstrap(
    runner: &dyn PlaybookRunner,
    request: &BootstrapRequest,
    site_internal_vip: &str,
) -> Result<()> {
    let vars = assemble_host_vars(request, site_internal_vip)?;
    log::info!(
        "bootstrapping {} as {} with {} variables",
        request.host,
        request.family,
        vars.len()
    );
    runner.run_playbook(SETUP_PLAYBOOK, &request.host, Some(request.family.as_str()), &vars)
}

/// Runs an arbitrary playbook with caller-supplied vars only.
pub fn run_named_playbook(
    runner: &dyn PlaybookRunner,
    name: &str,
    host: &str,
    group: Option<DeviceFamily>,
    host_vars: &[(String, String)],
) -> Result<()> {
    let playbook = if name.ends_with(".yml") {
        name.to_string()
    } else {
        format!("{name}.yml")
    };
    let vars: HostVars = host_vars
        .iter()
        .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
        .collect();
    runner.run_playbook(&playbook, host, group.as_ref().map(DeviceFamily::as_str), &vars)
}

/// Splits `KEY=VAL`; the value may itself contain `=`.
pub fn parse_key_value(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(EdgeError::InvalidInput(format!(
            "expected KEY=VAL, got {pair:?}"
        ))),
    }
}

pub fn load_enrollment_conf(path: &Path) -> Result<HostVars> {
    let data = std::fs::read_to_string(path)
        .map_err(|err| EdgeError::io(format!("read {}", path.display()), err))?;
    parse_vars_yaml(&data, &path.display().to_string())
}

fn bundled_defaults() -> Result<HostVars> {
    parse_vars_yaml(DEFAULTS_YAML, "bundled defaults")
}

fn parse_vars_yaml(data: &str, what: &str) -> Result<HostVars> {
    if data.trim().is_empty() {
        return Ok(HostVars::new());
    }
    serde_yaml::from_str(data)
        .map_err(|err| EdgeError::InvalidInput(format!("{what} must be a YAML mapping: {err}")))
}

fn set_default(vars: &mut HostVars, key: &str, value: Value) {
    vars.entry(key.to_string()).or_insert(value);
}

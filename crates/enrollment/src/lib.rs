use edge_core::{iso8601_to_epoch_millis, ConfigDocument, Device, EdgeError, LegacyKeyPolicy, Result};
use serde_json::{Map, Value};

pub const POLL_INTERVAL_MS: &str = "60000";
pub const LISTEN_PORT: &str = "48484";
pub const VPN_PORT: &str = "443";
pub const API_HOST: &str = "api.balena-cloud.com";
pub const API_ENDPOINT: &str = "https://api.balena-cloud.com";
pub const VPN_ENDPOINT: &str = "vpn.balena-cloud.com";
pub const REGISTRY_ENDPOINT: &str = "registry2.balena-cloud.com";
pub const DELTA_ENDPOINT: &str = "https://delta.balena-cloud.com";

const STATIC_DEFAULTS: [(&str, &str); 7] = [
    ("appUpdatePollInterval", POLL_INTERVAL_MS),
    ("listenPort", LISTEN_PORT),
    ("vpnPort", VPN_PORT),
    ("apiEndpoint", API_ENDPOINT),
    ("vpnEndpoint", VPN_ENDPOINT),
    ("registryEndpoint", REGISTRY_ENDPOINT),
    ("deltaEndpoint", DELTA_ENDPOINT),
];

const LEGACY_API_KEY: &str = "apiKey";

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigBuilder {
    pub legacy_api_key: LegacyKeyPolicy,
}

impl ConfigBuilder {
    pub fn new(legacy_api_key: LegacyKeyPolicy) -> Self {
        Self { legacy_api_key }
    }

    /// Later steps win: existing document, then static defaults, then
    /// identity from the device's supervisor worker.
    pub fn build(&self, existing: Option<ConfigDocument>, device: &Device) -> Result<ConfigDocument> {
        let identity = Identity::from_device(device)?;
        let mut config = existing.unwrap_or_default();

        for (key, value) in STATIC_DEFAULTS {
            config.insert(key.to_string(), Value::String(value.to_string()));
        }

        config.insert("uuid".to_string(), Value::String(identity.uuid));
        if let Some(fleet_id) = identity.fleet_id {
            config.insert("applicationId".to_string(), fleet_id);
        }
        if let Some(user_id) = identity.user_id {
            config.insert("userId".to_string(), user_id);
        }
        if let Some(registered_at) = identity.registered_at {
            let millis = Value::String(registered_at.to_string());
            config.insert("registeredAt".to_string(), millis.clone());
            config.insert("registered_at".to_string(), millis);
        }
        if let Some(api_key) = identity.api_key {
            config.insert("deviceApiKey".to_string(), Value::String(api_key.clone()));
            let keys = config
                .entry("deviceApiKeys")
                .or_insert_with(|| Value::Object(Map::new()));
            if !keys.is_object() {
                *keys = Value::Object(Map::new());
            }
            if let Value::Object(keys) = keys {
                keys.insert(API_HOST.to_string(), Value::String(api_key.clone()));
            }
            match self.legacy_api_key {
                LegacyKeyPolicy::Remove => {
                    if config.remove(LEGACY_API_KEY).is_some() {
                        log::debug!("dropped legacy {LEGACY_API_KEY} in favour of deviceApiKeys");
                    }
                }
                LegacyKeyPolicy::Retain => {
                    config.insert(LEGACY_API_KEY.to_string(), Value::String(api_key));
                }
            }
        }
        Ok(config)
    }
}

/// Builds with the default policy of dropping the legacy `apiKey`.
pub fn build_config(existing: Option<ConfigDocument>, device: &Device) -> Result<ConfigDocument> {
    ConfigBuilder::default().build(existing, device)
}

struct Identity {
    uuid: String,
    api_key: Option<String>,
    fleet_id: Option<Value>,
    user_id: Option<Value>,
    registered_at: Option<i64>,
}

impl Identity {
    fn from_device(device: &Device) -> Result<Self> {
        let incomplete = |reason: &str| EdgeError::EnrollmentIncomplete {
            device: device.name.clone(),
            reason: reason.to_string(),
        };
        let worker = device
            .supervisor_worker()
            .ok_or_else(|| incomplete("no supervisor worker on the device yet"))?;
        let api_key = worker.detail_str("device_api_key").map(str::to_string);
        let fleet_id = present(worker.state_details.get("fleet_id"));
        if api_key.is_none() && fleet_id.is_none() {
            return Err(incomplete("supervisor worker has no API key or fleet id yet"));
        }
        let registered_at = device
            .created_at
            .as_deref()
            .map(iso8601_to_epoch_millis)
            .transpose()?;
        Ok(Self {
            uuid: device.id.simple().to_string(),
            api_key,
            fleet_id,
            user_id: present(worker.state_details.get("user_id")),
            registered_at,
        })
    }
}

fn present(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(value) => Some(value.clone()),
    }
}

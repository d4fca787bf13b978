use crate::error::{EdgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "CHI_EDGE_CONFIG";
pub const INVENTORY_URL_ENV: &str = "CHI_EDGE_INVENTORY_URL";
pub const TOKEN_ENV: &str = "OS_TOKEN";
pub const PLAYBOOK_DIR_ENV: &str = "CHI_EDGE_PLAYBOOK_DIR";
pub const ANSIBLE_PLAYBOOK_ENV: &str = "CHI_EDGE_ANSIBLE_PLAYBOOK";

/// What to do with a legacy single-endpoint `apiKey` once `deviceApiKeys`
/// has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyKeyPolicy {
    #[default]
    Remove,
    Retain,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub inventory_endpoint: String,
    pub auth_token: Option<String>,
    pub playbook_dir: PathBuf,
    pub ansible_playbook: String,
    pub site_internal_vip: String,
    pub legacy_api_key: LegacyKeyPolicy,
    pub http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inventory_endpoint: "https://chi.edge.chameleoncloud.org:7001".to_string(),
            auth_token: None,
            playbook_dir: PathBuf::from("ansible"),
            ansible_playbook: "ansible-playbook".to_string(),
            site_internal_vip: "10.100.100.1".to_string(),
            legacy_api_key: LegacyKeyPolicy::Remove,
            http_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let mut settings = match config_path() {
            Some(path) => {
                log::debug!("loading settings from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|err| EdgeError::io(format!("read {}", path.display()), err))?;
        Self::from_yaml_str(&data)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data)
            .map_err(|err| EdgeError::InvalidInput(format!("settings file: {err}")))
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = present(INVENTORY_URL_ENV) {
            self.inventory_endpoint = url;
        }
        if let Some(token) = present(TOKEN_ENV) {
            self.auth_token = Some(token);
        }
        if let Some(dir) = present(PLAYBOOK_DIR_ENV) {
            self.playbook_dir = PathBuf::from(dir);
        }
        if let Some(bin) = present(ANSIBLE_PLAYBOOK_ENV) {
            self.ansible_playbook = bin;
        }
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(explicit));
    }
    dirs::config_dir()
        .map(|dir| dir.join("chi-edge").join("config.yml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(Settings::from_yaml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn yaml_overrides_selected_fields() {
        let settings = Settings::from_yaml_str(
            "inventory_endpoint: http://localhost:8001\nlegacy_api_key: retain\n",
        )
        .unwrap();
        assert_eq!(settings.inventory_endpoint, "http://localhost:8001");
        assert_eq!(settings.legacy_api_key, LegacyKeyPolicy::Retain);
        assert_eq!(settings.http_timeout_secs, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Settings::from_yaml_str("inventory_endpiont: typo\n"),
            Err(EdgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn environment_wins_over_file() {
        let env: HashMap<&str, &str> = [
            (INVENTORY_URL_ENV, "http://doni.local"),
            (TOKEN_ENV, "gAAAA-token"),
            (PLAYBOOK_DIR_ENV, ""),
        ]
        .into_iter()
        .collect();
        let mut settings = Settings::default();
        settings.apply_env(|key| env.get(key).map(|value| value.to_string()));
        assert_eq!(settings.inventory_endpoint, "http://doni.local");
        assert_eq!(settings.auth_token.as_deref(), Some("gAAAA-token"));
        assert_eq!(settings.playbook_dir, PathBuf::from("ansible"));
    }
}

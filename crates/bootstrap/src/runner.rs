use crate::HostVars;
use edge_core::{EdgeError, Result, Settings};
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use std::process::Command;

pub trait PlaybookRunner {
    fn run_playbook(
        &self,
        playbook: &str,
        host: &str,
        group: Option<&str>,
        vars: &HostVars,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct AnsibleRunner {
    binary: String,
    playbook_dir: PathBuf,
}

impl AnsibleRunner {
    pub fn new(binary: impl Into<String>, playbook_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            playbook_dir: playbook_dir.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.ansible_playbook.clone(),
            settings.playbook_dir.clone(),
        )
    }
}

impl PlaybookRunner for AnsibleRunner {
    fn run_playbook(
        &self,
        playbook: &str,
        host: &str,
        group: Option<&str>,
        vars: &HostVars,
    ) -> Result<()> {
        let playbook_path = self.playbook_dir.join(playbook);
        if !playbook_path.is_file() {
            return Err(EdgeError::not_found(format!(
                "playbook {}",
                playbook_path.display()
            )));
        }

        // Removed on drop, whichever way this function returns.
        let workdir = tempfile::tempdir().map_err(|err| EdgeError::io("create inventory dir", err))?;
        let inventory_path = workdir.path().join("hosts.yml");
        let inventory = serde_yaml::to_string(&build_inventory(host, group, vars)).map_err(|err| {
            EdgeError::Playbook {
                playbook: playbook.to_string(),
                reason: format!("cannot encode inventory: {err}"),
            }
        })?;
        std::fs::write(&inventory_path, inventory)
            .map_err(|err| EdgeError::io(format!("write {}", inventory_path.display()), err))?;

        log::info!("running {} {} against {host}", self.binary, playbook);
        let status = Command::new(&self.binary)
            .arg("-i")
            .arg(&inventory_path)
            .arg(&playbook_path)
            .status()
            .map_err(|err| EdgeError::Playbook {
                playbook: playbook.to_string(),
                reason: format!("cannot run {}: {err}", self.binary),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(EdgeError::Playbook {
                playbook: playbook.to_string(),
                reason: format!("{} exited with {status}", self.binary),
            })
        }
    }
}

/// `all.children.<group>.hosts.<host>`, or `all.hosts.<host>` without a group.
pub fn build_inventory(host: &str, group: Option<&str>, vars: &HostVars) -> Value {
    let host_vars: Mapping = vars
        .iter()
        .map(|(key, value)| (Value::from(key.as_str()), value.clone()))
        .collect();
    let hosts = mapping([(host, Value::Mapping(host_vars))]);
    let all = match group {
        Some(group) => mapping([("children", mapping([(group, mapping([("hosts", hosts)]))]))]),
        None => mapping([("hosts", hosts)]),
    };
    mapping([("all", all)])
}

fn mapping<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    Value::Mapping(
        entries
            .into_iter()
            .map(|(key, value)| (Value::from(key), value))
            .collect(),
    )
}

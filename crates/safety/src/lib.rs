use edge_core::{EdgeError, Result};
use std::path::Path;

pub const DELETE_CONFIRMATION_FLAG: &str = "--yes-i-really-really-mean-it";

#[derive(Debug, Clone, Default)]
pub struct SafetyContext {
    pub really_mean_it: bool,
}

#[derive(Debug, Clone)]
pub enum SafetyDecision {
    Allow,
    Deny(String),
}

impl SafetyDecision {
    pub fn into_result(self) -> Result<()> {
        match self {
            SafetyDecision::Allow => Ok(()),
            SafetyDecision::Deny(reason) => Err(EdgeError::Refused(reason)),
        }
    }
}

pub fn can_delete_device(ctx: &SafetyContext, device_name: &str) -> SafetyDecision {
    if !ctx.really_mean_it {
        return SafetyDecision::Deny(format!(
            "deleting {device_name} cannot be undone; pass {DELETE_CONFIRMATION_FLAG} to proceed"
        ));
    }
    SafetyDecision::Allow
}

/// Never overwrite an operator's file outside the image merge path.
pub fn can_create_local_file(path: &Path) -> SafetyDecision {
    if path.exists() {
        return SafetyDecision::Deny(format!("{} already exists", path.display()));
    }
    SafetyDecision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_delete_without_confirmation() {
        let ctx = SafetyContext::default();
        assert!(matches!(
            can_delete_device(&ctx, "pi-lab-1"),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn allows_delete_with_confirmation() {
        let ctx = SafetyContext {
            really_mean_it: true,
        };
        assert!(matches!(
            can_delete_device(&ctx, "pi-lab-1"),
            SafetyDecision::Allow
        ));
    }

    #[test]
    fn denies_existing_local_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            can_create_local_file(file.path()),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn allows_fresh_local_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            can_create_local_file(&dir.path().join("config.json")),
            SafetyDecision::Allow
        ));
    }

    #[test]
    fn deny_becomes_refused_error() {
        assert!(matches!(
            SafetyDecision::Deny("no".to_string()).into_result(),
            Err(EdgeError::Refused(_))
        ));
    }
}

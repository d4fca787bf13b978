use crate::Workflow;
use anyhow::{Context, Result};
use edge_bootstrap::{bootstrap, run_named_playbook, BootstrapRequest, DeviceFamily, PlaybookRunner};

pub struct BootstrapWorkflow<'a> {
    runner: &'a dyn PlaybookRunner,
    request: BootstrapRequest,
    site_internal_vip: String,
}

impl<'a> BootstrapWorkflow<'a> {
    pub fn new(
        runner: &'a dyn PlaybookRunner,
        request: BootstrapRequest,
        site_internal_vip: &str,
    ) -> Self {
        Self {
            runner,
            request,
            site_internal_vip: site_internal_vip.to_string(),
        }
    }
}

impl Workflow for BootstrapWorkflow<'_> {
    fn name(&self) -> &'static str {
        "bootstrap"
    }

    fn run(&self) -> Result<()> {
        bootstrap(self.runner, &self.request, &self.site_internal_vip)
            .with_context(|| format!("bootstrap {}", self.request.host))
    }
}

#[derive(Debug, Clone)]
pub struct PlaybookParams {
    pub playbook: String,
    pub host: String,
    pub group: Option<DeviceFamily>,
    pub host_vars: Vec<(String, String)>,
}

pub fn run_playbook_command(runner: &dyn PlaybookRunner, params: &PlaybookParams) -> Result<()> {
    run_named_playbook(
        runner,
        &params.playbook,
        &params.host,
        params.group,
        &params.host_vars,
    )
    .with_context(|| format!("run {} against {}", params.playbook, params.host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_workflow;
    use edge_bootstrap::HostVars;
    use edge_core::{EdgeError, Result as EdgeResult};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingRunner {
        calls: RefCell<Vec<(String, Option<String>, HostVars)>>,
        fail: bool,
    }

    impl PlaybookRunner for RecordingRunner {
        fn run_playbook(
            &self,
            playbook: &str,
            _host: &str,
            group: Option<&str>,
            vars: &HostVars,
        ) -> EdgeResult<()> {
            self.calls.borrow_mut().push((
                playbook.to_string(),
                group.map(str::to_string),
                vars.clone(),
            ));
            if self.fail {
                return Err(EdgeError::Playbook {
                    playbook: playbook.to_string(),
                    reason: "exit status: 2".to_string(),
                });
            }
            Ok(())
        }
    }

    #[test]
    fn bootstrap_workflow_uses_site_vip() {
        let runner = RecordingRunner::default();
        let request = BootstrapRequest::new("10.0.0.9", DeviceFamily::RaspberryPi);
        run_workflow(BootstrapWorkflow::new(&runner, request, "10.20.0.1")).unwrap();

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.as_deref(), Some("raspberrypi"));
        assert_eq!(
            calls[0].2.get("site_internal_vip").and_then(|v| v.as_str()),
            Some("10.20.0.1")
        );
    }

    #[test]
    fn runner_failure_is_reported_once() {
        let runner = RecordingRunner {
            fail: true,
            ..Default::default()
        };
        let request = BootstrapRequest::new("10.0.0.9", DeviceFamily::Nano);
        let err = run_workflow(BootstrapWorkflow::new(&runner, request, "10.100.100.1")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EdgeError>(),
            Some(EdgeError::Playbook { .. })
        ));
        assert_eq!(runner.calls.borrow().len(), 1);
    }

    #[test]
    fn playbook_command_passes_vars_through() {
        let runner = RecordingRunner::default();
        run_playbook_command(
            &runner,
            &PlaybookParams {
                playbook: "upgrade".to_string(),
                host: "pi".to_string(),
                group: Some(DeviceFamily::Nano),
                host_vars: vec![("k".to_string(), "v".to_string())],
            },
        )
        .unwrap();
        let calls = runner.calls.borrow();
        assert_eq!(calls[0].0, "upgrade.yml");
        assert_eq!(calls[0].2.len(), 1);
    }
}

pub mod bake;
pub mod device;
pub mod provision;

pub use bake::{run_bake, BakeParams, BakeResult, BakeTarget, BakeWorkflow};
pub use device::{
    run_delete, run_list, run_register, run_set, run_show, run_sync, DeleteParams, RegisterParams,
    SetParams,
};
pub use provision::{run_playbook_command, BootstrapWorkflow, PlaybookParams};

use anyhow::Result;

pub trait Workflow {
    fn name(&self) -> &'static str;
    fn run(&self) -> Result<()>;
}

pub fn run_workflow<W: Workflow>(workflow: W) -> Result<()> {
    log::debug!("starting workflow {}", workflow.name());
    workflow.run()
}

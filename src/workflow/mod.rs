//! Remote image build and action compile workflow.
//!
//! Every step runs through a [`CommandExecutor`](crate::execution::CommandExecutor)
//! and halts the run on the first failure that is not whitelisted as benign.

mod package;
mod policy;
mod runner;

pub use package::{zip_action_source, zip_directory};
pub use policy::{ensure_success, BENIGN_FAILURES};
pub use runner::{local_executor, run_local, BuildWorkflow, WorkflowReport};

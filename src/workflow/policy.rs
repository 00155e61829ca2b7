//! Deciding which command results halt the workflow.

use tracing::info;

use crate::execution::ExecutionResult;
use crate::Result;

/// Non-zero exits whose output marks them as harmless.
pub const BENIGN_FAILURES: &[&str] = &["nothing to commit, working tree clean"];

/// Accept `result` if it succeeded or failed only with one of the `benign`
/// messages; otherwise turn it into an error.
pub fn ensure_success(result: ExecutionResult, benign: &[&str]) -> Result<ExecutionResult> {
    if result.success() {
        return Ok(result);
    }
    if result.timed_out || result.cancelled {
        return Err(result.into_error());
    }
    if let Some(reason) = benign.iter().find(|msg| result.mentions(msg)) {
        info!("tolerating \"{}\": {}", result.command, reason);
        return Ok(result);
    }
    Err(result.into_error())
}

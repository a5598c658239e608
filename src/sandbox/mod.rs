pub mod limits;
pub mod process;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::ExecutionResult;

pub use limits::ResourceLimits;
pub use process::ProcessSandbox;

/// Platform seam for sandboxed execution. The process backend below uses
/// rlimits and process groups; a namespace- or jail-based backend can be
/// swapped in per target OS without touching the orchestrator.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Run `payload` under the given ceilings. Must return within the
    /// wall-clock limit plus teardown time, and must leave no live child
    /// processes behind on timeout or cancellation.
    async fn execute(
        &self,
        payload: &str,
        execution_id: &str,
        limits: &ResourceLimits,
        cancel: CancellationToken,
    ) -> ExecutionResult;
}

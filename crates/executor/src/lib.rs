//! `TaskExecutor` — the uniform `Execute(TaskParams) → TaskResult` contract
//! (spec.md §4.5), enum-dispatched over `InProcessExecutor` and
//! `IsolatedWorkerExecutor` the way `mr-reviewer/src/review/llm.rs` dispatches
//! `LlmClient` — no `async-trait`, no `Box<dyn ...>`.

mod in_process;
mod isolated;
mod orchestrator;

use controller_core::{ControllerResult, TaskParams, TaskResult};

pub use in_process::InProcessExecutor;
pub use isolated::IsolatedWorkerExecutor;
pub use orchestrator::{WorkerOrchestratorClient, WorkerPhase, WorkerSpec};

pub enum TaskExecutor {
    InProcess(InProcessExecutor),
    Isolated(IsolatedWorkerExecutor),
}

impl TaskExecutor {
    pub async fn execute(&self, params: &TaskParams) -> ControllerResult<TaskResult> {
        match self {
            Self::InProcess(e) => e.execute(params).await,
            Self::Isolated(e) => e.execute(params).await,
        }
    }
}

//! Task Executor (C7) and Direct Executor (C8) for the Vantage agent runtime
//! kernel (`spec.md` §4.7, §4.8).

mod criteria;
mod direct_executor;
mod history;
mod llm_call;
mod task_executor;

pub use criteria::evaluate_criteria;
pub use direct_executor::DirectExecutor;
pub use history::{compress, CompressedHistory, MiddleSummary};
pub use task_executor::TaskExecutor;

//! Executor：按子目标运行的确定性反应式循环

pub mod events;
pub mod loop_;

pub use events::ExecutorEvent;
pub use loop_::{Executor, SubgoalOutcome, SubgoalStatus};

//! 核心层：执行错误与恢复、版本化 State Store

pub mod error;
pub mod recovery;
pub mod state;

pub use error::{ExecError, FailureKind, FailureReason, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use state::{
    ElementRef, ElementRefError, ExecutionState, ExecutorPhase, StateStore, ValidatedRef,
};

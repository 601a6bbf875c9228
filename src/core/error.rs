//! 执行错误类型、结构化失败原因与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 ExecError 决定 RetryObserve / Redecide / Retry / Recover / Escalate。

use serde::Serialize;
use thiserror::Error;

use crate::core::state::ExecutorPhase;
use crate::snapshot::ProcessingError;

/// 执行循环中可能出现的错误；不会越过 Executor 边界，最终都折算为 FailureReason
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Stale reference {reference} (current version {current_version})")]
    StaleRef {
        reference: String,
        current_version: u64,
    },

    #[error("Validation failed for tool '{tool}': {}", errors.join("; "))]
    Validation { tool: String, errors: Vec<String> },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout in {phase} after {after_ms}ms")]
    Timeout { phase: ExecutorPhase, after_ms: u64 },

    #[error("Predicate not satisfied: {0}")]
    PredicateFailure(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Blockers not cleared after {0} iterations")]
    BlockerUnresolved(u32),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}

/// 失败类别（ESCALATE 报告中的机器可读部分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Processing,
    StaleRef,
    Validation,
    Transport,
    Timeout,
    PredicateFailure,
    Oracle,
    BlockerUnresolved,
    Cancelled,
    StepLimit,
    Config,
}

impl From<&ExecError> for FailureKind {
    fn from(err: &ExecError) -> Self {
        match err {
            ExecError::Processing(_) => FailureKind::Processing,
            ExecError::StaleRef { .. } => FailureKind::StaleRef,
            ExecError::Validation { .. } => FailureKind::Validation,
            ExecError::Transport(_) => FailureKind::Transport,
            ExecError::Timeout { .. } => FailureKind::Timeout,
            ExecError::PredicateFailure(_) => FailureKind::PredicateFailure,
            ExecError::Oracle(_) => FailureKind::Oracle,
            ExecError::BlockerUnresolved(_) => FailureKind::BlockerUnresolved,
            ExecError::Cancelled => FailureKind::Cancelled,
            ExecError::Config(_) => FailureKind::Config,
        }
    }
}

/// 结构化失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub phase: ExecutorPhase,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, phase: ExecutorPhase, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase,
            message: message.into(),
        }
    }

    pub fn from_error(err: &ExecError, phase: ExecutorPhase) -> Self {
        Self::new(FailureKind::from(err), phase, err.to_string())
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {:?}: {}", self.phase, self.kind, self.message)
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 退避后重新观察（OBSERVE 阶段的可重试错误）
    RetryObserve,
    /// 不执行 ACT，带着提示立即重新决策
    Redecide(String),
    /// 校验谓词失败：消耗一次重试预算后回到循环
    Retry,
    /// 进入 RECOVER，尝试替代策略
    Recover,
    /// 直接上报
    Escalate,
}

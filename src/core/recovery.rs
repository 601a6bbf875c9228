//! 错误恢复引擎
//!
//! 根据 ExecError 与出错阶段返回 RecoveryAction，供 Executor 决定是重新观察、重新决策、重试、进入 RECOVER 还是上报。
//! 次数上限不在这里判断，由循环中的预算计数器负责。

use crate::core::{ExecError, ExecutorPhase, RecoveryAction};

/// 错误 -> 循环转移的映射
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &ExecError, phase: ExecutorPhase) -> RecoveryAction {
        match err {
            ExecError::Processing(_) => RecoveryAction::RetryObserve,
            ExecError::Transport(_) | ExecError::Timeout { .. }
                if matches!(phase, ExecutorPhase::Observe | ExecutorPhase::Verify) =>
            {
                RecoveryAction::RetryObserve
            }
            ExecError::StaleRef { reference, current_version } => RecoveryAction::Redecide(format!(
                "last ref invalid: {reference} (current version {current_version}); \
                use only refs ending in @{current_version}"
            )),
            ExecError::PredicateFailure(_) => RecoveryAction::Retry,
            ExecError::Validation { .. }
            | ExecError::Transport(_)
            | ExecError::Timeout { .. }
            | ExecError::Oracle(_)
            | ExecError::BlockerUnresolved(_) => RecoveryAction::Recover,
            ExecError::Cancelled | ExecError::Config(_) => RecoveryAction::Escalate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ParseError, ProcessingError};

    #[test]
    fn test_recovery_processing_error_reobserves() {
        let engine = RecoveryEngine::new();
        let err = ExecError::Processing(ProcessingError::Parse(ParseError::Empty));
        assert_eq!(engine.handle(&err, ExecutorPhase::Observe), RecoveryAction::RetryObserve);
    }

    #[test]
    fn test_recovery_stale_ref_redecides_with_note() {
        let engine = RecoveryEngine::new();
        let err = ExecError::StaleRef {
            reference: "e12@1".to_string(),
            current_version: 2,
        };
        match engine.handle(&err, ExecutorPhase::Act) {
            RecoveryAction::Redecide(note) => {
                assert_eq!(
                    note,
                    "last ref invalid: e12@1 (current version 2); use only refs ending in @2"
                );
            }
            other => panic!("Expected Redecide, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_transport_depends_on_phase() {
        let engine = RecoveryEngine::new();
        let err = ExecError::Transport("connection reset".to_string());
        assert_eq!(engine.handle(&err, ExecutorPhase::Observe), RecoveryAction::RetryObserve);
        assert_eq!(engine.handle(&err, ExecutorPhase::Act), RecoveryAction::Recover);
    }

    #[test]
    fn test_recovery_timeout_in_decide() {
        let engine = RecoveryEngine::new();
        let err = ExecError::Timeout {
            phase: ExecutorPhase::Decide,
            after_ms: 100,
        };
        assert_eq!(engine.handle(&err, ExecutorPhase::Decide), RecoveryAction::Recover);
    }

    #[test]
    fn test_recovery_validation_and_predicate() {
        let engine = RecoveryEngine::new();
        let err = ExecError::Validation {
            tool: "click".to_string(),
            errors: vec!["missing target".to_string()],
        };
        assert_eq!(engine.handle(&err, ExecutorPhase::Act), RecoveryAction::Recover);
        let err = ExecError::PredicateFailure("url_contains /dashboard".to_string());
        assert_eq!(engine.handle(&err, ExecutorPhase::Verify), RecoveryAction::Retry);
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&ExecError::Cancelled, ExecutorPhase::Decide),
            RecoveryAction::Escalate
        );
    }
}

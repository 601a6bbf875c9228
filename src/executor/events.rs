//! 执行循环过程事件：阶段切换、遮挡处理、提议、动作、校验与结果，可序列化为 JSON 供外部展示

use serde::Serialize;
use serde_json::Value;

use crate::core::{ExecutorPhase, FailureReason};
use crate::executor::SubgoalStatus;
use crate::interrupt::{BlockerKind, ResolveOutcome};
use crate::oracle::MatchStrategy;
use crate::snapshot::StableRef;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorEvent {
    /// 进入新阶段（step 为本子目标内的转移计数）
    PhaseChanged { phase: ExecutorPhase, step: usize },
    /// 一次成功观察写入 State Store
    Observed {
        version: u64,
        url: String,
        elements: usize,
    },
    /// OBSERVE 失败，退避后重试
    ObserveRetry {
        attempt: u32,
        backoff_ms: u64,
        reason: String,
    },
    /// PRE_CHECK 处理了一个遮挡层
    Blocker {
        blocker_ref: StableRef,
        kind: BlockerKind,
        outcome: ResolveOutcome,
    },
    /// oracle 的提议（未经校验）
    Proposal { tool: String, args: Value },
    /// 提议引用已过期或无效，未执行 ACT
    StaleRefRejected { reference: String, current_version: u64 },
    /// ACT 成功发送一次工具调用
    ToolCall {
        tool: String,
        args: Value,
        repair_attempts: u32,
    },
    /// 成功谓词求值结果
    Verify { passed: bool, predicate: String },
    /// 进入恢复，切换匹配策略
    Recover {
        attempt: u32,
        strategy: MatchStrategy,
        cause: FailureReason,
    },
    /// 子目标结束
    Finished {
        subgoal_id: String,
        status: SubgoalStatus,
        version: u64,
    },
}

//! 决策 oracle 边界：给定子目标与结构化索引，提议一次 (工具, 参数)
//!
//! oracle 的输出一律视为不可信输入：形状由 Tool Registry 校验，引用由 State Store 校验。

pub mod llm;
pub mod parse;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::memory::MemoryHint;
use crate::snapshot::{PageMetadata, StructuredIndex};
use crate::tools::ToolCall;

pub use llm::LlmOracle;
pub use parse::parse_proposal;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("unparsable proposal: {0}")]
    Parse(String),

    #[error("no tool call in response: {0}")]
    NoProposal(String),
}

/// 元素匹配策略；RECOVER 每次切换到下一个
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    #[default]
    RoleAndName,
    VisibleText,
    Structural,
}

impl MatchStrategy {
    /// RoleAndName -> VisibleText -> Structural -> RoleAndName
    pub fn next(self) -> Self {
        match self {
            MatchStrategy::RoleAndName => MatchStrategy::VisibleText,
            MatchStrategy::VisibleText => MatchStrategy::Structural,
            MatchStrategy::Structural => MatchStrategy::RoleAndName,
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            MatchStrategy::RoleAndName => "Match the target element by its role and accessible name.",
            MatchStrategy::VisibleText => {
                "Earlier attempts failed. Match the target by its visible text or label, not its accessible name."
            }
            MatchStrategy::Structural => {
                "Earlier attempts failed. Use page structure: prefer the submit control of the relevant form, \
                 or an element inside the same section or list item as the expected content."
            }
        }
    }
}

/// 一次 DECIDE 的输入（只含结构化索引，不含原始快照）
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub subgoal: String,
    pub version: u64,
    pub index: StructuredIndex,
    pub metadata: PageMetadata,
    /// 建议性提示，只能用于排序，不能作为目标
    pub hints: Vec<MemoryHint>,
    /// 本子目标内已执行过的动作
    pub recent_attempts: Vec<String>,
    pub failure_notes: Vec<String>,
    pub strategy: MatchStrategy,
}

/// oracle 的提议
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub call: ToolCall,
    pub rationale: Option<String>,
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn propose(&self, ctx: &DecisionContext) -> Result<Proposal, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_cycles() {
        let s = MatchStrategy::default();
        assert_eq!(s, MatchStrategy::RoleAndName);
        assert_eq!(s.next(), MatchStrategy::VisibleText);
        assert_eq!(s.next().next(), MatchStrategy::Structural);
        assert_eq!(s.next().next().next(), MatchStrategy::RoleAndName);
    }
}

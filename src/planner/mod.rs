//! Planner 边界：目标 -> 有序子目标，每个子目标带可机械检查的成功谓词

pub mod llm;
pub mod predicate;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use llm::{LlmPlanner, TaskPlan, TaskSpec};
pub use predicate::SuccessPredicate;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("unparsable plan: {0}")]
    Parse(String),

    #[error("invalid plan: {0}")]
    Invalid(String),

    #[error("plan contains no subgoals")]
    Empty,
}

/// 一个意图级工作单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgoal {
    pub id: String,
    pub description: String,
    pub success: SuccessPredicate,
}

impl Subgoal {
    pub fn new(id: impl Into<String>, description: impl Into<String>, success: SuccessPredicate) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            success,
        }
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// context 为重新规划时附带的失败信息
    async fn plan(&self, goal: &str, context: Option<&str>) -> Result<Vec<Subgoal>, PlanError>;
}

/// 固定子目标列表（测试与脚本场景）
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    subgoals: Vec<Subgoal>,
}

impl StaticPlanner {
    pub fn new(subgoals: Vec<Subgoal>) -> Self {
        Self { subgoals }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _goal: &str, _context: Option<&str>) -> Result<Vec<Subgoal>, PlanError> {
        if self.subgoals.is_empty() {
            return Err(PlanError::Empty);
        }
        for s in &self.subgoals {
            s.success.validate()?;
        }
        Ok(self.subgoals.clone())
    }
}

//! 基于 LLM 的 Planner：让模型输出 JSON 任务计划，done_when 直接是声明式谓词

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{LlmClient, Message};
use crate::oracle::parse::extract_json;
use crate::planner::{PlanError, Planner, Subgoal, SuccessPredicate};

const PLANNER_PROMPT: &str = "You are a planner. Convert the user's goal into an ordered list of small tasks \
for a web automation executor. Do not mention tools, selectors, element references or code.\n\
Rules:\n\
- Each task must be completable in one to three page actions.\n\
- Tasks are ordered and never duplicated.\n\
- Every task has at least one done_when check, and each check describes an observable page state \
(URL, title, an element being present or absent, visible text), never an action.\n\
- needs lists required inputs; use \"<from user>\" when unknown.\n\
- completion_definition holds one to three high-level stop conditions for the whole goal.\n\
Reply with a single JSON object matching this schema:\n";

/// 计划中的单个任务
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskSpec {
    pub id: String,
    /// 祈使句形式的简短任务
    pub task: String,
    pub done_when: Vec<SuccessPredicate>,
    #[serde(default)]
    pub needs: BTreeMap<String, Value>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// LLM 输出的完整计划
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskPlan {
    pub goal: String,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub completion_definition: Vec<String>,
}

impl TaskPlan {
    /// 转为子目标；多个 done_when 合并为 all_of
    pub fn into_subgoals(self) -> Result<Vec<Subgoal>, PlanError> {
        if self.tasks.is_empty() {
            return Err(PlanError::Empty);
        }
        self.tasks
            .into_iter()
            .map(|t| {
                let success = match t.done_when.len() {
                    0 => {
                        return Err(PlanError::Invalid(format!("task {} has no done_when", t.id)));
                    }
                    1 => t.done_when.into_iter().next().ok_or(PlanError::Empty)?,
                    _ => SuccessPredicate::AllOf {
                        predicates: t.done_when,
                    },
                };
                success.validate()?;

                let mut description = t.task;
                if !t.needs.is_empty() {
                    let needs: Vec<String> = t
                        .needs
                        .iter()
                        .map(|(k, v)| match v {
                            Value::String(s) => format!("{k}={s}"),
                            other => format!("{k}={other}"),
                        })
                        .collect();
                    description.push_str(&format!(" (inputs: {})", needs.join(", ")));
                }
                if !t.notes.is_empty() {
                    description.push_str(&format!(" (notes: {})", t.notes.join("; ")));
                }
                Ok(Subgoal::new(t.id, description, success))
            })
            .collect()
    }
}

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        let schema = serde_json::to_string_pretty(&schema_for!(TaskPlan)).unwrap_or_default();
        Self {
            llm,
            system_prompt: format!("{PLANNER_PROMPT}{schema}"),
        }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, goal: &str, context: Option<&str>) -> Result<Vec<Subgoal>, PlanError> {
        let user = format!(
            "Goal:\n{}\n\nContext (may be empty):\n{}",
            goal.trim(),
            context.unwrap_or("(none)")
        );
        let messages = [Message::system(self.system_prompt.clone()), Message::user(user)];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| PlanError::Llm(e.to_string()))?;
        let json = extract_json(&output).ok_or_else(|| PlanError::Parse("no JSON in planner output".to_string()))?;
        let plan: TaskPlan = serde_json::from_str(json).map_err(|e| PlanError::Parse(e.to_string()))?;
        tracing::info!(goal = %plan.goal, tasks = plan.tasks.len(), "plan created");
        plan.into_subgoals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    const PLAN: &str = r#"Here is the plan:
```json
{
  "goal": "Open the Test Panel",
  "tasks": [
    {"id": "T1", "task": "Go to the panels list",
     "done_when": [{"type": "url_contains", "value": "/panels"}]},
    {"id": "T2", "task": "Find the panel named Test Panel",
     "done_when": [{"type": "text_visible", "text": "Test Panel"},
                   {"type": "element_present", "role": "link", "name": "Test Panel"}],
     "needs": {"panel_name": "Test Panel"},
     "notes": ["names are case sensitive"]}
  ],
  "completion_definition": ["The Test Panel page is open"]
}
```"#;

    #[tokio::test]
    async fn test_llm_planner_builds_subgoals() {
        let llm = Arc::new(MockLlmClient::scripted([PLAN]));
        let planner = LlmPlanner::new(llm.clone());
        let subgoals = planner.plan("Open the Test Panel", None).await.unwrap();
        assert_eq!(subgoals.len(), 2);
        assert_eq!(subgoals[0].success, SuccessPredicate::url_contains("/panels"));
        assert!(matches!(subgoals[1].success, SuccessPredicate::AllOf { .. }));
        assert!(subgoals[1].description.contains("panel_name=Test Panel"));
        assert!(subgoals[1].description.contains("case sensitive"));

        let system = &llm.requests()[0][0].content;
        assert!(system.contains("done_when"));
    }

    #[tokio::test]
    async fn test_llm_planner_rejects_task_without_checks() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"goal": "g", "tasks": [{"id": "T1", "task": "do it", "done_when": []}]}"#,
        ]));
        let err = LlmPlanner::new(llm).plan("g", None).await.unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_llm_planner_parse_error() {
        let llm = Arc::new(MockLlmClient::scripted(["I cannot help"]));
        let err = LlmPlanner::new(llm).plan("g", Some("previous failure")).await.unwrap_err();
        assert!(matches!(err, PlanError::Parse(_)));
    }
}

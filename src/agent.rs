//! 顶层 Agent：规划 → 按序执行子目标 → 遇到 ESCALATE 停止，可带失败原因重新规划
//!
//! create_agent 从配置构建 Registry / LLM / Planner / Oracle / Memory Store / Executor，
//! Agent::run 对一个目标返回 AgentReport（永远是类型化报告，执行失败不以错误返回）。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::{FailureKind, FailureReason, StateStore};
use crate::executor::{Executor, ExecutorEvent, SubgoalOutcome, SubgoalStatus};
use crate::llm::{LlmClient, OpenAiClient};
use crate::memory::{HintStore, InMemoryHintStore, NoopHintStore};
use crate::oracle::LlmOracle;
use crate::planner::{LlmPlanner, PlanError, Planner, Subgoal};
use crate::snapshot::StructuredIndex;
use crate::tools::{RegistryError, ToolRegistry};
use crate::transport::Transport;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Planning failed: {0}")]
    Plan(#[from] PlanError),
}

/// 单个子目标的报告
#[derive(Debug, Clone, Serialize)]
pub struct SubgoalReport {
    pub subgoal_id: String,
    pub description: String,
    pub status: SubgoalStatus,
    pub final_version: u64,
    pub final_index: StructuredIndex,
    pub failure_reason: Option<FailureReason>,
    pub steps: usize,
}

impl SubgoalReport {
    fn new(subgoal: &Subgoal, outcome: SubgoalOutcome) -> Self {
        Self {
            subgoal_id: outcome.subgoal_id,
            description: subgoal.description.clone(),
            status: outcome.status,
            final_version: outcome.final_version,
            final_index: outcome.final_index,
            failure_reason: outcome.failure_reason,
            steps: outcome.steps,
        }
    }
}

/// 一次目标运行的完整报告
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub run_id: String,
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub replans: u32,
    pub subgoals: Vec<SubgoalReport>,
}

impl AgentReport {
    /// 最后一个子目标完成即视为成功
    pub fn succeeded(&self) -> bool {
        self.subgoals
            .last()
            .map_or(false, |s| s.status == SubgoalStatus::Done)
    }
}

pub struct Agent {
    planner: Arc<dyn Planner>,
    executor: Executor,
    max_replans: u32,
    plan_timeout: Duration,
    cancel: CancellationToken,
    event_tx: Option<UnboundedSender<ExecutorEvent>>,
}

impl Agent {
    pub fn new(planner: Arc<dyn Planner>, executor: Executor) -> Self {
        Self {
            planner,
            executor,
            max_replans: 1,
            plan_timeout: Duration::from_secs(60),
            cancel: CancellationToken::new(),
            event_tx: None,
        }
    }

    pub fn with_max_replans(mut self, max_replans: u32) -> Self {
        self.max_replans = max_replans;
        self
    }

    pub fn with_plan_timeout(mut self, timeout: Duration) -> Self {
        self.plan_timeout = timeout;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ExecutorEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// 取消令牌（Ctrl-C 等外部信号调用 cancel()）
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn plan(&self, goal: &str, context: Option<&str>) -> Result<Vec<Subgoal>, PlanError> {
        tokio::time::timeout(self.plan_timeout, self.planner.plan(goal, context))
            .await
            .map_err(|_| PlanError::Llm(format!("planner timed out after {:?}", self.plan_timeout)))?
    }

    /// 首次规划失败返回错误；之后的一切失败都体现在报告里
    pub async fn run(&self, goal: &str) -> Result<AgentReport, AgentError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, goal = %goal, "run started");

        let mut subgoals = self.plan(goal, None).await?;
        let mut reports: Vec<SubgoalReport> = Vec::new();
        let mut replans = 0;

        loop {
            let mut escalated: Option<(Subgoal, FailureReason)> = None;
            for subgoal in &subgoals {
                let outcome = self
                    .executor
                    .run_subgoal(subgoal, &self.cancel, self.event_tx.as_ref())
                    .await;
                let failure = outcome.failure_reason.clone();
                reports.push(SubgoalReport::new(subgoal, outcome));
                if let Some(reason) = failure {
                    escalated = Some((subgoal.clone(), reason));
                    break;
                }
            }

            let Some((failed, reason)) = escalated else {
                break;
            };
            if replans >= self.max_replans || reason.kind == FailureKind::Cancelled {
                break;
            }
            replans += 1;
            let context = self.replan_context(&reports, &failed, &reason);
            tracing::warn!(run_id = %run_id, subgoal = %failed.id, replans, "re-planning after escalation");
            match self.plan(goal, Some(&context)).await {
                Ok(next) => subgoals = next,
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "re-planning failed");
                    break;
                }
            }
        }

        let report = AgentReport {
            run_id,
            goal: goal.to_string(),
            started_at,
            finished_at: Utc::now(),
            replans,
            subgoals: reports,
        };
        tracing::info!(
            run_id = %report.run_id,
            succeeded = report.succeeded(),
            subgoals = report.subgoals.len(),
            "run finished"
        );
        Ok(report)
    }

    fn replan_context(&self, reports: &[SubgoalReport], failed: &Subgoal, reason: &FailureReason) -> String {
        let state = self.executor.store().current();
        let done: Vec<&str> = reports
            .iter()
            .filter(|r| r.status == SubgoalStatus::Done)
            .map(|r| r.description.as_str())
            .collect();
        format!(
            "Completed so far: {}\nFailed subgoal: {} ({})\nReason: {}\nCurrent page: {} ({})",
            if done.is_empty() { "(none)".to_string() } else { done.join("; ") },
            failed.id,
            failed.description,
            reason,
            state.metadata.url,
            state.metadata.title
        )
    }
}

/// 从配置构建 Agent：OpenAI 兼容 LLM 同时驱动 Planner 与 Oracle
pub fn create_agent(cfg: &AppConfig, transport: Arc<dyn Transport>) -> Result<Agent, AgentError> {
    let registry = Arc::new(ToolRegistry::load(cfg.registry.catalog_path.as_deref())?);
    tracing::info!(
        provider = %cfg.llm.provider,
        model = %cfg.llm.model,
        tools = registry.list().len(),
        "building agent"
    );
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::from_config(&cfg.llm));

    let planner = Arc::new(LlmPlanner::new(llm.clone()));
    let oracle = Arc::new(LlmOracle::new(llm, &registry).with_limits(cfg.snapshot.trim_limits()));
    let hints: Arc<dyn HintStore> = if cfg.memory.max_hints > 0 {
        Arc::new(InMemoryHintStore::new(cfg.memory.max_hints))
    } else {
        Arc::new(NoopHintStore)
    };
    let store = Arc::new(StateStore::new(cfg.executor.diff_log_capacity));
    let executor = Executor::new(transport, registry, oracle, store, cfg.executor.clone())
        .with_index_budget(cfg.snapshot.index_budget())
        .with_hints(hints);

    Ok(Agent::new(planner, executor)
        .with_max_replans(cfg.agent.max_replans)
        .with_plan_timeout(Duration::from_secs(cfg.llm.timeouts.request)))
}

//! Executor 主循环：OBSERVE → PRE_CHECK → DECIDE → ACT → VERIFY → {DONE | RETRY | RECOVER | ESCALATE}
//!
//! 每个阶段是 `Phase` 的一个值，重试 / 重决策 / 遮挡迭代计数放在阶段值里，
//! 校验重试与恢复次数放在 `Budgets` 里；没有递归，`max_steps` 兜底所有转移。
//! 失败不会以错误形式越过 Executor 边界，结果总是 `SubgoalOutcome`。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::ExecutorConfig;
use crate::core::{
    ExecError, ExecutorPhase, FailureKind, FailureReason, RecoveryAction, RecoveryEngine, StateStore,
};
use crate::executor::ExecutorEvent;
use crate::interrupt::{InterruptionHandler, ResolveOutcome};
use crate::memory::{HintStore, LearnedMapping, NoopHintStore, WorkingMemory};
use crate::oracle::{DecisionContext, DecisionOracle, MatchStrategy};
use crate::planner::Subgoal;
use crate::snapshot::{IndexBudget, SnapshotProcessor, StableRef, StructuredIndex};
use crate::tools::{ActPipeline, ActReceipt, ToolCall, ToolExecutor, ToolRegistry};
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubgoalStatus {
    Done,
    Escalate,
}

/// 单个子目标的执行结果
#[derive(Debug, Clone, Serialize)]
pub struct SubgoalOutcome {
    pub subgoal_id: String,
    pub status: SubgoalStatus,
    pub final_version: u64,
    pub final_index: StructuredIndex,
    pub failure_reason: Option<FailureReason>,
    pub steps: usize,
    /// 依次进入过的阶段（含终止阶段）
    pub trace: Vec<ExecutorPhase>,
}

impl SubgoalOutcome {
    pub fn is_done(&self) -> bool {
        self.status == SubgoalStatus::Done
    }
}

/// OBSERVE 成功后的去向
#[derive(Debug, Clone)]
enum AfterObserve {
    PreCheck {
        iteration: u32,
        skip: HashSet<StableRef>,
        stale_redecides: u32,
    },
    Verify,
}

impl AfterObserve {
    fn fresh() -> Self {
        AfterObserve::PreCheck {
            iteration: 0,
            skip: HashSet::new(),
            stale_redecides: 0,
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Observe {
        attempt: u32,
        then: AfterObserve,
    },
    /// skip：本轮已忽略或关闭失败的遮挡层
    PreCheck {
        iteration: u32,
        skip: HashSet<StableRef>,
        stale_redecides: u32,
    },
    Decide {
        stale_redecides: u32,
    },
    Act {
        call: ToolCall,
        stale_redecides: u32,
    },
    Verify,
    Retry,
    Recover {
        cause: FailureReason,
    },
    Done,
    Escalate {
        reason: FailureReason,
    },
}

impl Phase {
    fn kind(&self) -> ExecutorPhase {
        match self {
            Phase::Observe { .. } => ExecutorPhase::Observe,
            Phase::PreCheck { .. } => ExecutorPhase::PreCheck,
            Phase::Decide { .. } => ExecutorPhase::Decide,
            Phase::Act { .. } => ExecutorPhase::Act,
            Phase::Verify => ExecutorPhase::Verify,
            Phase::Retry => ExecutorPhase::Retry,
            Phase::Recover { .. } => ExecutorPhase::Recover,
            Phase::Done => ExecutorPhase::Done,
            Phase::Escalate { .. } => ExecutorPhase::Escalate,
        }
    }

    fn escalate(err: &ExecError, phase: ExecutorPhase) -> Self {
        Phase::Escalate {
            reason: FailureReason::from_error(err, phase),
        }
    }
}

/// 子目标级预算（阶段值之外的计数）
#[derive(Debug, Clone, Copy, Default)]
struct Budgets {
    steps: usize,
    verify_retries: u32,
    recover_attempts: u32,
}

/// 单个子目标运行期间的可变上下文
struct Run<'a> {
    subgoal: &'a Subgoal,
    events: Option<&'a UnboundedSender<ExecutorEvent>>,
    working: WorkingMemory,
    strategy: MatchStrategy,
    budgets: Budgets,
    /// 本次 OBSERVE 之前的索引，供遮挡扫描判断「新出现」
    previous_index: Option<StructuredIndex>,
    last_receipt: Option<ActReceipt>,
    trace: Vec<ExecutorPhase>,
}

impl Run<'_> {
    fn emit(&self, ev: ExecutorEvent) {
        if let Some(tx) = self.events {
            let _ = tx.send(ev);
        }
    }
}

pub struct Executor {
    transport: Arc<dyn Transport>,
    processor: SnapshotProcessor,
    store: Arc<StateStore>,
    actor: ActPipeline,
    oracle: Arc<dyn DecisionOracle>,
    interrupts: InterruptionHandler,
    hints: Arc<dyn HintStore>,
    recovery: RecoveryEngine,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<ToolRegistry>,
        oracle: Arc<dyn DecisionOracle>,
        store: Arc<StateStore>,
        config: ExecutorConfig,
    ) -> Self {
        let tool_executor = ToolExecutor::new(transport.clone(), config.transport_timeout_ms);
        let actor = ActPipeline::new(registry, tool_executor, store.clone(), config.max_repair_attempts);
        Self {
            processor: SnapshotProcessor::new(store.clock(), IndexBudget::default()),
            transport,
            store,
            actor,
            oracle,
            interrupts: InterruptionHandler::default(),
            hints: Arc::new(NoopHintStore),
            recovery: RecoveryEngine::new(),
            config,
        }
    }

    pub fn with_index_budget(mut self, budget: IndexBudget) -> Self {
        self.processor =
            SnapshotProcessor::new(self.store.clock(), budget).with_classifier(self.interrupts.classifier());
        self
    }

    /// 同一个分类器也用于裁剪时保护遮挡层
    pub fn with_interruption_handler(mut self, handler: InterruptionHandler) -> Self {
        self.processor = self.processor.clone().with_classifier(handler.classifier());
        self.interrupts = handler;
        self
    }

    pub fn with_hints(mut self, hints: Arc<dyn HintStore>) -> Self {
        self.hints = hints;
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// 执行一个子目标直到 DONE 或 ESCALATE
    pub async fn run_subgoal(
        &self,
        subgoal: &Subgoal,
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<ExecutorEvent>>,
    ) -> SubgoalOutcome {
        let mut working = WorkingMemory::new();
        working.set_goal(subgoal.description.clone());
        let mut run = Run {
            subgoal,
            events: event_tx,
            working,
            strategy: MatchStrategy::default(),
            budgets: Budgets::default(),
            previous_index: None,
            last_receipt: None,
            trace: Vec::new(),
        };
        tracing::info!(subgoal = %subgoal.id, description = %subgoal.description, "subgoal started");

        let mut phase = Phase::Observe {
            attempt: 0,
            then: AfterObserve::fresh(),
        };
        let failure = loop {
            let kind = phase.kind();
            run.trace.push(kind);
            if !matches!(phase, Phase::Done | Phase::Escalate { .. }) {
                if cancel.is_cancelled() {
                    phase = Phase::escalate(&ExecError::Cancelled, kind);
                    continue;
                }
                if run.budgets.steps >= self.config.max_steps {
                    phase = Phase::Escalate {
                        reason: FailureReason::new(
                            FailureKind::StepLimit,
                            kind,
                            format!("step limit {} reached", self.config.max_steps),
                        ),
                    };
                    continue;
                }
                run.budgets.steps += 1;
                tracing::info!(subgoal = %subgoal.id, phase = %kind, step = run.budgets.steps, "phase");
                run.emit(ExecutorEvent::PhaseChanged {
                    phase: kind,
                    step: run.budgets.steps,
                });
            }

            phase = match phase {
                Phase::Done => break None,
                Phase::Escalate { reason } => break Some(reason),
                Phase::Observe { attempt, then } => self.observe(&mut run, attempt, then, cancel).await,
                Phase::PreCheck {
                    iteration,
                    skip,
                    stale_redecides,
                } => self.pre_check(&mut run, iteration, skip, stale_redecides).await,
                Phase::Decide { stale_redecides } => self.decide(&mut run, stale_redecides, cancel).await,
                Phase::Act {
                    call,
                    stale_redecides,
                } => self.act(&mut run, call, stale_redecides).await,
                Phase::Verify => self.verify(&mut run),
                Phase::Retry => Phase::PreCheck {
                    iteration: 0,
                    skip: HashSet::new(),
                    stale_redecides: 0,
                },
                Phase::Recover { cause } => self.recover(&mut run, cause),
            };
        };

        self.finish(run, failure)
    }

    async fn observe(&self, run: &mut Run<'_>, attempt: u32, then: AfterObserve, cancel: &CancellationToken) -> Phase {
        let err = match self.observe_once(run, cancel).await {
            Ok(()) => {
                return match then {
                    AfterObserve::PreCheck {
                        iteration,
                        skip,
                        stale_redecides,
                    } => Phase::PreCheck {
                        iteration,
                        skip,
                        stale_redecides,
                    },
                    AfterObserve::Verify => Phase::Verify,
                }
            }
            Err(err) => err,
        };

        match self.recovery.handle(&err, ExecutorPhase::Observe) {
            RecoveryAction::RetryObserve if attempt < self.config.observe_retries => {
                let backoff_ms = self.config.observe_backoff(attempt);
                tracing::warn!(attempt = attempt + 1, backoff_ms, error = %err, "observe failed, retrying");
                run.emit(ExecutorEvent::ObserveRetry {
                    attempt: attempt + 1,
                    backoff_ms,
                    reason: err.to_string(),
                });
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Phase::escalate(&ExecError::Cancelled, ExecutorPhase::Observe);
                    }
                    _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                }
                Phase::Observe {
                    attempt: attempt + 1,
                    then,
                }
            }
            RecoveryAction::RetryObserve => Phase::Escalate {
                reason: FailureReason::new(
                    FailureKind::from(&err),
                    ExecutorPhase::Observe,
                    format!("observe failed after {} attempts: {}", attempt + 1, err),
                ),
            },
            _ => Phase::escalate(&err, ExecutorPhase::Observe),
        }
    }

    /// transport observe（带超时）→ processor → store update；失败时 State Store 不变
    async fn observe_once(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> Result<(), ExecError> {
        let after_ms = self.config.transport_timeout_ms;
        let raw = tokio::select! {
            _ = cancel.cancelled() => return Err(ExecError::Cancelled),
            r = tokio::time::timeout(Duration::from_millis(after_ms), self.transport.observe()) => match r {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => return Err(ExecError::Transport(e.to_string())),
                Err(_) => {
                    return Err(ExecError::Timeout {
                        phase: ExecutorPhase::Observe,
                        after_ms,
                    })
                }
            },
        };
        let (snapshot, index, metadata) = self.processor.process(&raw)?;
        let elements = index.elements.len();
        let url = metadata.url.clone();

        let previous = self.store.current();
        let version = self.store.update(snapshot, index, metadata);
        run.previous_index = (previous.version > 0).then(|| previous.index.clone());
        run.emit(ExecutorEvent::Observed { version, url, elements });
        Ok(())
    }

    async fn pre_check(
        &self,
        run: &mut Run<'_>,
        iteration: u32,
        mut skip: HashSet<StableRef>,
        stale_redecides: u32,
    ) -> Phase {
        let state = self.store.current();
        let candidates = self.interrupts.scan(&state.index, run.previous_index.as_ref());
        let Some(blocker) = self.interrupts.next_actionable(&candidates, &skip).cloned() else {
            return Phase::Decide { stale_redecides };
        };
        if iteration >= self.config.max_precheck_iterations {
            let err = ExecError::BlockerUnresolved(iteration);
            tracing::warn!(blocker = %blocker.blocker_ref, "{}", err);
            return Phase::Recover {
                cause: FailureReason::from_error(&err, ExecutorPhase::PreCheck),
            };
        }

        let outcome = self.interrupts.resolve(&blocker, state.version, &self.actor).await;
        run.emit(ExecutorEvent::Blocker {
            blocker_ref: blocker.blocker_ref.clone(),
            kind: blocker.kind,
            outcome: outcome.clone(),
        });
        match outcome {
            ResolveOutcome::Dismissed => Phase::Observe {
                attempt: 0,
                then: AfterObserve::PreCheck {
                    iteration: iteration + 1,
                    skip,
                    stale_redecides,
                },
            },
            ResolveOutcome::Ignored => {
                skip.insert(blocker.blocker_ref);
                Phase::PreCheck {
                    iteration,
                    skip,
                    stale_redecides,
                }
            }
            ResolveOutcome::Failed(message) => {
                run.working.add_failure(format!(
                    "could not dismiss {:?} {}: {}",
                    blocker.kind, blocker.blocker_ref, message
                ));
                skip.insert(blocker.blocker_ref);
                Phase::Observe {
                    attempt: 0,
                    then: AfterObserve::PreCheck {
                        iteration: iteration + 1,
                        skip,
                        stale_redecides,
                    },
                }
            }
        }
    }

    async fn decide(&self, run: &mut Run<'_>, stale_redecides: u32, cancel: &CancellationToken) -> Phase {
        let state = self.store.current();
        let ctx = DecisionContext {
            subgoal: run.subgoal.description.clone(),
            version: state.version,
            index: state.index.clone(),
            metadata: state.metadata.clone(),
            hints: self.hints.top_k(&run.subgoal.description, self.config.memory_hints_k),
            recent_attempts: run.working.attempts.clone(),
            failure_notes: run.working.recent_failures(self.config.failure_notes_k),
            strategy: run.strategy,
        };

        let after_ms = self.config.oracle_timeout_ms;
        let proposal = tokio::select! {
            _ = cancel.cancelled() => Err(ExecError::Cancelled),
            r = tokio::time::timeout(Duration::from_millis(after_ms), self.oracle.propose(&ctx)) => match r {
                Ok(Ok(p)) => Ok(p),
                Ok(Err(e)) => Err(ExecError::Oracle(e.to_string())),
                Err(_) => Err(ExecError::Timeout {
                    phase: ExecutorPhase::Decide,
                    after_ms,
                }),
            },
        };
        let proposal = match proposal {
            Ok(p) => p,
            Err(err) => return self.on_error(run, err, ExecutorPhase::Decide, stale_redecides),
        };

        tracing::info!(
            version = state.version,
            tool = %proposal.call.tool,
            args = %proposal.call.args,
            rationale = proposal.rationale.as_deref().unwrap_or(""),
            "proposal"
        );
        run.emit(ExecutorEvent::Proposal {
            tool: proposal.call.tool.clone(),
            args: proposal.call.args.clone(),
        });

        match self.actor.resolve_refs(&proposal.call.tool, &proposal.call.args) {
            Ok(_) => Phase::Act {
                call: proposal.call,
                stale_redecides,
            },
            Err(err) => self.on_error(run, err, ExecutorPhase::Decide, stale_redecides),
        }
    }

    async fn act(&self, run: &mut Run<'_>, call: ToolCall, stale_redecides: u32) -> Phase {
        let prepared = match self.actor.prepare(&call) {
            Ok(p) => p,
            Err(err) => return self.on_error(run, err, ExecutorPhase::Act, stale_redecides),
        };
        match self.actor.dispatch(prepared).await {
            Ok(receipt) => {
                let attempt = &receipt.attempt;
                run.working
                    .add_attempt(format!("{} {} -> ok", attempt.tool_name, attempt.arguments));
                run.emit(ExecutorEvent::ToolCall {
                    tool: attempt.tool_name.clone(),
                    args: attempt.arguments.clone(),
                    repair_attempts: attempt.repair_attempts,
                });
                run.last_receipt = Some(receipt);
                Phase::Observe {
                    attempt: 0,
                    then: AfterObserve::Verify,
                }
            }
            Err(err) => {
                run.working.add_attempt(format!("{} {} -> {}", call.tool, call.args, err));
                self.on_error(run, err, ExecutorPhase::Act, stale_redecides)
            }
        }
    }

    /// 成功谓词只看 State Store 中的最新索引，不调用 oracle
    fn verify(&self, run: &mut Run<'_>) -> Phase {
        let state = self.store.current();
        let predicate = &run.subgoal.success;
        let passed = predicate.evaluate(&state.metadata, &state.index);
        tracing::info!(version = state.version, passed, predicate = %predicate.describe(), "verify");
        run.emit(ExecutorEvent::Verify {
            passed,
            predicate: predicate.describe(),
        });
        if passed {
            return Phase::Done;
        }

        let err = ExecError::PredicateFailure(predicate.describe());
        match self.recovery.handle(&err, ExecutorPhase::Verify) {
            RecoveryAction::Retry if run.budgets.verify_retries < self.config.max_verify_retries => {
                run.budgets.verify_retries += 1;
                run.working
                    .add_failure(format!("last action did not satisfy: {}", predicate.describe()));
                Phase::Retry
            }
            _ => Phase::Recover {
                cause: FailureReason::from_error(&err, ExecutorPhase::Verify),
            },
        }
    }

    /// 换一种匹配策略，带着新的校验重试预算从 OBSERVE 重新开始
    fn recover(&self, run: &mut Run<'_>, cause: FailureReason) -> Phase {
        if run.budgets.recover_attempts >= self.config.max_recover_attempts {
            tracing::warn!(subgoal = %run.subgoal.id, cause = %cause, "recovery exhausted");
            return Phase::Escalate {
                reason: FailureReason::new(
                    cause.kind,
                    cause.phase,
                    format!(
                        "recovery exhausted after {} attempts: {}",
                        run.budgets.recover_attempts, cause.message
                    ),
                ),
            };
        }
        run.budgets.recover_attempts += 1;
        run.budgets.verify_retries = 0;
        run.strategy = run.strategy.next();
        run.working.add_failure(cause.to_string());
        tracing::warn!(
            attempt = run.budgets.recover_attempts,
            strategy = ?run.strategy,
            cause = %cause,
            "recovering"
        );
        run.emit(ExecutorEvent::Recover {
            attempt: run.budgets.recover_attempts,
            strategy: run.strategy,
            cause,
        });
        Phase::Observe {
            attempt: 0,
            then: AfterObserve::fresh(),
        }
    }

    /// DECIDE / ACT 阶段的错误交给 RecoveryEngine 折算为转移
    fn on_error(&self, run: &mut Run<'_>, err: ExecError, phase: ExecutorPhase, stale_redecides: u32) -> Phase {
        match self.recovery.handle(&err, phase) {
            RecoveryAction::Redecide(note) => {
                if let ExecError::StaleRef {
                    reference,
                    current_version,
                } = &err
                {
                    run.emit(ExecutorEvent::StaleRefRejected {
                        reference: reference.clone(),
                        current_version: *current_version,
                    });
                }
                if stale_redecides >= self.config.max_stale_redecides {
                    tracing::warn!(phase = %phase, error = %err, "stale reference budget exhausted");
                    return Phase::Recover {
                        cause: FailureReason::from_error(&err, phase),
                    };
                }
                tracing::info!(phase = %phase, error = %err, "reference rejected, deciding again");
                run.working.add_failure(note);
                Phase::PreCheck {
                    iteration: 0,
                    skip: HashSet::new(),
                    stale_redecides: stale_redecides + 1,
                }
            }
            RecoveryAction::Escalate => Phase::escalate(&err, phase),
            RecoveryAction::RetryObserve | RecoveryAction::Retry | RecoveryAction::Recover => {
                tracing::warn!(phase = %phase, error = %err, "entering recovery");
                Phase::Recover {
                    cause: FailureReason::from_error(&err, phase),
                }
            }
        }
    }

    fn finish(&self, run: Run<'_>, failure: Option<FailureReason>) -> SubgoalOutcome {
        let state = self.store.current();
        let status = if failure.is_none() {
            self.learn(&run);
            SubgoalStatus::Done
        } else {
            SubgoalStatus::Escalate
        };
        match &failure {
            None => tracing::info!(subgoal = %run.subgoal.id, version = state.version, steps = run.budgets.steps, "subgoal done"),
            Some(reason) => tracing::warn!(subgoal = %run.subgoal.id, reason = %reason, "subgoal escalated"),
        }
        run.emit(ExecutorEvent::Finished {
            subgoal_id: run.subgoal.id.clone(),
            status,
            version: state.version,
        });
        SubgoalOutcome {
            subgoal_id: run.subgoal.id.clone(),
            status,
            final_version: state.version,
            final_index: state.index.clone(),
            failure_reason: failure,
            steps: run.budgets.steps,
            trace: run.trace,
        }
    }

    /// 记录「工具 + 角色 + 名称」映射，不记录引用
    fn learn(&self, run: &Run<'_>) {
        if !self.hints.enabled() {
            return;
        }
        let Some(receipt) = &run.last_receipt else {
            return;
        };
        let Some(record) = receipt.target_records.first() else {
            return;
        };
        let Some(name) = record.name.clone().or_else(|| record.visible_text.clone()) else {
            return;
        };
        self.hints.record_success(
            &run.subgoal.description,
            &LearnedMapping {
                tool: receipt.attempt.tool_name.clone(),
                role: record.role.clone(),
                name,
            },
        );
    }
}

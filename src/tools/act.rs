//! Act 路径：Validate -> Repair -> 解析元素引用 -> 发送前再次校验版本 -> 执行一次调用
//!
//! Executor 的 ACT 阶段与 Interruption Handler 的关闭动作都走这里，
//! 因此任何到达 Transport 的引用都经过 `StateStore::resolve`。

use std::sync::Arc;

use serde_json::Value;

use crate::core::{ElementRef, ExecError, StateStore, ValidatedRef};
use crate::snapshot::ElementRecord;
use crate::tools::{ToolCall, ToolCallAttempt, ToolExecutor, ToolRegistry};

/// 已通过校验、引用已解析、等待发送的调用
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub attempt: ToolCallAttempt,
    pub targets: Vec<ValidatedRef>,
    /// 发送时刻索引中的目标元素（用于记录学习到的映射）
    pub target_records: Vec<ElementRecord>,
}

/// 一次成功执行的回执
#[derive(Debug, Clone)]
pub struct ActReceipt {
    pub attempt: ToolCallAttempt,
    pub target_records: Vec<ElementRecord>,
    pub result: Value,
}

pub struct ActPipeline {
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
    store: Arc<StateStore>,
    max_repair_attempts: u32,
}

impl ActPipeline {
    pub fn new(
        registry: Arc<ToolRegistry>,
        executor: ToolExecutor,
        store: Arc<StateStore>,
        max_repair_attempts: u32,
    ) -> Self {
        Self {
            registry,
            executor,
            store,
            max_repair_attempts,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 把参数中的元素引用逐个交给 State Store 解析；格式错误与过期一样视为无效引用
    pub fn resolve_refs(&self, tool: &str, args: &Value) -> Result<Vec<ValidatedRef>, ExecError> {
        let mut targets = Vec::new();
        for key in self.registry.ref_args(tool) {
            let Some(raw) = args.get(key) else {
                continue;
            };
            let element = raw
                .as_str()
                .and_then(|s| s.trim().parse::<ElementRef>().ok())
                .ok_or_else(|| ExecError::StaleRef {
                    reference: raw.to_string(),
                    current_version: self.store.version(),
                })?;
            targets.push(self.store.resolve(&element)?);
        }
        Ok(targets)
    }

    /// Validate -> Repair，然后解析引用
    pub fn prepare(&self, call: &ToolCall) -> Result<PreparedCall, ExecError> {
        let attempt = ToolCallAttempt::new(call)
            .validate_and_repair(&self.registry, self.max_repair_attempts)?;
        let targets = self.resolve_refs(&attempt.tool_name, &attempt.arguments)?;
        let state = self.store.current();
        let target_records = targets
            .iter()
            .filter_map(|t| state.index.get(t.stable_ref()).cloned())
            .collect();
        Ok(PreparedCall {
            attempt,
            targets,
            target_records,
        })
    }

    /// 发送前再次确认每个引用仍属于当前版本，然后执行恰好一次调用
    pub async fn dispatch(&self, prepared: PreparedCall) -> Result<ActReceipt, ExecError> {
        for target in &prepared.targets {
            self.store.recheck(target)?;
        }
        let wire_args = self.wire_args(&prepared);
        let result = self
            .executor
            .execute(&prepared.attempt.tool_name, wire_args)
            .await?;
        Ok(ActReceipt {
            attempt: prepared.attempt,
            target_records: prepared.target_records,
            result,
        })
    }

    pub async fn act(&self, call: &ToolCall) -> Result<ActReceipt, ExecError> {
        let prepared = self.prepare(call)?;
        self.dispatch(prepared).await
    }

    /// Transport 只认识裸 stable_ref
    fn wire_args(&self, prepared: &PreparedCall) -> Value {
        let mut args = prepared.attempt.arguments.clone();
        if let Value::Object(map) = &mut args {
            let present: Vec<String> = self
                .registry
                .ref_args(&prepared.attempt.tool_name)
                .iter()
                .filter(|k| map.contains_key(k.as_str()))
                .cloned()
                .collect();
            for (key, target) in present.into_iter().zip(&prepared.targets) {
                map.insert(key, Value::String(target.stable_ref().to_string()));
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{IndexBudget, RawObservation, SnapshotProcessor};
    use crate::transport::{Transport, TransportError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn observe(&self) -> Result<RawObservation, TransportError> {
            Ok(RawObservation::default())
        }

        async fn execute(&self, tool: &str, args: &Value) -> Result<Value, TransportError> {
            self.calls.lock().unwrap().push((tool.to_string(), args.clone()));
            Ok(json!({"status": "ok"}))
        }
    }

    fn setup() -> (Arc<StateStore>, SnapshotProcessor, Arc<RecordingTransport>, ActPipeline) {
        let store = Arc::new(StateStore::new(4));
        let processor = SnapshotProcessor::new(store.clock(), IndexBudget::default());
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = ActPipeline::new(
            Arc::new(ToolRegistry::builtin().unwrap()),
            ToolExecutor::new(transport.clone(), 1_000),
            store.clone(),
            2,
        );
        (store, processor, transport, pipeline)
    }

    fn observe(store: &StateStore, processor: &SnapshotProcessor) -> u64 {
        let raw = RawObservation {
            payload: "- textbox \"Email\" [ref=e1]\n- button \"Sign in\" [ref=e2]\n".to_string(),
            ..Default::default()
        };
        let (s, i, m) = processor.process(&raw).unwrap();
        store.update(s, i, m)
    }

    #[tokio::test]
    async fn test_act_sends_bare_refs_with_repaired_args() {
        let (store, processor, transport, pipeline) = setup();
        let v = observe(&store, &processor);
        let receipt = pipeline
            .act(&ToolCall::new("type_text", json!({"target": format!("e1@{v}"), "text": "a@b.c"})))
            .await
            .unwrap();
        assert_eq!(receipt.attempt.repair_attempts, 1);
        assert_eq!(receipt.target_records[0].role, "textbox");
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, json!({"target": "e1", "text": "a@b.c", "clear": true}));
    }

    #[tokio::test]
    async fn test_update_between_prepare_and_dispatch_blocks_call() {
        let (store, processor, transport, pipeline) = setup();
        let v = observe(&store, &processor);
        let prepared = pipeline
            .prepare(&ToolCall::new("click", json!({"target": format!("e2@{v}")})))
            .unwrap();
        observe(&store, &processor);
        let err = pipeline.dispatch(prepared).await.unwrap_err();
        assert!(matches!(err, ExecError::StaleRef { .. }));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_ref_is_rejected_as_invalid() {
        let (store, processor, transport, pipeline) = setup();
        observe(&store, &processor);
        let err = pipeline.resolve_refs("click", &json!({"target": "e2"})).unwrap_err();
        assert!(matches!(err, ExecError::StaleRef { .. }));
        let err = pipeline.act(&ToolCall::new("click", json!({"target": "e9@1"}))).await.unwrap_err();
        assert!(matches!(err, ExecError::StaleRef { .. }));
        assert!(transport.calls.lock().unwrap().is_empty());
    }
}

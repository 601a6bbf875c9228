//! 工具执行器
//!
//! 持有 Transport 与全局超时，execute(tool_name, args) 在超时内调用 transport.execute，
//! 超时或失败时转为 ExecError（Timeout / Transport）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{ExecError, ExecutorPhase};
use crate::transport::Transport;

/// 工具执行器：对每次调用施加超时，并将结果映射为 ExecError
pub struct ToolExecutor {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(transport: Arc<dyn Transport>, timeout_ms: u64) -> Self {
        Self {
            transport,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// 执行一次工具调用并输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, ExecError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.transport.execute(tool_name, &args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(e)) => Err(ExecError::Transport(e.to_string())),
            Err(_) => Err(ExecError::Timeout {
                phase: ExecutorPhase::Act,
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RawObservation;
    use crate::transport::TransportError;
    use async_trait::async_trait;

    struct SlowTransport;

    #[async_trait]
    impl Transport for SlowTransport {
        async fn observe(&self) -> Result<RawObservation, TransportError> {
            Ok(RawObservation::default())
        }

        async fn execute(&self, tool: &str, _args: &Value) -> Result<Value, TransportError> {
            if tool == "wait" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            if tool == "click" {
                return Err(TransportError::Failed("detached".to_string()));
            }
            Ok(serde_json::json!({"status": "ok"}))
        }
    }

    #[tokio::test]
    async fn test_executor_maps_errors_and_timeouts() {
        let executor = ToolExecutor::new(Arc::new(SlowTransport), 20);
        assert!(executor.execute("scroll", serde_json::json!({})).await.is_ok());
        assert!(matches!(
            executor.execute("click", serde_json::json!({})).await,
            Err(ExecError::Transport(_))
        ));
        assert!(matches!(
            executor.execute("wait", serde_json::json!({})).await,
            Err(ExecError::Timeout { phase: ExecutorPhase::Act, .. })
        ));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({"text": "x".repeat(500)});
        assert!(args_preview(&long).ends_with("..."));
    }
}

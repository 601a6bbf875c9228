//! ToolCallAttempt：一次 Decide 对应一次 Validate -> Repair 流程

use serde::Serialize;
use serde_json::Value;

use crate::core::ExecError;
use crate::tools::{ToolCall, ToolRegistry};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallAttempt {
    pub tool_name: String,
    pub arguments: Value,
    pub schema_valid: bool,
    pub repair_attempts: u32,
}

impl ToolCallAttempt {
    pub fn new(call: &ToolCall) -> Self {
        Self {
            tool_name: call.tool.clone(),
            arguments: call.args.clone(),
            schema_valid: false,
            repair_attempts: 0,
        }
    }

    /// 校验失败时修复再校验，最多修复 max_repairs 次；仍失败返回 ExecError::Validation
    pub fn validate_and_repair(
        mut self,
        registry: &ToolRegistry,
        max_repairs: u32,
    ) -> Result<Self, ExecError> {
        loop {
            let result = registry.validate(&self.tool_name, &self.arguments);
            if result.ok {
                self.schema_valid = true;
                if self.repair_attempts > 0 {
                    tracing::info!(
                        tool = %self.tool_name,
                        repairs = self.repair_attempts,
                        "arguments repaired"
                    );
                }
                return Ok(self);
            }
            if self.repair_attempts >= max_repairs || registry.get(&self.tool_name).is_none() {
                tracing::warn!(
                    tool = %self.tool_name,
                    repairs = self.repair_attempts,
                    errors = ?result.errors,
                    "validation failed after repair"
                );
                return Err(ExecError::Validation {
                    tool: self.tool_name,
                    errors: result.errors,
                });
            }
            self.arguments = registry.repair(&self.tool_name, &self.arguments, &result.errors);
            self.repair_attempts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attempt_valid_without_repair() {
        let registry = ToolRegistry::builtin().unwrap();
        let attempt = ToolCallAttempt::new(&ToolCall::new("click", json!({"target": "e1@1"})))
            .validate_and_repair(&registry, 2)
            .unwrap();
        assert!(attempt.schema_valid);
        assert_eq!(attempt.repair_attempts, 0);
    }

    #[test]
    fn test_attempt_repair_fills_default_then_passes() {
        let registry = ToolRegistry::builtin().unwrap();
        let call = ToolCall::new("type_text", json!({"target": "e5@3", "text": "alice"}));
        let attempt = ToolCallAttempt::new(&call)
            .validate_and_repair(&registry, 2)
            .unwrap();
        assert_eq!(attempt.repair_attempts, 1);
        assert_eq!(attempt.arguments["clear"], json!(true));
    }

    #[test]
    fn test_attempt_repair_bound_escalates() {
        let registry = ToolRegistry::builtin().unwrap();
        // text 缺失且没有默认值，修复无法补齐
        let call = ToolCall::new("type_text", json!({"target": "e5@3"}));
        for max in 0..4 {
            let err = ToolCallAttempt::new(&call)
                .validate_and_repair(&registry, max)
                .unwrap_err();
            assert!(matches!(err, ExecError::Validation { ref tool, .. } if tool == "type_text"));
        }
    }

    #[test]
    fn test_attempt_unknown_tool() {
        let registry = ToolRegistry::builtin().unwrap();
        let err = ToolCallAttempt::new(&ToolCall::new("teleport", json!({})))
            .validate_and_repair(&registry, 2)
            .unwrap_err();
        assert!(err.to_string().contains("unknown tool"));
    }
}

//! 工具调用格式与其 JSON Schema（schemars 生成，拼入 oracle 的 system prompt）

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// oracle 提议的一次工具调用：`{"tool": "...", "args": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolCall {
    /// 工具名，如 click、type_text、navigate
    pub tool: String,
    /// 工具参数；元素引用必须写成带版本的形式，如 "e12@7"
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 返回工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCall);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

//! 从 LLM 文本中提取工具调用：```json 代码块优先，其次第一个 `{` 到最后一个 `}`

use serde::Deserialize;
use serde_json::Value;

use crate::oracle::{OracleError, Proposal};
use crate::tools::ToolCall;

#[derive(Deserialize)]
struct RawProposal {
    #[serde(default)]
    tool: String,
    #[serde(default, alias = "arguments")]
    args: Value,
    #[serde(default, alias = "reasoning")]
    reason: Option<String>,
}

/// 提取 JSON 片段；没有 JSON 时返回 None
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析 oracle 输出为 Proposal；参数形状此处不检查（留给 Tool Registry）
pub fn parse_proposal(output: &str) -> Result<Proposal, OracleError> {
    let json_str = extract_json(output).ok_or_else(|| OracleError::NoProposal(preview(output)))?;
    let raw: RawProposal = serde_json::from_str(json_str)
        .map_err(|e| OracleError::Parse(format!("{}: {}", e, preview(json_str))))?;
    if raw.tool.trim().is_empty() {
        return Err(OracleError::NoProposal(preview(output)));
    }
    Ok(Proposal {
        call: ToolCall::new(raw.tool.trim(), raw.args),
        rationale: raw.reason,
    })
}

fn preview(s: &str) -> String {
    let s = s.trim();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

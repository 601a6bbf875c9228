//! 基于 LLM 的决策 oracle
//!
//! system prompt = 角色说明 + 工具目录（带参数 schema）+ 调用格式 schema；
//! user 消息 = 子目标、页面信息、按子目标裁剪后的分段元素、表单、建议提示、最近失败、当前匹配策略。

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};
use crate::oracle::{parse_proposal, DecisionContext, DecisionOracle, OracleError, Proposal};
use crate::snapshot::{build_sections, render_sections, trim_for_task, StructuredIndex, TrimLimits};
use crate::tools::{tool_call_schema_json, ToolRegistry};

const ROLE_PROMPT: &str = "You operate a web page on behalf of a user. \
Each turn you receive the current page as a list of elements. \
Reply with exactly one JSON object {\"tool\": ..., \"args\": {...}} choosing the next single action. \
Element references must be copied exactly as shown, including the @version suffix (for example e12@7). \
Suggestions from memory are hints only; never use them as targets.";

pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    limits: TrimLimits,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>, registry: &ToolRegistry) -> Self {
        let system_prompt = format!(
            "{ROLE_PROMPT}\n\n## Tools\n{}\n\n## Call format\n{}",
            registry.to_schema_json(),
            tool_call_schema_json()
        );
        Self {
            llm,
            system_prompt,
            limits: TrimLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: TrimLimits) -> Self {
        self.limits = limits;
        self
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn render_forms(index: &StructuredIndex) -> String {
        let mut s = String::new();
        for form in &index.forms {
            let fields: Vec<String> = form
                .fields
                .iter()
                .map(|f| format!("{}@{}", f, index.version))
                .collect();
            s.push_str(&format!(
                "- {}: fields [{}]",
                form.name.as_deref().unwrap_or("form"),
                fields.join(", ")
            ));
            if let Some(submit) = &form.submit {
                s.push_str(&format!(" submit {}@{}", submit, index.version));
            }
            s.push('\n');
        }
        s
    }

    /// 构建 user 消息
    pub fn render_context(&self, ctx: &DecisionContext) -> String {
        let mut s = format!("## Subgoal\n{}\n\n", ctx.subgoal);
        s.push_str(&format!(
            "## Page\nurl: {}\ntitle: {}\nversion: {}\n\n",
            ctx.metadata.url, ctx.metadata.title, ctx.version
        ));

        let sections = trim_for_task(&build_sections(&ctx.index), &ctx.subgoal, self.limits);
        s.push_str("## Elements\n");
        if sections.is_empty() {
            s.push_str(&ctx.index.render());
        } else {
            s.push_str(&render_sections(&sections));
        }
        s.push('\n');

        let forms = Self::render_forms(&ctx.index);
        if !forms.is_empty() {
            s.push_str("## Forms\n");
            s.push_str(&forms);
            s.push('\n');
        }

        if !ctx.hints.is_empty() {
            s.push_str("## Suggestions (advisory)\n");
            for h in &ctx.hints {
                s.push_str(&format!("- {} (confidence {:.2})\n", h.pattern, h.confidence));
            }
            s.push('\n');
        }

        if !ctx.recent_attempts.is_empty() {
            s.push_str("## Recent attempts\n");
            for a in &ctx.recent_attempts {
                s.push_str(&format!("- {}\n", a));
            }
            s.push('\n');
        }

        if !ctx.failure_notes.is_empty() {
            s.push_str("## Recent failures\n");
            for f in &ctx.failure_notes {
                s.push_str(&format!("- {}\n", f));
            }
            s.push('\n');
        }

        s.push_str("## Strategy\n");
        s.push_str(ctx.strategy.instruction());
        s.push('\n');
        s
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn propose(&self, ctx: &DecisionContext) -> Result<Proposal, OracleError> {
        let messages = [
            Message::system(self.system_prompt.clone()),
            Message::user(self.render_context(ctx)),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| OracleError::Llm(e.to_string()))?;
        tracing::debug!(version = ctx.version, output = %output, "oracle output");
        parse_proposal(&output)
    }
}

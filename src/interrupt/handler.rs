//! Interruption Handler：scan 找出遮挡层及其关闭控件，resolve 通过正常 Act 路径关闭
//!
//! 每次 DECIDE 之前都会运行；干净页面上只是一次对索引的线性扫描。

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::interrupt::classifier::{BlockerClassifier, BlockerKind, HeuristicClassifier};
use crate::snapshot::{diff, ElementRecord, StableRef, StructuredIndex};
use crate::tools::{ActPipeline, ToolCall};

/// 关闭控件关键词，靠前的优先
const DISMISS_WORDS: &[&str] = &[
    "close",
    "dismiss",
    "no thanks",
    "not now",
    "got it",
    "accept",
    "agree",
    "allow",
    "ok",
    "cancel",
    "reject",
    "decline",
    "continue",
];
/// 只按整体匹配的关闭符号
const DISMISS_GLYPHS: &[&str] = &["x", "×", "✕", "✖"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockerCandidate {
    pub blocker_ref: StableRef,
    pub kind: BlockerKind,
    /// 遮挡层自身后代中的关闭 / 接受 / 取消控件
    pub dismiss: Option<StableRef>,
    /// 相对上一版本索引新出现
    pub newly_added: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ResolveOutcome {
    Dismissed,
    Ignored,
    Failed(String),
}

pub struct InterruptionHandler {
    classifier: Arc<dyn BlockerClassifier>,
}

impl Default for InterruptionHandler {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicClassifier::default()))
    }
}

fn dismiss_rank(element: &ElementRecord) -> Option<usize> {
    if !matches!(element.role.as_str(), "button" | "link") || !element.is_enabled || !element.is_visible {
        return None;
    }
    let name = element
        .name
        .as_deref()
        .or(element.visible_text.as_deref())?
        .trim()
        .to_lowercase();
    if DISMISS_GLYPHS.contains(&name.as_str()) {
        return Some(0);
    }
    DISMISS_WORDS.iter().position(|w| {
        name == *w
            || name.starts_with(&format!("{w} "))
            || name.ends_with(&format!(" {w}"))
            || name.contains(&format!(" {w} "))
    })
}

impl InterruptionHandler {
    pub fn new(classifier: Arc<dyn BlockerClassifier>) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> Arc<dyn BlockerClassifier> {
        self.classifier.clone()
    }

    /// 扫描当前索引；新出现的遮挡层排在前面，其余保持文档顺序。嵌套在其他候选内的遮挡层不重复报告。
    pub fn scan(&self, index: &StructuredIndex, previous: Option<&StructuredIndex>) -> Vec<BlockerCandidate> {
        let change = previous.map(|prev| diff(prev, index));
        let mut seen: HashSet<&StableRef> = HashSet::new();
        let mut candidates = Vec::new();

        for element in &index.elements {
            let Some(kind) = self.classifier.classify(element, index) else {
                continue;
            };
            if index
                .ancestors(element)
                .iter()
                .any(|a| seen.contains(&a.stable_ref))
            {
                continue;
            }
            seen.insert(&element.stable_ref);

            let dismiss = index
                .descendants(&element.stable_ref)
                .into_iter()
                .filter_map(|d| dismiss_rank(d).map(|rank| (rank, d)))
                .min_by_key(|(rank, _)| *rank)
                .map(|(_, d)| d.stable_ref.clone());

            candidates.push(BlockerCandidate {
                blocker_ref: element.stable_ref.clone(),
                kind,
                dismiss,
                newly_added: change
                    .as_ref()
                    .map_or(false, |c| c.is_added(&element.stable_ref)),
            });
        }

        candidates.sort_by_key(|c| !c.newly_added);
        if !candidates.is_empty() {
            tracing::debug!(version = index.version, count = candidates.len(), "blockers detected");
        }
        candidates
    }

    /// 第一个不在 skip 中的候选
    pub fn next_actionable<'a>(
        &self,
        candidates: &'a [BlockerCandidate],
        skip: &HashSet<StableRef>,
    ) -> Option<&'a BlockerCandidate> {
        candidates.iter().find(|c| !skip.contains(&c.blocker_ref))
    }

    /// 发出一次关闭类调用：优先点击关闭控件，其次对模态类按 Escape；没有控件的 toast 忽略
    pub async fn resolve(
        &self,
        blocker: &BlockerCandidate,
        version: u64,
        actor: &ActPipeline,
    ) -> ResolveOutcome {
        let call = match (&blocker.dismiss, blocker.kind) {
            (Some(control), _) => ToolCall::new("click", json!({ "target": format!("{control}@{version}") })),
            (None, BlockerKind::Toast) => return ResolveOutcome::Ignored,
            (None, _) => ToolCall::new("press_key", json!({ "key": "Escape" })),
        };
        match actor.act(&call).await {
            Ok(_) => {
                tracing::info!(
                    blocker = %blocker.blocker_ref,
                    kind = ?blocker.kind,
                    tool = %call.tool,
                    "blocker dismissed"
                );
                ResolveOutcome::Dismissed
            }
            Err(e) => {
                tracing::warn!(blocker = %blocker.blocker_ref, error = %e, "blocker dismiss failed");
                ResolveOutcome::Failed(e.to_string())
            }
        }
    }
}

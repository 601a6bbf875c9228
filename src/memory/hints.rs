//! Memory Store：跨子目标的建议性提示（MemoryHint）
//!
//! 只作为 oracle 上下文中的排序 / 建议输入，永远不携带元素引用，不能直接成为动作参数。
//! 读可并发；写（记录成功映射、调整置信度）在写锁内完成，避免丢失更新。

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

/// 建议性提示：key 为「工具:角色:名称」，pattern 为给 oracle 看的描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryHint {
    pub key: String,
    pub pattern: String,
    pub confidence: f32,
}

/// DONE 时学到的映射：用什么工具、作用在什么角色与名称的元素上
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedMapping {
    pub tool: String,
    pub role: String,
    pub name: String,
}

impl LearnedMapping {
    fn key(&self) -> String {
        format!("{}:{}:{}", self.tool, self.role, self.name.to_lowercase())
    }

    fn pattern(&self) -> String {
        format!("{} on {} \"{}\"", self.tool, self.role, self.name)
    }
}

/// Memory Store trait：检索 top-K 提示与记录成功映射
pub trait HintStore: Send + Sync {
    /// 按子目标描述检索最相关的 k 条提示
    fn top_k(&self, description: &str, k: usize) -> Vec<MemoryHint>;

    /// 记录一次成功映射（同 key 则提高置信度）
    fn record_success(&self, description: &str, mapping: &LearnedMapping);

    /// 是否启用（Noop 实现返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 空实现：不记录、不返回提示
#[derive(Clone, Default)]
pub struct NoopHintStore;

impl HintStore for NoopHintStore {
    fn top_k(&self, _description: &str, _k: usize) -> Vec<MemoryHint> {
        Vec::new()
    }

    fn record_success(&self, _description: &str, _mapping: &LearnedMapping) {}

    fn enabled(&self) -> bool {
        false
    }
}

const INITIAL_CONFIDENCE: f32 = 0.5;
const REINFORCE_RATE: f32 = 0.2;

#[derive(Debug)]
struct HintEntry {
    hint: MemoryHint,
    /// 子目标描述与 pattern 的小写词集合
    tokens: HashSet<String>,
}

/// 进程内实现：按词重叠检索，同分按置信度排序
pub struct InMemoryHintStore {
    entries: RwLock<Vec<HintEntry>>,
    max_hints: usize,
}

/// 将文本切分为小写词集合
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

impl InMemoryHintStore {
    pub fn new(max_hints: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_hints,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryHintStore {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HintStore for InMemoryHintStore {
    fn top_k(&self, description: &str, k: usize) -> Vec<MemoryHint> {
        let query = tokenize_lower(description);
        if query.is_empty() || k == 0 {
            return Vec::new();
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<(usize, &MemoryHint)> = entries
            .iter()
            .map(|e| (query.intersection(&e.tokens).count(), &e.hint))
            .filter(|(s, _)| *s > 0)
            .collect();
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.confidence.total_cmp(&a.1.confidence))
        });
        scored.into_iter().take(k).map(|(_, h)| h.clone()).collect()
    }

    fn record_success(&self, description: &str, mapping: &LearnedMapping) {
        let key = mapping.key();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|e| e.hint.key == key) {
            let c = entry.hint.confidence;
            entry.hint.confidence = (c + (1.0 - c) * REINFORCE_RATE).min(1.0);
            entry.tokens.extend(tokenize_lower(description));
            tracing::debug!(key = %key, confidence = entry.hint.confidence, "hint reinforced");
            return;
        }

        let pattern = mapping.pattern();
        let mut tokens = tokenize_lower(description);
        tokens.extend(tokenize_lower(&pattern));
        entries.push(HintEntry {
            hint: MemoryHint {
                key: key.clone(),
                pattern,
                confidence: INITIAL_CONFIDENCE,
            },
            tokens,
        });
        if entries.len() > self.max_hints {
            // 淘汰置信度最低的一条（同分淘汰最早的）
            if let Some(pos) = entries
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.hint.confidence.total_cmp(&b.1.hint.confidence))
                .map(|(i, _)| i)
            {
                entries.remove(pos);
            }
        }
        tracing::debug!(key = %key, "hint recorded");
    }
}

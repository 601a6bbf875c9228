//! 索引差异：added / removed / changed
//!
//! Executor 用于调试（State Store 的尾随差异日志），Interruption Handler 用于发现新出现的遮挡层。

use std::collections::HashMap;

use serde::Serialize;

use crate::snapshot::model::{ElementRecord, StableRef, StructuredIndex};

/// 单个元素的字段变化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementChange {
    pub stable_ref: StableRef,
    pub fields: Vec<&'static str>,
}

/// 两个索引之间的变化摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub from_version: u64,
    pub to_version: u64,
    pub added: Vec<StableRef>,
    pub removed: Vec<StableRef>,
    pub changed: Vec<ElementChange>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn is_added(&self, stable_ref: &StableRef) -> bool {
        self.added.contains(stable_ref)
    }
}

fn changed_fields(before: &ElementRecord, after: &ElementRecord) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if before.role != after.role {
        fields.push("role");
    }
    if before.name != after.name {
        fields.push("name");
    }
    if before.visible_text != after.visible_text {
        fields.push("visible_text");
    }
    if before.is_visible != after.is_visible {
        fields.push("is_visible");
    }
    if before.is_enabled != after.is_enabled {
        fields.push("is_enabled");
    }
    if before.attrs != after.attrs {
        fields.push("attrs");
    }
    fields
}

/// 计算 prev -> next 的变化（按 stable_ref 对齐，顺序跟随各自文档顺序）
pub fn diff(prev: &StructuredIndex, next: &StructuredIndex) -> ChangeSummary {
    let before: HashMap<&StableRef, &ElementRecord> =
        prev.elements.iter().map(|e| (&e.stable_ref, e)).collect();
    let after: HashMap<&StableRef, &ElementRecord> =
        next.elements.iter().map(|e| (&e.stable_ref, e)).collect();

    let added = next
        .elements
        .iter()
        .filter(|e| !before.contains_key(&e.stable_ref))
        .map(|e| e.stable_ref.clone())
        .collect();
    let removed = prev
        .elements
        .iter()
        .filter(|e| !after.contains_key(&e.stable_ref))
        .map(|e| e.stable_ref.clone())
        .collect();
    let changed = next
        .elements
        .iter()
        .filter_map(|e| {
            let old = before.get(&e.stable_ref)?;
            let fields = changed_fields(old, e);
            (!fields.is_empty()).then(|| ElementChange {
                stable_ref: e.stable_ref.clone(),
                fields,
            })
        })
        .collect();

    ChangeSummary {
        from_version: prev.version,
        to_version: next.version,
        added,
        removed,
        changed,
    }
}

//! 快照数据模型：Snapshot / StructuredIndex / ElementRecord / PageMetadata
//!
//! Snapshot 为不可变值，每次观察新建；StructuredIndex 由且仅由一个 Snapshot 派生，
//! 其中每个 stable_ref 在该版本内唯一。

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 可交互角色（决定 AvailableAction 与裁剪优先级）
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "combobox",
    "textbox",
    "searchbox",
    "checkbox",
    "radio",
    "option",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "switch",
    "slider",
    "spinbutton",
    "listbox",
    "treeitem",
];

/// 表单输入类角色（FormRecord 分组用）
pub const FIELD_ROLES: &[&str] = &[
    "textbox",
    "searchbox",
    "combobox",
    "listbox",
    "checkbox",
    "radio",
    "switch",
    "slider",
    "spinbutton",
];

/// 地标角色：用于分段与优先级
pub const LANDMARK_ROLES: &[&str] = &[
    "main",
    "navigation",
    "contentinfo",
    "banner",
    "complementary",
    "region",
    "search",
    "form",
    "dialog",
    "alertdialog",
];

/// 元素在单个快照版本内的稳定引用（如 `e12`），本身不携带版本
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableRef(String);

impl StableRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 传输层返回的原始观察（ARIA 快照文本 + 页面元信息）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawObservation {
    pub payload: String,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub active_tab_id: Option<String>,
}

/// 一次观察的不可变快照
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub raw_payload: String,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// 以新版本号重建（原值被消费，不存在原地修改）
    pub fn restamp(self, version: u64) -> Self {
        Self { version, ..self }
    }
}

/// 页面元信息，与 Snapshot 一一对应
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    pub active_tab_id: Option<String>,
}

/// 结构化索引中的单个元素
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementRecord {
    pub stable_ref: StableRef,
    pub role: String,
    /// 上下文标签：placeholder 或所在标题
    pub label: Option<String>,
    pub name: Option<String>,
    pub visible_text: Option<String>,
    pub is_visible: bool,
    pub is_enabled: bool,
    /// 最近的带 ref 祖先
    pub parent: Option<StableRef>,
    pub depth: usize,
    pub url: Option<String>,
    /// 其余方括号属性（level / checked / modal / z / live ...）
    pub attrs: BTreeMap<String, String>,
}

impl ElementRecord {
    pub fn is_interactive(&self) -> bool {
        INTERACTIVE_ROLES.contains(&self.role.as_str())
    }

    pub fn is_field(&self) -> bool {
        FIELD_ROLES.contains(&self.role.as_str())
    }

    pub fn is_landmark(&self) -> bool {
        LANDMARK_ROLES.contains(&self.role.as_str()) || self.role == "heading"
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// name 与可见文本拼接后的小写文本（匹配用）
    pub fn search_text(&self) -> String {
        let mut s = String::new();
        for part in [&self.name, &self.label, &self.visible_text].into_iter().flatten() {
            if !s.is_empty() {
                s.push(' ');
            }
            s.push_str(part);
        }
        s.to_lowercase()
    }

    /// 单行渲染：`[e12] button "Log in" (disabled)`，用于预算计价与 prompt
    pub fn render_line(&self) -> String {
        let mut line = format!("[{}] {}", self.stable_ref, self.role);
        if let Some(name) = &self.name {
            line.push_str(&format!(" \"{}\"", name));
        }
        if let Some(label) = &self.label {
            line.push_str(&format!(" label=\"{}\"", label));
        }
        if let Some(text) = &self.visible_text {
            line.push_str(&format!(" text=\"{}\"", text));
        }
        if let Some(url) = &self.url {
            line.push_str(&format!(" url={}", url));
        }
        if !self.is_enabled {
            line.push_str(" (disabled)");
        }
        if !self.is_visible {
            line.push_str(" (hidden)");
        }
        line
    }
}

/// 一组候选输入（同一 form 或同一父容器）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormRecord {
    pub form_ref: Option<StableRef>,
    pub name: Option<String>,
    pub fields: Vec<StableRef>,
    pub submit: Option<StableRef>,
}

/// 元素可用的工具提示（按角色）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableAction {
    pub stable_ref: StableRef,
    pub tools: Vec<String>,
}

/// 被折叠的重复结构
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollapsedGroup {
    pub parent: Option<StableRef>,
    pub role: String,
    pub kept: usize,
    pub dropped: usize,
}

/// 由单个 Snapshot 派生的结构化索引
#[derive(Debug, Clone, Default, Serialize)]
pub struct StructuredIndex {
    pub version: u64,
    pub elements: Vec<ElementRecord>,
    pub forms: Vec<FormRecord>,
    pub actions: Vec<AvailableAction>,
    pub collapsed: Vec<CollapsedGroup>,
    /// 因预算被丢弃的元素数
    pub truncated: usize,
}

impl StructuredIndex {
    pub fn get(&self, stable_ref: &StableRef) -> Option<&ElementRecord> {
        self.elements.iter().find(|e| &e.stable_ref == stable_ref)
    }

    pub fn contains(&self, stable_ref: &StableRef) -> bool {
        self.get(stable_ref).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// 沿 parent 链向上的祖先（近到远）
    pub fn ancestors<'a>(&'a self, element: &'a ElementRecord) -> Vec<&'a ElementRecord> {
        let mut out = Vec::new();
        let mut cursor = element.parent.as_ref();
        while let Some(r) = cursor {
            match self.get(r) {
                Some(p) => {
                    if out.iter().any(|e: &&ElementRecord| e.stable_ref == p.stable_ref) {
                        break;
                    }
                    out.push(p);
                    cursor = p.parent.as_ref();
                }
                None => break,
            }
        }
        out
    }

    /// 某元素的全部后代（文档顺序）
    pub fn descendants<'a>(&'a self, root: &StableRef) -> Vec<&'a ElementRecord> {
        self.elements
            .iter()
            .filter(|e| self.ancestors(e).iter().any(|a| &a.stable_ref == root))
            .collect()
    }

    /// 可见文本中是否出现 needle（不区分大小写）
    pub fn has_visible_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.elements
            .iter()
            .filter(|e| e.is_visible)
            .any(|e| e.search_text().contains(&needle))
    }

    /// 渲染为多行文本（带版本化引用），供 oracle 上下文
    pub fn render(&self) -> String {
        self.elements
            .iter()
            .map(|e| {
                let indent = "  ".repeat(e.depth);
                let line = e.render_line();
                // 将 `[e12]` 改写为 `[e12@7]`，让 oracle 原样抄写带版本引用
                let versioned = line.replacen(
                    &format!("[{}]", e.stable_ref),
                    &format!("[{}@{}]", e.stable_ref, self.version),
                    1,
                );
                format!("{}{}", indent, versioned)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

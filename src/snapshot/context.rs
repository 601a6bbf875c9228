//! 分段上下文：把索引中的可交互元素组织为 Section -> Item -> Action，并按任务关键词裁剪
//!
//! Section 由最近的地标 + 标题路径确定；Item 由最近的重复容器（row / listitem / group）确定，
//! item_key 取容器的首个显著文本。裁剪只做关键词打分，稳定排序（同分保持文档顺序）。

use std::collections::HashSet;

use serde::Serialize;

use crate::snapshot::model::{ElementRecord, StructuredIndex};

const SECTION_LANDMARKS: &[&str] = &["main", "navigation", "contentinfo", "banner", "complementary", "dialog", "alertdialog", "search"];
const REPEATER_ROLES: &[&str] = &["row", "listitem", "group", "article"];
const ITEM_KEY_MAX_CHARS: usize = 80;

/// 单个可执行入口
#[derive(Debug, Clone, Serialize)]
pub struct ActionEntry {
    /// 带版本的引用（`e12@7`）
    pub target: String,
    pub role: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub item_id: String,
    pub item_key: String,
    pub container_role: String,
    pub actions: Vec<ActionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub section_id: String,
    pub landmark: String,
    pub heading_path: Vec<String>,
    pub items: Vec<Item>,
}

/// 裁剪上限
#[derive(Debug, Clone, Copy)]
pub struct TrimLimits {
    pub max_sections: usize,
    pub max_items: usize,
    pub max_actions: usize,
}

impl Default for TrimLimits {
    fn default() -> Self {
        Self {
            max_sections: 3,
            max_items: 8,
            max_actions: 8,
        }
    }
}

fn item_key_for(index: &StructuredIndex, container: Option<&ElementRecord>, fallback: &ElementRecord) -> String {
    let Some(c) = container else {
        return fallback
            .name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", fallback.role, fallback.stable_ref));
    };
    let candidates = std::iter::once(c).chain(index.descendants(&c.stable_ref));
    for e in candidates {
        if matches!(e.role.as_str(), "heading" | "link" | "cell") {
            if let Some(n) = &e.name {
                return n.chars().take(ITEM_KEY_MAX_CHARS).collect();
            }
        }
        if let Some(t) = e.name.as_ref().or(e.visible_text.as_ref()) {
            if !t.trim().is_empty() {
                return t.chars().take(ITEM_KEY_MAX_CHARS).collect();
            }
        }
    }
    format!("{}:{}", c.role, c.stable_ref)
}

/// 构建分段上下文（仅收录可交互元素）
pub fn build_sections(index: &StructuredIndex) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    // (section 下标, 容器 ref) -> item 下标
    let mut item_slots: Vec<(usize, String, usize)> = Vec::new();

    for e in index.elements.iter().filter(|e| e.is_interactive()) {
        let ancestors = index.ancestors(e);
        let landmark = ancestors
            .iter()
            .find(|a| SECTION_LANDMARKS.contains(&a.role.as_str()))
            .map(|a| a.role.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let heading_path: Vec<String> = e.label.iter().cloned().collect();
        let section_id = if heading_path.is_empty() {
            format!("s_{}_noheading", landmark)
        } else {
            format!("s_{}_{}", landmark, heading_path.join("_"))
        };

        let s_idx = match sections.iter().position(|s| s.section_id == section_id) {
            Some(i) => i,
            None => {
                sections.push(Section {
                    section_id: section_id.clone(),
                    landmark: landmark.clone(),
                    heading_path,
                    items: Vec::new(),
                });
                sections.len() - 1
            }
        };

        let container = ancestors
            .iter()
            .find(|a| REPEATER_ROLES.contains(&a.role.as_str()))
            .copied();
        let container_key = container
            .map(|c| c.stable_ref.to_string())
            .unwrap_or_else(|| format!("{}#landmark", landmark));

        let i_idx = match item_slots
            .iter()
            .find(|(s, k, _)| *s == s_idx && *k == container_key)
        {
            Some((_, _, i)) => *i,
            None => {
                let section = &mut sections[s_idx];
                let item_id = format!("{}/i{}", section.section_id, section.items.len());
                section.items.push(Item {
                    item_id,
                    item_key: item_key_for(index, container, e),
                    container_role: container
                        .map(|c| c.role.clone())
                        .unwrap_or_else(|| landmark.clone()),
                    actions: Vec::new(),
                });
                let i = section.items.len() - 1;
                item_slots.push((s_idx, container_key, i));
                i
            }
        };

        sections[s_idx].items[i_idx].actions.push(ActionEntry {
            target: format!("{}@{}", e.stable_ref, index.version),
            role: e.role.clone(),
            name: e.name.clone().unwrap_or_default(),
            url: e.url.clone(),
            disabled: !e.is_enabled,
        });
    }
    sections
}

fn keywords(task: &str) -> HashSet<String> {
    task.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

fn score(keywords: &HashSet<String>, text: &str) -> usize {
    let text = text.to_lowercase();
    keywords.iter().filter(|k| text.contains(k.as_str())).count()
}

/// 按任务关键词保留最相关的 section / item / action
pub fn trim_for_task(sections: &[Section], task: &str, limits: TrimLimits) -> Vec<Section> {
    let kw = keywords(task);
    let action_text = |a: &ActionEntry| format!("{} {}", a.name, a.url.as_deref().unwrap_or(""));
    let item_text = |it: &Item| {
        let mut s = it.item_key.clone();
        for a in &it.actions {
            s.push(' ');
            s.push_str(&action_text(a));
        }
        s
    };

    let mut ranked: Vec<(usize, &Section)> = sections
        .iter()
        .map(|sec| {
            let mut text = sec.heading_path.join(" ");
            for it in &sec.items {
                text.push(' ');
                text.push_str(&item_text(it));
            }
            (score(&kw, &text), sec)
        })
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    ranked
        .into_iter()
        .take(limits.max_sections)
        .map(|(_, sec)| {
            let mut items: Vec<(usize, &Item)> =
                sec.items.iter().map(|it| (score(&kw, &item_text(it)), it)).collect();
            items.sort_by(|a, b| b.0.cmp(&a.0));
            let items = items
                .into_iter()
                .take(limits.max_items)
                .map(|(_, it)| {
                    let mut acts: Vec<(usize, &ActionEntry)> =
                        it.actions.iter().map(|a| (score(&kw, &action_text(a)), a)).collect();
                    acts.sort_by(|a, b| b.0.cmp(&a.0));
                    Item {
                        actions: acts
                            .into_iter()
                            .take(limits.max_actions)
                            .map(|(_, a)| a.clone())
                            .collect(),
                        ..it.clone()
                    }
                })
                .collect();
            Section {
                items,
                ..sec.clone()
            }
        })
        .collect()
}

/// 渲染裁剪后的分段为紧凑文本
pub fn render_sections(sections: &[Section]) -> String {
    let mut out = String::new();
    for sec in sections {
        out.push_str(&format!("## [{}] {}\n", sec.landmark, sec.heading_path.join(" > ")));
        for it in &sec.items {
            out.push_str(&format!("- {} ({})\n", it.item_key, it.container_role));
            for a in &it.actions {
                out.push_str(&format!("  - [{}] {} \"{}\"", a.target, a.role, a.name));
                if let Some(url) = &a.url {
                    out.push_str(&format!(" url={}", url));
                }
                if a.disabled {
                    out.push_str(" (disabled)");
                }
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{IndexBudget, RawObservation, SnapshotProcessor, VersionClock};

    const PANEL_PAGE: &str = r#"
- navigation [ref=e1]:
  - link "Home" [ref=e2]
  - link "Panels" [ref=e3]
- main [ref=e4]:
  - heading "Panel list" [ref=e5]
  - list [ref=e6]:
    - listitem [ref=e7]:
      - link "Cancer panel" [ref=e8]
      - button "Open" [ref=e9]
    - listitem [ref=e10]:
      - link "Test Panel" [ref=e11]
      - button "Open" [ref=e12]
"#;

    fn index() -> StructuredIndex {
        let p = SnapshotProcessor::new(VersionClock::new(), IndexBudget::default());
        let raw = RawObservation {
            payload: PANEL_PAGE.to_string(),
            ..Default::default()
        };
        p.process(&raw).unwrap().1
    }

    #[test]
    fn test_sections_and_items() {
        let sections = build_sections(&index());
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].landmark, "navigation");
        let main = &sections[1];
        assert_eq!(main.heading_path, vec!["Panel list".to_string()]);
        assert_eq!(main.items.len(), 2);
        assert_eq!(main.items[1].item_key, "Test Panel");
        assert_eq!(main.items[1].actions[0].target, "e11@1");
    }

    #[test]
    fn test_trim_prefers_matching_items() {
        let sections = build_sections(&index());
        let trimmed = trim_for_task(
            &sections,
            "open the Test Panel",
            TrimLimits {
                max_sections: 1,
                max_items: 1,
                max_actions: 2,
            },
        );
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed[0].items.len(), 1);
        assert_eq!(trimmed[0].items[0].item_key, "Test Panel");
        let rendered = render_sections(&trimmed);
        assert!(rendered.contains("[e11@1] link \"Test Panel\""));
    }
}

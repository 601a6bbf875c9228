//! 声明式成功谓词：只看 PageMetadata 与 StructuredIndex，求值不需要 oracle

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::planner::PlanError;
use crate::snapshot::{ElementRecord, PageMetadata, StructuredIndex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessPredicate {
    /// URL 包含子串
    UrlContains { value: String },
    /// URL 匹配正则
    UrlMatches { pattern: String },
    TitleContains { value: String },
    /// 存在可见元素（role 精确匹配、name 不区分大小写包含）
    ElementPresent {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    ElementAbsent {
        #[serde(default)]
        role: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    TextVisible { text: String },
    AllOf { predicates: Vec<SuccessPredicate> },
    AnyOf { predicates: Vec<SuccessPredicate> },
    Not { predicate: Box<SuccessPredicate> },
}

fn element_matches(e: &ElementRecord, role: Option<&str>, name: Option<&str>) -> bool {
    if !e.is_visible {
        return false;
    }
    if let Some(role) = role {
        if !e.role.eq_ignore_ascii_case(role) {
            return false;
        }
    }
    let Some(name) = name else {
        return true;
    };
    let needle = name.to_lowercase();
    [&e.name, &e.visible_text]
        .into_iter()
        .flatten()
        .any(|t| t.to_lowercase().contains(&needle))
}

fn any_element(index: &StructuredIndex, role: Option<&str>, name: Option<&str>) -> bool {
    index.elements.iter().any(|e| element_matches(e, role, name))
}

impl SuccessPredicate {
    pub fn url_contains(value: impl Into<String>) -> Self {
        SuccessPredicate::UrlContains { value: value.into() }
    }

    pub fn element_present(role: Option<&str>, name: Option<&str>) -> Self {
        SuccessPredicate::ElementPresent {
            role: role.map(str::to_string),
            name: name.map(str::to_string),
        }
    }

    pub fn evaluate(&self, metadata: &PageMetadata, index: &StructuredIndex) -> bool {
        match self {
            SuccessPredicate::UrlContains { value } => metadata.url.contains(value.as_str()),
            SuccessPredicate::UrlMatches { pattern } => Regex::new(pattern)
                .map(|re| re.is_match(&metadata.url))
                .unwrap_or(false),
            SuccessPredicate::TitleContains { value } => metadata
                .title
                .to_lowercase()
                .contains(&value.to_lowercase()),
            SuccessPredicate::ElementPresent { role, name } => {
                any_element(index, role.as_deref(), name.as_deref())
            }
            SuccessPredicate::ElementAbsent { role, name } => {
                !any_element(index, role.as_deref(), name.as_deref())
            }
            SuccessPredicate::TextVisible { text } => index.has_visible_text(text),
            SuccessPredicate::AllOf { predicates } => {
                predicates.iter().all(|p| p.evaluate(metadata, index))
            }
            SuccessPredicate::AnyOf { predicates } => {
                predicates.iter().any(|p| p.evaluate(metadata, index))
            }
            SuccessPredicate::Not { predicate } => !predicate.evaluate(metadata, index),
        }
    }

    /// 结构检查：正则可编译、元素匹配至少给出 role 或 name、组合不为空
    pub fn validate(&self) -> Result<(), PlanError> {
        match self {
            SuccessPredicate::UrlMatches { pattern } => Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| PlanError::Invalid(format!("url_matches: {e}"))),
            SuccessPredicate::ElementPresent { role: None, name: None }
            | SuccessPredicate::ElementAbsent { role: None, name: None } => Err(PlanError::Invalid(
                "element predicate needs a role or a name".to_string(),
            )),
            SuccessPredicate::UrlContains { value }
            | SuccessPredicate::TitleContains { value }
            | SuccessPredicate::TextVisible { text: value }
                if value.trim().is_empty() =>
            {
                Err(PlanError::Invalid("empty predicate value".to_string()))
            }
            SuccessPredicate::AllOf { predicates } | SuccessPredicate::AnyOf { predicates } => {
                if predicates.is_empty() {
                    return Err(PlanError::Invalid("empty predicate group".to_string()));
                }
                predicates.iter().try_for_each(SuccessPredicate::validate)
            }
            SuccessPredicate::Not { predicate } => predicate.validate(),
            _ => Ok(()),
        }
    }

    /// 简短描述（失败信息用）
    pub fn describe(&self) -> String {
        match self {
            SuccessPredicate::UrlContains { value } => format!("url contains '{value}'"),
            SuccessPredicate::UrlMatches { pattern } => format!("url matches /{pattern}/"),
            SuccessPredicate::TitleContains { value } => format!("title contains '{value}'"),
            SuccessPredicate::ElementPresent { role, name } => format!(
                "{} {} present",
                role.as_deref().unwrap_or("element"),
                name.as_deref().map(|n| format!("'{n}'")).unwrap_or_default()
            ),
            SuccessPredicate::ElementAbsent { role, name } => format!(
                "{} {} absent",
                role.as_deref().unwrap_or("element"),
                name.as_deref().map(|n| format!("'{n}'")).unwrap_or_default()
            ),
            SuccessPredicate::TextVisible { text } => format!("text '{text}' visible"),
            SuccessPredicate::AllOf { predicates } => format!(
                "all of ({})",
                predicates.iter().map(|p| p.describe()).collect::<Vec<_>>().join(", ")
            ),
            SuccessPredicate::AnyOf { predicates } => format!(
                "any of ({})",
                predicates.iter().map(|p| p.describe()).collect::<Vec<_>>().join(", ")
            ),
            SuccessPredicate::Not { predicate } => format!("not ({})", predicate.describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{IndexBudget, RawObservation, SnapshotProcessor, VersionClock};
    use serde_json::json;

    fn page() -> (PageMetadata, StructuredIndex) {
        let p = SnapshotProcessor::new(VersionClock::new(), IndexBudget::default());
        let raw = RawObservation {
            payload: r#"
- main [ref=e1]:
  - heading "Test Panel" [ref=e2] [level=1]
  - button "Download" [ref=e3]
  - button "Delete" [ref=e4] [hidden]
  - text: 42 genes
"#
            .to_string(),
            url: "https://panelapp.test/panels/245/".to_string(),
            title: "Test Panel - PanelApp".to_string(),
            active_tab_id: None,
        };
        let (_, index, metadata) = p.process(&raw).unwrap();
        (metadata, index)
    }

    #[test]
    fn test_evaluate_leaf_predicates() {
        let (m, i) = page();
        assert!(SuccessPredicate::url_contains("/panels/").evaluate(&m, &i));
        assert!(SuccessPredicate::UrlMatches { pattern: r"/panels/\d+/$".into() }.evaluate(&m, &i));
        assert!(SuccessPredicate::TitleContains { value: "test panel".into() }.evaluate(&m, &i));
        assert!(SuccessPredicate::element_present(Some("button"), Some("download")).evaluate(&m, &i));
        // 隐藏元素不计入
        assert!(!SuccessPredicate::element_present(Some("button"), Some("Delete")).evaluate(&m, &i));
        assert!(SuccessPredicate::ElementAbsent { role: Some("dialog".into()), name: None }.evaluate(&m, &i));
        assert!(SuccessPredicate::TextVisible { text: "42 genes".into() }.evaluate(&m, &i));
    }

    #[test]
    fn test_evaluate_combinators_from_json() {
        let (m, i) = page();
        let p: SuccessPredicate = serde_json::from_value(json!({
            "type": "all_of",
            "predicates": [
                {"type": "url_contains", "value": "panelapp"},
                {"type": "not", "predicate": {"type": "text_visible", "text": "Log in"}},
                {"type": "any_of", "predicates": [
                    {"type": "element_present", "name": "nope"},
                    {"type": "element_present", "role": "heading"}
                ]}
            ]
        }))
        .unwrap();
        assert!(p.validate().is_ok());
        assert!(p.evaluate(&m, &i));
        assert!(p.describe().starts_with("all of ("));
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(SuccessPredicate::UrlMatches { pattern: "(".into() }.validate().is_err());
        assert!(SuccessPredicate::element_present(None, None).validate().is_err());
        assert!(SuccessPredicate::AllOf { predicates: vec![] }.validate().is_err());
        assert!(SuccessPredicate::url_contains(" ").validate().is_err());
    }
}

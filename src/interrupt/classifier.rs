//! 遮挡层分类器
//!
//! `BlockerClassifier` 是 scan 背后的可替换判定；`HeuristicClassifier` 只看结构化索引中的
//! 角色、可见性与层级提示（modal / overlay / z / live），不看像素。

use serde::Serialize;

use crate::snapshot::{ElementRecord, StructuredIndex};

/// 遮挡层类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    Modal,
    ConsentBanner,
    Overlay,
    Toast,
}

/// 元素 -> 遮挡层类别（None 表示不是遮挡层）
pub trait BlockerClassifier: Send + Sync {
    fn classify(&self, element: &ElementRecord, index: &StructuredIndex) -> Option<BlockerKind>;
}

const DEFAULT_CONSENT_PATTERNS: &[&str] = &["cookie", "consent", "privacy", "gdpr", "tracking"];
const MODAL_ROLES: &[&str] = &["dialog", "alertdialog"];
const TOAST_ROLES: &[&str] = &["status", "alert"];
const BANNER_CONTAINER_ROLES: &[&str] = &["region", "banner", "complementary", "group", "generic", "contentinfo", "form"];

#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    consent_patterns: Vec<String>,
    overlay_z_threshold: i64,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            consent_patterns: DEFAULT_CONSENT_PATTERNS.iter().map(|s| s.to_string()).collect(),
            overlay_z_threshold: 1000,
        }
    }
}

impl HeuristicClassifier {
    pub fn new(consent_patterns: Vec<String>, overlay_z_threshold: i64) -> Self {
        Self {
            consent_patterns: consent_patterns.into_iter().map(|p| p.to_lowercase()).collect(),
            overlay_z_threshold,
        }
    }

    fn mentions_consent(&self, text: &str) -> bool {
        self.consent_patterns.iter().any(|p| text.contains(p.as_str()))
    }

    /// 容器自身文本，或其非交互后代的文本
    fn container_text(element: &ElementRecord, index: &StructuredIndex) -> String {
        let mut text = element.search_text();
        for d in index.descendants(&element.stable_ref) {
            if !d.is_interactive() {
                text.push(' ');
                text.push_str(&d.search_text());
            }
        }
        text
    }

    fn has_controls(element: &ElementRecord, index: &StructuredIndex) -> bool {
        index
            .descendants(&element.stable_ref)
            .iter()
            .any(|d| d.is_interactive())
    }
}

impl BlockerClassifier for HeuristicClassifier {
    fn classify(&self, element: &ElementRecord, index: &StructuredIndex) -> Option<BlockerKind> {
        if !element.is_visible || element.is_interactive() {
            return None;
        }
        let role = element.role.as_str();

        if MODAL_ROLES.contains(&role) || element.attr("modal").is_some() {
            let text = Self::container_text(element, index);
            return Some(if self.mentions_consent(&text) {
                BlockerKind::ConsentBanner
            } else {
                BlockerKind::Modal
            });
        }

        if TOAST_ROLES.contains(&role) {
            return Some(BlockerKind::Toast);
        }

        let raised = element
            .attr("z")
            .and_then(|z| z.trim().parse::<i64>().ok())
            .map_or(false, |z| z >= self.overlay_z_threshold);
        if element.attr("overlay").is_some() || raised {
            let text = Self::container_text(element, index);
            return Some(if self.mentions_consent(&text) {
                BlockerKind::ConsentBanner
            } else {
                BlockerKind::Overlay
            });
        }

        if BANNER_CONTAINER_ROLES.contains(&role)
            && self.mentions_consent(&element.search_text())
            && Self::has_controls(element, index)
        {
            return Some(BlockerKind::ConsentBanner);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{IndexBudget, RawObservation, SnapshotProcessor, StableRef, VersionClock};

    fn index(payload: &str) -> StructuredIndex {
        let p = SnapshotProcessor::new(VersionClock::new(), IndexBudget::default());
        let raw = RawObservation {
            payload: payload.to_string(),
            ..Default::default()
        };
        p.process(&raw).unwrap().1
    }

    fn kind_of(index: &StructuredIndex, r: &str) -> Option<BlockerKind> {
        let e = index.get(&StableRef::new(r)).unwrap();
        HeuristicClassifier::default().classify(e, index)
    }

    #[test]
    fn test_classifies_blocker_kinds() {
        let idx = index(
            r#"
- region "We use cookies" [ref=e1]:
  - button "Accept all" [ref=e2]
- dialog "Subscribe" [ref=e3]:
  - button "Close" [ref=e4]
- status [ref=e5]: Saved
- generic "Promo" [ref=e6] [z=5000]:
  - link "Shop now" [ref=e7]
- main [ref=e8]:
  - button "Accept cookies policy" [ref=e9]
"#,
        );
        assert_eq!(kind_of(&idx, "e1"), Some(BlockerKind::ConsentBanner));
        assert_eq!(kind_of(&idx, "e3"), Some(BlockerKind::Modal));
        assert_eq!(kind_of(&idx, "e5"), Some(BlockerKind::Toast));
        assert_eq!(kind_of(&idx, "e6"), Some(BlockerKind::Overlay));
        assert_eq!(kind_of(&idx, "e8"), None);
        // 按钮本身不是遮挡层
        assert_eq!(kind_of(&idx, "e9"), None);
    }

    #[test]
    fn test_consent_dialog_is_consent_banner() {
        let idx = index(
            r#"
- dialog "Privacy settings" [ref=e1] [modal]:
  - button "Agree" [ref=e2]
"#,
        );
        assert_eq!(kind_of(&idx, "e1"), Some(BlockerKind::ConsentBanner));
    }
}

//! Snapshot Processor：原始观察 -> (Snapshot, StructuredIndex, PageMetadata)
//!
//! 处理顺序：解析 ARIA 文本 -> 折叠重复结构 -> 去噪（无名包装节点、隐藏的非交互节点、重复 ref）
//! -> 按优先级裁剪到预算 -> 生成 FormRecord 与 AvailableAction。
//! 版本号来自与 State Store 共享的 VersionClock，严格递增。
//!
//! 裁剪只会整枝去掉：保留元素的祖先一定保留，遮挡层及其后代不参与裁剪。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::interrupt::{BlockerClassifier, HeuristicClassifier};
use crate::snapshot::model::{
    AvailableAction, CollapsedGroup, ElementRecord, FormRecord, PageMetadata, RawObservation,
    Snapshot, StableRef, StructuredIndex,
};
use crate::snapshot::parser::{parse_aria, AriaTree, ParseError};

/// 可见文本最大字符数
const MAX_TEXT_CHARS: usize = 200;

/// 无语义包装角色：无名、无文本时视为噪声并被展平
const WRAPPER_ROLES: &[&str] = &["generic", "none", "presentation", "unknown"];

/// 提交类按钮的关键词
const SUBMIT_WORDS: &[&str] = &["submit", "search", "login", "continue", "next", "save", "go", "send", "apply"];

/// 观察无法处理（Executor 视为可重试的 OBSERVE 失败）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    #[error("unparsable observation: {0}")]
    Parse(#[from] ParseError),
}

/// 单调版本时钟，由 Processor 与 State Store 共享
#[derive(Debug, Clone, Default)]
pub struct VersionClock(Arc<AtomicU64>);

impl VersionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取下一个版本号（从 1 开始）
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 保证时钟不低于 floor（外部写入更高版本后调用）
    pub fn observe(&self, floor: u64) {
        self.0.fetch_max(floor, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// 索引预算与折叠参数
#[derive(Debug, Clone)]
pub struct IndexBudget {
    /// 渲染后的索引总字节上限
    pub max_bytes: usize,
    pub max_elements: usize,
    /// 连续重复兄弟节点超过该数量时折叠
    pub collapse_threshold: usize,
    /// 折叠时保留的数量
    pub collapse_keep: usize,
}

impl Default for IndexBudget {
    fn default() -> Self {
        Self {
            max_bytes: 16_000,
            max_elements: 300,
            collapse_threshold: 5,
            collapse_keep: 3,
        }
    }
}

/// Snapshot Processor
#[derive(Clone)]
pub struct SnapshotProcessor {
    clock: VersionClock,
    budget: IndexBudget,
    /// 裁剪时保护的遮挡层判定，与 Interruption Handler 使用同一个
    classifier: Arc<dyn BlockerClassifier>,
}

impl fmt::Debug for SnapshotProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotProcessor")
            .field("clock", &self.clock)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl SnapshotProcessor {
    pub fn new(clock: VersionClock, budget: IndexBudget) -> Self {
        Self {
            clock,
            budget,
            classifier: Arc::new(HeuristicClassifier::default()),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn BlockerClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn budget(&self) -> &IndexBudget {
        &self.budget
    }

    /// 解析并索引一次观察；失败返回 ProcessingError
    pub fn process(
        &self,
        raw: &RawObservation,
    ) -> Result<(Snapshot, StructuredIndex, PageMetadata), ProcessingError> {
        let tree = parse_aria(&raw.payload)?;
        let version = self.clock.next();

        let mut collapsed = Vec::new();
        let skip = collapse_repeats(&tree, &self.budget, &mut collapsed);
        let elements = IndexBuilder::new(&tree, skip).build();

        let mut index = StructuredIndex {
            version,
            elements,
            forms: Vec::new(),
            actions: Vec::new(),
            collapsed,
            truncated: 0,
        };
        if over_budget(&index.elements, &self.budget) {
            let protected = self.blocker_positions(&index);
            let (kept, truncated) = apply_budget(std::mem::take(&mut index.elements), &self.budget, &protected);
            index.elements = kept;
            index.truncated = truncated;
            tracing::debug!(version, truncated, protected = protected.len(), "index truncated to budget");
        }
        index.forms = group_forms(&index);
        index.actions = available_actions(&index);

        let snapshot = Snapshot {
            version,
            raw_payload: raw.payload.clone(),
            captured_at: Utc::now(),
        };
        let metadata = PageMetadata {
            url: raw.url.clone(),
            title: raw.title.clone(),
            active_tab_id: raw.active_tab_id.clone(),
        };
        Ok((snapshot, index, metadata))
    }

    /// 遮挡层及其全部后代在 elements 中的下标
    fn blocker_positions(&self, index: &StructuredIndex) -> HashSet<usize> {
        let positions: HashMap<&StableRef, usize> = index
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| (&e.stable_ref, i))
            .collect();
        let mut protected = HashSet::new();
        for (pos, element) in index.elements.iter().enumerate() {
            if self.classifier.classify(element, index).is_none() {
                continue;
            }
            protected.insert(pos);
            for d in index.descendants(&element.stable_ref) {
                if let Some(p) = positions.get(&d.stable_ref) {
                    protected.insert(*p);
                }
            }
        }
        protected
    }
}

/// 标记需要跳过的重复子树，并记录折叠组
fn collapse_repeats(
    tree: &AriaTree,
    budget: &IndexBudget,
    collapsed: &mut Vec<CollapsedGroup>,
) -> HashSet<usize> {
    let mut skip = HashSet::new();
    if budget.collapse_threshold == 0 {
        return skip;
    }
    for (id, node) in tree.nodes.iter().enumerate() {
        if node.children.len() <= budget.collapse_threshold {
            continue;
        }
        let signatures: Vec<String> = node
            .children
            .iter()
            .map(|c| tree.subtree_signature(*c))
            .collect();
        let mut start = 0;
        while start < signatures.len() {
            let mut end = start + 1;
            while end < signatures.len() && signatures[end] == signatures[start] {
                end += 1;
            }
            let run = end - start;
            if run > budget.collapse_threshold {
                let keep = budget.collapse_keep.min(run);
                for child in &node.children[start + keep..end] {
                    skip.insert(*child);
                }
                collapsed.push(CollapsedGroup {
                    parent: nearest_ref(tree, id),
                    role: tree.node(node.children[start]).role.clone(),
                    kept: keep,
                    dropped: run - keep,
                });
            }
            start = end;
        }
    }
    skip
}

fn nearest_ref(tree: &AriaTree, mut id: usize) -> Option<StableRef> {
    loop {
        let node = tree.node(id);
        if let Some(r) = &node.stable_ref {
            return Some(StableRef::new(r.clone()));
        }
        id = node.parent?;
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// 先序遍历构建 ElementRecord（显式栈，不受嵌套深度影响）
struct IndexBuilder<'a> {
    tree: &'a AriaTree,
    skip: HashSet<usize>,
    elements: Vec<ElementRecord>,
    positions: HashMap<StableRef, usize>,
    last_heading: Option<String>,
}

/// 待访问节点及其继承的上下文
struct Frame {
    id: usize,
    parent: Option<StableRef>,
    depth: usize,
    hidden: bool,
}

impl<'a> IndexBuilder<'a> {
    fn new(tree: &'a AriaTree, skip: HashSet<usize>) -> Self {
        Self {
            tree,
            skip,
            elements: Vec::new(),
            positions: HashMap::new(),
            last_heading: None,
        }
    }

    fn build(mut self) -> Vec<ElementRecord> {
        let mut stack = Vec::new();
        self.push_children(&mut stack, AriaTree::ROOT, None, 0, false);
        while let Some(frame) = stack.pop() {
            if let Some((parent, depth, hidden)) = self.visit(&frame) {
                self.push_children(&mut stack, frame.id, parent, depth, hidden);
            }
        }
        self.elements
    }

    fn push_children(
        &self,
        stack: &mut Vec<Frame>,
        id: usize,
        parent: Option<StableRef>,
        depth: usize,
        hidden: bool,
    ) {
        for &child in self.tree.node(id).children.iter().rev() {
            stack.push(Frame {
                id: child,
                parent: parent.clone(),
                depth,
                hidden,
            });
        }
    }

    fn append_text(&mut self, owner: &Option<StableRef>, text: &str) {
        let Some(owner) = owner else { return };
        let Some(pos) = self.positions.get(owner).copied() else { return };
        let record = &mut self.elements[pos];
        let merged = match &record.visible_text {
            Some(existing) => format!("{} {}", existing, text),
            None => text.to_string(),
        };
        record.visible_text = Some(truncate_chars(&merged, MAX_TEXT_CHARS));
    }

    /// 处理一个节点；返回子节点继承的 (父级, 深度, 隐藏)，None 表示不再进入子树
    fn visit(&mut self, frame: &Frame) -> Option<(Option<StableRef>, usize, bool)> {
        if self.skip.contains(&frame.id) {
            return None;
        }
        let tree = self.tree;
        let node = tree.node(frame.id);
        let parent = frame.parent.clone();
        let depth = frame.depth;
        let hidden = frame.hidden || node.has_flag("hidden");
        let text = node.text();

        if node.role == "heading" {
            if let Some(h) = node.name.clone().or_else(|| text.clone()) {
                self.last_heading = Some(h);
            }
        }

        // 无 ref 节点：文本并入最近的带 ref 祖先，子节点沿用同一父级
        let Some(raw_ref) = node.stable_ref.clone() else {
            if !hidden {
                if let Some(t) = &text {
                    self.append_text(&parent, t);
                }
                if let Some(n) = &node.name {
                    if node.role != "heading" {
                        self.append_text(&parent, n);
                    }
                }
            }
            return Some((parent, depth, hidden));
        };

        let stable_ref = StableRef::new(raw_ref);
        if self.positions.contains_key(&stable_ref) {
            tracing::debug!(stable_ref = %stable_ref, "duplicate ref dropped");
            return None;
        }

        let interactive = crate::snapshot::model::INTERACTIVE_ROLES.contains(&node.role.as_str());
        let wrapper = WRAPPER_ROLES.contains(&node.role.as_str())
            && node.name.is_none()
            && text.is_none()
            && !interactive;
        let hidden_noise = hidden && !interactive;
        if wrapper || hidden_noise {
            return Some((parent, depth, hidden));
        }

        let mut attrs = node.flags.clone();
        attrs.remove("disabled");
        attrs.remove("hidden");
        let label = node.placeholder.clone().or_else(|| {
            if node.role == "heading" {
                None
            } else {
                self.last_heading.clone()
            }
        });

        let record = ElementRecord {
            stable_ref: stable_ref.clone(),
            role: node.role.clone(),
            label,
            name: node.name.clone(),
            visible_text: text.as_deref().map(|t| truncate_chars(t, MAX_TEXT_CHARS)),
            is_visible: !hidden,
            is_enabled: !node.has_flag("disabled"),
            parent,
            depth,
            url: node.url.clone(),
            attrs,
        };
        self.positions.insert(stable_ref.clone(), self.elements.len());
        self.elements.push(record);

        Some((Some(stable_ref), depth + 1, hidden))
    }
}

/// 裁剪优先级（越小越重要）
fn priority_tier(e: &ElementRecord) -> u8 {
    if e.is_interactive() && e.is_visible && e.is_enabled {
        0
    } else if e.is_interactive() {
        1
    } else if e.is_landmark() {
        2
    } else {
        3
    }
}

fn costs(elements: &[ElementRecord]) -> Vec<usize> {
    elements.iter().map(|e| e.render_line().len() + 1).collect()
}

fn over_budget(elements: &[ElementRecord], budget: &IndexBudget) -> bool {
    elements.len() > budget.max_elements || costs(elements).iter().sum::<usize>() > budget.max_bytes
}

/// 超出预算时按「低优先级、文档靠后」先丢弃；保留文档顺序。
/// 仍有保留子元素的容器不丢弃（子元素丢完后的下一轮才轮到它），protected 中的下标不丢弃。
fn apply_budget(
    elements: Vec<ElementRecord>,
    budget: &IndexBudget,
    protected: &HashSet<usize>,
) -> (Vec<ElementRecord>, usize) {
    let costs = costs(&elements);
    let mut bytes: usize = costs.iter().sum();
    let mut count = elements.len();
    let within = |count: usize, bytes: usize| count <= budget.max_elements && bytes <= budget.max_bytes;
    if within(count, bytes) {
        return (elements, 0);
    }

    let parents: Vec<Option<usize>> = {
        let positions: HashMap<&StableRef, usize> = elements
            .iter()
            .enumerate()
            .map(|(i, e)| (&e.stable_ref, i))
            .collect();
        elements
            .iter()
            .map(|e| e.parent.as_ref().and_then(|p| positions.get(p).copied()))
            .collect()
    };
    let mut live_children = vec![0usize; elements.len()];
    for p in parents.iter().flatten() {
        live_children[*p] += 1;
    }

    let mut order: Vec<usize> = (0..elements.len()).collect();
    order.sort_by(|a, b| {
        priority_tier(&elements[*b])
            .cmp(&priority_tier(&elements[*a]))
            .then(b.cmp(a))
    });

    let mut dropped = HashSet::new();
    loop {
        let mut progressed = false;
        for &pos in &order {
            if within(count, bytes) {
                break;
            }
            if dropped.contains(&pos) || protected.contains(&pos) || live_children[pos] > 0 {
                continue;
            }
            dropped.insert(pos);
            count -= 1;
            bytes -= costs[pos];
            if let Some(p) = parents[pos] {
                live_children[p] -= 1;
            }
            progressed = true;
        }
        if within(count, bytes) || !progressed {
            break;
        }
    }

    let truncated = dropped.len();
    let kept = elements
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, e)| e)
        .collect();
    (kept, truncated)
}

fn is_submit_like(e: &ElementRecord) -> bool {
    let name = e.name.as_deref().unwrap_or("").to_lowercase();
    let words: Vec<&str> = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    SUBMIT_WORDS.iter().any(|k| words.contains(k))
        || ["log in", "sign in", "sign up"].iter().any(|k| name.contains(k))
}

/// 将输入元素按最近的 form 祖先（否则按父容器）分组
fn group_forms(index: &StructuredIndex) -> Vec<FormRecord> {
    let mut groups: Vec<FormRecord> = Vec::new();
    for field in index.elements.iter().filter(|e| e.is_field()) {
        let form = index.ancestors(field).into_iter().find(|a| a.role == "form");
        let (scope, name) = match form {
            Some(f) => (Some(f.stable_ref.clone()), f.name.clone()),
            None => (field.parent.clone(), None),
        };
        let existing = groups.iter_mut().find(|g| g.form_ref == scope);
        match existing {
            Some(g) => g.fields.push(field.stable_ref.clone()),
            None => groups.push(FormRecord {
                form_ref: scope,
                name,
                fields: vec![field.stable_ref.clone()],
                submit: None,
            }),
        }
    }

    for group in &mut groups {
        let in_scope = |e: &ElementRecord| match &group.form_ref {
            Some(scope) => {
                e.parent.as_ref() == Some(scope)
                    || index.ancestors(e).iter().any(|a| &a.stable_ref == scope)
            }
            None => e.parent.is_none(),
        };
        let buttons: Vec<&ElementRecord> = index
            .elements
            .iter()
            .filter(|e| e.role == "button" && e.is_enabled && in_scope(e))
            .collect();
        group.submit = buttons
            .iter()
            .find(|b| is_submit_like(b))
            .or_else(|| buttons.first())
            .map(|b| b.stable_ref.clone());
    }
    groups
}

fn tools_for_role(role: &str) -> &'static [&'static str] {
    match role {
        "textbox" | "searchbox" => &["type_text", "click"],
        "combobox" | "listbox" => &["select_option", "click"],
        "slider" | "spinbutton" => &["type_text"],
        "button" | "link" | "tab" | "menuitem" | "menuitemcheckbox" | "menuitemradio" | "option"
        | "treeitem" | "checkbox" | "radio" | "switch" => &["click"],
        _ => &[],
    }
}

fn available_actions(index: &StructuredIndex) -> Vec<AvailableAction> {
    index
        .elements
        .iter()
        .filter(|e| e.is_enabled)
        .filter_map(|e| {
            let tools = tools_for_role(&e.role);
            (!tools.is_empty()).then(|| AvailableAction {
                stable_ref: e.stable_ref.clone(),
                tools: tools.iter().map(|t| t.to_string()).collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(payload: &str) -> RawObservation {
        RawObservation {
            payload: payload.to_string(),
            url: "https://example.test/".to_string(),
            title: "Example".to_string(),
            active_tab_id: Some("tab-1".to_string()),
        }
    }

    fn processor() -> SnapshotProcessor {
        SnapshotProcessor::new(VersionClock::new(), IndexBudget::default())
    }

    const LOGIN_PAGE: &str = r#"
- banner [ref=e1]:
  - link "Home" [ref=e2]:
    - /url: /
- main [ref=e3]:
  - heading "Sign in" [level=1] [ref=e4]
  - form "Login" [ref=e5]:
    - textbox "Email" [ref=e6]
    - textbox "Password" [ref=e7]
    - button "Log in" [ref=e8]
    - button "Forgot?" [ref=e9] [disabled]
  - generic [ref=e10]:
    - paragraph [ref=e11]: New here?
  - generic [ref=e12] [hidden]:
    - link "Secret" [ref=e13]
    - paragraph [ref=e14]: hidden text
"#;

    #[test]
    fn test_versions_strictly_increase() {
        let p = processor();
        let (s1, i1, _) = p.process(&raw(LOGIN_PAGE)).unwrap();
        let (s2, i2, _) = p.process(&raw(LOGIN_PAGE)).unwrap();
        assert!(s2.version > s1.version);
        assert_eq!(i1.version, s1.version);
        assert_eq!(i2.version, s2.version);
    }

    #[test]
    fn test_noise_stripped_and_flags_mapped() {
        let (_, index, meta) = processor().process(&raw(LOGIN_PAGE)).unwrap();
        assert_eq!(meta.active_tab_id.as_deref(), Some("tab-1"));
        // 无名 generic 包装被展平，其子节点挂到上一级
        assert!(!index.contains(&StableRef::new("e10")));
        let para = index.get(&StableRef::new("e11")).unwrap();
        assert_eq!(para.parent, Some(StableRef::new("e3")));
        // 隐藏的非交互节点去除，隐藏的交互节点保留为不可见
        assert!(!index.contains(&StableRef::new("e14")));
        let secret = index.get(&StableRef::new("e13")).unwrap();
        assert!(!secret.is_visible);
        let forgot = index.get(&StableRef::new("e9")).unwrap();
        assert!(!forgot.is_enabled);
        let email = index.get(&StableRef::new("e6")).unwrap();
        assert_eq!(email.label.as_deref(), Some("Sign in"));
    }

    #[test]
    fn test_forms_and_actions() {
        let (_, index, _) = processor().process(&raw(LOGIN_PAGE)).unwrap();
        assert_eq!(index.forms.len(), 1);
        let form = &index.forms[0];
        assert_eq!(form.form_ref, Some(StableRef::new("e5")));
        assert_eq!(form.fields, vec![StableRef::new("e6"), StableRef::new("e7")]);
        assert_eq!(form.submit, Some(StableRef::new("e8")));

        let email_tools = index
            .actions
            .iter()
            .find(|a| a.stable_ref.as_str() == "e6")
            .unwrap();
        assert_eq!(email_tools.tools, vec!["type_text", "click"]);
        // 禁用元素没有可用动作
        assert!(index.actions.iter().all(|a| a.stable_ref.as_str() != "e9"));
    }

    #[test]
    fn test_duplicate_refs_dropped() {
        let payload = "- button \"A\" [ref=e1]\n- button \"B\" [ref=e1]\n";
        let (_, index, _) = processor().process(&raw(payload)).unwrap();
        assert_eq!(index.elements.len(), 1);
        assert_eq!(index.elements[0].name.as_deref(), Some("A"));
    }

    #[test]
    fn test_repeated_structure_collapsed() {
        let mut payload = String::from("- list [ref=l1]:\n");
        for i in 0..10 {
            payload.push_str(&format!("  - listitem [ref=i{i}]:\n    - img \"dot\"\n"));
        }
        let (_, index, _) = processor().process(&raw(&payload)).unwrap();
        // 引用不同但结构相同：签名只看角色与名称
        assert_eq!(index.collapsed.len(), 1);
        assert_eq!(index.collapsed[0].kept, 3);
        assert_eq!(index.collapsed[0].dropped, 7);
        assert_eq!(index.elements.iter().filter(|e| e.role == "listitem").count(), 3);
    }

    #[test]
    fn test_budget_drops_low_priority_first() {
        let mut payload = String::new();
        for i in 0..20 {
            payload.push_str(&format!("- paragraph [ref=p{i}]: filler text number {i}\n"));
        }
        payload.push_str("- button \"Buy\" [ref=b1]\n");
        let budget = IndexBudget {
            max_elements: 5,
            ..IndexBudget::default()
        };
        let p = SnapshotProcessor::new(VersionClock::new(), budget);
        let (_, index, _) = p.process(&raw(&payload)).unwrap();
        assert_eq!(index.elements.len(), 5);
        assert_eq!(index.truncated, 16);
        assert!(index.contains(&StableRef::new("b1")));
        // 保留的是文档靠前的段落，且保持原顺序
        assert_eq!(index.elements[0].stable_ref.as_str(), "p0");
        assert_eq!(index.elements[4].stable_ref.as_str(), "b1");
    }

    fn tight(max_elements: usize) -> SnapshotProcessor {
        let budget = IndexBudget {
            max_elements,
            ..IndexBudget::default()
        };
        SnapshotProcessor::new(VersionClock::new(), budget)
    }

    fn parents_all_kept(index: &StructuredIndex) -> bool {
        index
            .elements
            .iter()
            .all(|e| e.parent.as_ref().map_or(true, |p| index.contains(p)))
    }

    #[test]
    fn test_budget_keeps_containers_of_kept_elements() {
        let payload = r#"
- button "One" [ref=b1]
- button "Two" [ref=b2]
- generic "Panel" [ref=g1]:
  - button "Three" [ref=b3]
- button "Four" [ref=b4]
"#;
        let (_, index, _) = tight(4).process(&raw(payload)).unwrap();
        assert_eq!(index.truncated, 1);
        assert!(index.contains(&StableRef::new("g1")));
        assert!(!index.contains(&StableRef::new("b4")));
        assert!(parents_all_kept(&index));
    }

    #[test]
    fn test_budget_never_hides_an_overlay() {
        let mut payload = String::new();
        for i in 1..=6 {
            payload.push_str(&format!("- button \"Item {i}\" [ref=b{i}]\n"));
        }
        payload.push_str("- generic \"Promo\" [ref=o1] [z=5000]:\n  - button \"Close\" [ref=o2]\n");

        let (_, index, _) = tight(7).process(&raw(&payload)).unwrap();
        assert_eq!(index.truncated, 1);
        assert!(index.contains(&StableRef::new("o1")));
        let close = index.get(&StableRef::new("o2")).unwrap();
        assert_eq!(close.parent, Some(StableRef::new("o1")));
        assert!(!index.contains(&StableRef::new("b6")));

        let candidates = crate::interrupt::InterruptionHandler::default().scan(&index, None);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].blocker_ref, StableRef::new("o1"));
        assert_eq!(candidates[0].dismiss, Some(StableRef::new("o2")));
    }

    #[test]
    fn test_deeply_nested_payload_is_indexed() {
        let depth = 5_000;
        let mut payload = String::new();
        for i in 0..depth {
            payload.push_str(&" ".repeat(i));
            payload.push_str(&format!("- group [ref=g{i}]:\n"));
        }
        let (_, index, _) = processor().process(&raw(&payload)).unwrap();
        assert_eq!(index.elements.len(), IndexBudget::default().max_elements);
        assert_eq!(index.truncated, depth - IndexBudget::default().max_elements);
        assert_eq!(index.elements[0].stable_ref.as_str(), "g0");
        assert!(parents_all_kept(&index));
    }

    #[test]
    fn test_unparsable_payload_is_processing_error() {
        let err = processor().process(&raw("")).unwrap_err();
        assert!(matches!(err, ProcessingError::Parse(ParseError::Empty)));
    }
}

//! ARIA 快照解析：缩进式文本 -> 节点树
//!
//! 输入形如：
//!
//! ```text
//! - navigation [ref=e1]:
//!   - link "Home" [ref=e2]:
//!     - /url: /home
//!   - button "Sign in" [ref=e3] [disabled]
//! - paragraph [ref=e4]: Welcome back
//! ```
//!
//! `- /url: ...`、`- /placeholder: ...` 与 `- text: ...` 行作为属性挂到最近的父节点，
//! 其余行为普通节点，按缩进建立父子关系。节点保存在 arena 中（下标 0 为根）。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// ARIA 树节点
#[derive(Debug, Clone, Default)]
pub struct AriaNode {
    pub role: String,
    pub name: Option<String>,
    pub stable_ref: Option<String>,
    /// 方括号属性：`[disabled]` -> ("disabled", "")，`[level=2]` -> ("level", "2")
    pub flags: BTreeMap<String, String>,
    pub url: Option<String>,
    pub placeholder: Option<String>,
    /// `- text:` 子行与行尾内联文本
    pub texts: Vec<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    indent: i64,
}

impl AriaNode {
    pub fn has_flag(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }

    pub fn text(&self) -> Option<String> {
        let joined = self.texts.join(" ");
        let joined = joined.trim();
        (!joined.is_empty()).then(|| joined.to_string())
    }
}

/// 解析结果：arena 形式的节点树
#[derive(Debug, Clone)]
pub struct AriaTree {
    pub nodes: Vec<AriaNode>,
}

impl AriaTree {
    pub const ROOT: usize = 0;

    pub fn node(&self, id: usize) -> &AriaNode {
        &self.nodes[id]
    }

    /// 除根外的节点数
    pub fn len(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 先序遍历（不含根）
    pub fn preorder(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.nodes[Self::ROOT].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        out
    }

    /// 子树签名：角色与名称按先序拼接，用于识别重复结构（显式栈，不受嵌套深度影响）
    pub fn subtree_signature(&self, id: usize) -> String {
        enum Step {
            Enter(usize),
            Push(char),
        }
        let mut sig = String::new();
        let mut stack = vec![Step::Enter(id)];
        while let Some(step) = stack.pop() {
            let id = match step {
                Step::Push(c) => {
                    sig.push(c);
                    continue;
                }
                Step::Enter(id) => id,
            };
            let node = &self.nodes[id];
            sig.push_str(&node.role);
            sig.push(':');
            sig.push_str(node.name.as_deref().unwrap_or(""));
            if node.children.is_empty() {
                continue;
            }
            sig.push('(');
            stack.push(Step::Push(')'));
            for (i, child) in node.children.iter().enumerate().rev() {
                stack.push(Step::Enter(*child));
                if i > 0 {
                    stack.push(Step::Push(','));
                }
            }
        }
        sig
    }
}

/// 解析失败（空输入或无任何节点行）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty snapshot payload")]
    Empty,
    #[error("no node lines found in snapshot payload")]
    NoNodes,
}

fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<indent>\s*)-\s+(?P<body>.*)$").expect("valid regex"))
}

fn role_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<role>[A-Za-z_][A-Za-z0-9_-]*)").expect("valid regex"))
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""(?P<name>(?:[^"\\]|\\.)*)""#).expect("valid regex"))
}

fn flag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?P<key>[A-Za-z][A-Za-z0-9_-]*)(?:=(?P<value>[^\]]*))?\]").expect("valid regex")
    })
}

fn attr_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^/(?P<key>[A-Za-z]+):\s*(?P<value>.*)$").expect("valid regex"))
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    let s = s
        .strip_prefix('"')
        .and_then(|x| x.strip_suffix('"'))
        .unwrap_or(s);
    s.replace("\\\"", "\"")
}

/// 解析 ARIA 快照文本
pub fn parse_aria(payload: &str) -> Result<AriaTree, ParseError> {
    if payload.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut nodes = vec![AriaNode {
        role: "root".to_string(),
        indent: -1,
        ..Default::default()
    }];
    let mut stack: Vec<usize> = vec![AriaTree::ROOT];

    for line in payload.lines() {
        let Some(caps) = line_re().captures(line) else {
            continue;
        };
        let indent = caps["indent"].len() as i64;
        let body = caps["body"].trim();

        // 属性行挂到栈顶（缩进更深才算其子行）
        let is_attr = body.starts_with('/') || body.starts_with("text:");
        if is_attr {
            while stack.len() > 1 && indent <= nodes[*stack.last().unwrap_or(&0)].indent {
                stack.pop();
            }
            let top = *stack.last().unwrap_or(&AriaTree::ROOT);
            if let Some(text) = body.strip_prefix("text:") {
                let text = unquote(text);
                if !text.is_empty() {
                    nodes[top].texts.push(text);
                }
            } else if let Some(attr) = attr_line_re().captures(body) {
                let value = unquote(&attr["value"]);
                match &attr["key"] {
                    "url" => nodes[top].url = Some(value),
                    "placeholder" => nodes[top].placeholder = Some(value),
                    key => {
                        nodes[top].flags.insert(key.to_string(), value);
                    }
                }
            }
            continue;
        }

        let role = role_re()
            .captures(body)
            .map(|c| c["role"].to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let mut structural_end = role.len();
        let name = name_re().captures(body).map(|c| {
            if let Some(m) = c.get(0) {
                structural_end = structural_end.max(m.end());
            }
            c["name"].replace("\\\"", "\"")
        });

        let mut flags = BTreeMap::new();
        let mut stable_ref = None;
        for c in flag_re().captures_iter(body) {
            if let Some(m) = c.get(0) {
                structural_end = structural_end.max(m.end());
            }
            let key = c["key"].to_string();
            let value = c.name("value").map(|v| v.as_str().to_string()).unwrap_or_default();
            if key == "ref" {
                stable_ref = Some(value);
            } else {
                flags.insert(key, value);
            }
        }

        let mut texts = Vec::new();
        if let Some(rest) = body.get(structural_end..) {
            if let Some(inline) = rest.trim_start().strip_prefix(':') {
                let inline = unquote(inline);
                if !inline.is_empty() {
                    texts.push(inline);
                }
            }
        }

        while stack.len() > 1 && indent <= nodes[*stack.last().unwrap_or(&0)].indent {
            stack.pop();
        }
        let parent = *stack.last().unwrap_or(&AriaTree::ROOT);
        let id = nodes.len();
        nodes.push(AriaNode {
            role,
            name: name.filter(|n| !n.is_empty()),
            stable_ref,
            flags,
            url: None,
            placeholder: None,
            texts,
            parent: Some(parent),
            children: Vec::new(),
            indent,
        });
        nodes[parent].children.push(id);
        stack.push(id);
    }

    let tree = AriaTree { nodes };
    if tree.is_empty() {
        return Err(ParseError::NoNodes);
    }
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
- navigation [ref=e1]:
  - link "Home" [ref=e2]:
    - /url: /home
  - button "Sign in" [ref=e3] [disabled]
- main [ref=e4]:
  - heading "Panels" [level=2] [ref=e5]
  - textbox "Search" [ref=e6]:
    - /placeholder: Type a panel name
  - paragraph [ref=e7]: Welcome back
  - text: loose text
"#;

    #[test]
    fn test_parse_structure() {
        let tree = parse_aria(SAMPLE).unwrap();
        assert_eq!(tree.len(), 7);
        let root_children: Vec<&str> = tree.nodes[AriaTree::ROOT]
            .children
            .iter()
            .map(|c| tree.node(*c).role.as_str())
            .collect();
        assert_eq!(root_children, vec!["navigation", "main"]);
    }

    #[test]
    fn test_parse_attributes() {
        let tree = parse_aria(SAMPLE).unwrap();
        let by_ref = |r: &str| {
            tree.nodes
                .iter()
                .find(|n| n.stable_ref.as_deref() == Some(r))
                .unwrap()
        };
        assert_eq!(by_ref("e2").url.as_deref(), Some("/home"));
        assert!(by_ref("e3").has_flag("disabled"));
        assert_eq!(by_ref("e5").flags.get("level").map(String::as_str), Some("2"));
        assert_eq!(by_ref("e6").placeholder.as_deref(), Some("Type a panel name"));
        assert_eq!(by_ref("e7").text().as_deref(), Some("Welcome back"));
        assert_eq!(by_ref("e4").text().as_deref(), Some("loose text"));
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert_eq!(parse_aria("   \n").unwrap_err(), ParseError::Empty);
        assert_eq!(parse_aria("<html>not aria</html>").unwrap_err(), ParseError::NoNodes);
    }

    #[test]
    fn test_escaped_quotes_in_name() {
        let tree = parse_aria(r#"- button "Say \"hi\"" [ref=e9]"#).unwrap();
        assert_eq!(tree.nodes[1].name.as_deref(), Some("Say \"hi\""));
    }

    #[test]
    fn test_subtree_signature_repeats() {
        let tree = parse_aria("- list:\n  - listitem:\n    - img\n  - listitem:\n    - img\n").unwrap();
        let list = tree.nodes[AriaTree::ROOT].children[0];
        let items = &tree.node(list).children;
        assert_eq!(
            tree.subtree_signature(items[0]),
            tree.subtree_signature(items[1])
        );
        assert_eq!(tree.subtree_signature(list), "list:(listitem:(img:),listitem:(img:))");
    }

    #[test]
    fn test_signature_of_very_deep_tree() {
        let depth = 10_000;
        let mut nodes = vec![AriaNode {
            role: "root".to_string(),
            indent: -1,
            ..Default::default()
        }];
        for i in 1..=depth {
            nodes.push(AriaNode {
                role: "group".to_string(),
                parent: Some(i - 1),
                indent: i as i64,
                ..Default::default()
            });
            nodes[i - 1].children.push(i);
        }
        let tree = AriaTree { nodes };
        let sig = tree.subtree_signature(1);
        assert!(sig.starts_with("group:(group:("));
        assert_eq!(sig.matches('(').count(), depth - 1);
        assert_eq!(sig.matches(')').count(), depth - 1);
    }
}

//! 回放站点：由 TOML 描述的页面与跳转组成的确定性 Transport
//!
//! ```toml
//! start = "home"
//!
//! [pages.home]
//! url = "https://shop.test/"
//! title = "Shop"
//! snapshot = """
//! - link "Log in" [ref=e3]
//! """
//!
//! [[transitions]]
//! from = "home"
//! tool = "click"
//! target = "e3"
//! to = "login"
//! ```
//!
//! navigate 按 URL 查找页面；没有匹配跳转的 click / type_text 等留在原页面。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::snapshot::RawObservation;
use crate::transport::{Transport, TransportError};

const SUPPORTED_TOOLS: &[&str] = &[
    "navigate",
    "click",
    "type_text",
    "select_option",
    "press_key",
    "scroll",
    "wait",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub snapshot: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayTransition {
    pub from: String,
    pub tool: String,
    /// 不填则匹配该工具的任意目标
    #[serde(default)]
    pub target: Option<String>,
    pub to: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaySite {
    pub start: String,
    pub pages: HashMap<String, ReplayPage>,
    #[serde(default)]
    pub transitions: Vec<ReplayTransition>,
}

impl ReplaySite {
    fn check(&self) -> Result<(), TransportError> {
        if !self.pages.contains_key(&self.start) {
            return Err(TransportError::InvalidSite(format!(
                "start page '{}' is not defined",
                self.start
            )));
        }
        for t in &self.transitions {
            for page in [&t.from, &t.to] {
                if !self.pages.contains_key(page) {
                    return Err(TransportError::InvalidSite(format!(
                        "transition references unknown page '{page}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// 确定性回放 Transport；记录每次 execute 以便检查
pub struct ReplayTransport {
    site: ReplaySite,
    current: Mutex<String>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ReplayTransport {
    pub fn new(site: ReplaySite) -> Result<Self, TransportError> {
        site.check()?;
        let start = site.start.clone();
        Ok(Self {
            site,
            current: Mutex::new(start),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn from_toml_str(s: &str) -> Result<Self, TransportError> {
        let site: ReplaySite =
            toml::from_str(s).map_err(|e| TransportError::InvalidSite(e.to_string()))?;
        Self::new(site)
    }

    pub fn from_file(path: &Path) -> Result<Self, TransportError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TransportError::InvalidSite(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// 当前页面 id
    pub fn current_page(&self) -> String {
        self.current
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// 已执行的调用（工具名, 参数）
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn page(&self, id: &str) -> Result<&ReplayPage, TransportError> {
        self.site
            .pages
            .get(id)
            .ok_or_else(|| TransportError::Unavailable(format!("page '{id}' vanished")))
    }

    fn next_page(&self, from: &str, tool: &str, target: Option<&str>) -> Option<&str> {
        self.site
            .transitions
            .iter()
            .find(|t| {
                t.from == from
                    && t.tool == tool
                    && t.target.as_deref().map_or(true, |want| Some(want) == target)
            })
            .map(|t| t.to.as_str())
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn observe(&self) -> Result<RawObservation, TransportError> {
        let id = self.current_page();
        let page = self.page(&id)?;
        Ok(RawObservation {
            payload: page.snapshot.clone(),
            url: page.url.clone(),
            title: page.title.clone(),
            active_tab_id: Some("tab-1".to_string()),
        })
    }

    async fn execute(&self, tool: &str, args: &Value) -> Result<Value, TransportError> {
        if !SUPPORTED_TOOLS.contains(&tool) {
            return Err(TransportError::UnsupportedTool(tool.to_string()));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((tool.to_string(), args.clone()));
        }

        let from = self.current_page();
        let target = args.get("target").and_then(Value::as_str);
        if let Some(target) = target {
            let page = self.page(&from)?;
            if !page.snapshot.contains(&format!("[ref={target}]")) {
                return Err(TransportError::UnknownTarget(target.to_string()));
            }
        }

        let to = if tool == "navigate" {
            let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
            let found = self
                .site
                .pages
                .iter()
                .find(|(_, p)| p.url == url)
                .map(|(id, _)| id.as_str());
            match found.or_else(|| self.next_page(&from, tool, None)) {
                Some(id) => Some(id.to_string()),
                None => return Err(TransportError::Failed(format!("no page at {url}"))),
            }
        } else {
            self.next_page(&from, tool, target).map(str::to_string)
        };

        match to {
            Some(to) => {
                tracing::debug!(from = %from, to = %to, tool, "replay transition");
                if let Ok(mut current) = self.current.lock() {
                    *current = to.clone();
                }
                Ok(json!({ "status": "ok", "page": to }))
            }
            None => Ok(json!({ "status": "ok", "page": from })),
        }
    }
}

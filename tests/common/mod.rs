//! 场景测试公用：脚本化 oracle、回放站点、快速配置

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use beeline::config::ExecutorConfig;
use beeline::core::StateStore;
use beeline::oracle::{DecisionContext, DecisionOracle, OracleError, Proposal};
use beeline::tools::{ToolCall, ToolRegistry};
use beeline::transport::{ReplayTransport, Transport};
use beeline::{Executor, ExecutorEvent};

pub const LOGIN_SITE: &str = r#"
start = "home"

[pages.home]
url = "https://shop.test/"
title = "Shop"
snapshot = """
- navigation [ref=e1]:
  - link "Shop" [ref=e2]
  - link "Log in" [ref=e3]
"""

[pages.login]
url = "https://shop.test/login"
title = "Log in"
snapshot = """
- main [ref=e10]:
  - heading "Log in" [ref=e11] [level=1]
  - textbox "Email" [ref=e12]
  - button "Sign in" [ref=e13]
"""

[pages.account]
url = "https://shop.test/account"
title = "Your account"
snapshot = """
- main [ref=e20]:
  - heading "Welcome back" [ref=e21] [level=1]
"""

[[transitions]]
from = "home"
tool = "click"
target = "e3"
to = "login"

[[transitions]]
from = "login"
tool = "click"
target = "e13"
to = "account"
"#;

type Script = dyn Fn(&DecisionContext, usize) -> Result<Proposal, OracleError> + Send + Sync;

/// 按调用序号给出提议，并记录每次收到的上下文
pub struct ScriptedOracle {
    script: Box<Script>,
    contexts: Mutex<Vec<DecisionContext>>,
}

impl ScriptedOracle {
    pub fn new(
        script: impl Fn(&DecisionContext, usize) -> Result<Proposal, OracleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn contexts(&self) -> Vec<DecisionContext> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn propose(&self, ctx: &DecisionContext) -> Result<Proposal, OracleError> {
        let n = {
            let mut contexts = self.contexts.lock().unwrap();
            contexts.push(ctx.clone());
            contexts.len() - 1
        };
        (self.script)(ctx, n)
    }
}

pub fn proposal(tool: &str, args: serde_json::Value) -> Proposal {
    Proposal {
        call: ToolCall::new(tool, args),
        rationale: None,
    }
}

/// 对当前版本中的元素发出 click
pub fn click_current(ctx: &DecisionContext, stable_ref: &str) -> Proposal {
    proposal("click", json!({ "target": format!("{stable_ref}@{}", ctx.version) }))
}

/// 退避与超时都很短的配置
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        observe_backoff_ms: 1,
        observe_backoff_max_ms: 4,
        oracle_timeout_ms: 2_000,
        transport_timeout_ms: 2_000,
        ..ExecutorConfig::default()
    }
}

pub struct Harness {
    pub site: Arc<ReplayTransport>,
    pub store: Arc<StateStore>,
    pub executor: Executor,
}

pub fn harness(site: &str, oracle: Arc<dyn DecisionOracle>, config: ExecutorConfig) -> Harness {
    let store = Arc::new(StateStore::new(config.diff_log_capacity));
    harness_with_store(site, oracle, config, store)
}

pub fn harness_with_store(
    site: &str,
    oracle: Arc<dyn DecisionOracle>,
    config: ExecutorConfig,
    store: Arc<StateStore>,
) -> Harness {
    let site = Arc::new(ReplayTransport::from_toml_str(site).unwrap());
    let transport: Arc<dyn Transport> = site.clone();
    let registry = Arc::new(ToolRegistry::builtin().unwrap());
    let executor = Executor::new(transport, registry, oracle, store.clone(), config);
    Harness {
        site,
        store,
        executor,
    }
}

pub fn drain(rx: &mut UnboundedReceiver<ExecutorEvent>) -> Vec<ExecutorEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEELINE__*` 覆盖（双下划线表示嵌套，如 `BEELINE__EXECUTOR__MAX_STEPS=50`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::snapshot::{IndexBudget, TrimLimits};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub executor: ExecutorConfig,
    pub snapshot: SnapshotSection,
    pub registry: RegistrySection,
    pub memory: MemorySection,
    pub agent: AgentSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：OpenAI 兼容后端
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读 OPENAI_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.0
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [executor] 段：反应式循环的全部预算与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// OBSERVE 失败后的重试次数
    pub observe_retries: u32,
    pub observe_backoff_ms: u64,
    pub observe_backoff_max_ms: u64,
    pub max_precheck_iterations: u32,
    pub max_stale_redecides: u32,
    pub max_repair_attempts: u32,
    pub max_verify_retries: u32,
    pub max_recover_attempts: u32,
    pub oracle_timeout_ms: u64,
    pub transport_timeout_ms: u64,
    pub memory_hints_k: usize,
    /// 传给 oracle 的最近失败条数
    pub failure_notes_k: usize,
    pub diff_log_capacity: usize,
    /// 单个子目标内的阶段转移总数上限
    pub max_steps: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            observe_retries: 3,
            observe_backoff_ms: 200,
            observe_backoff_max_ms: 2_000,
            max_precheck_iterations: 5,
            max_stale_redecides: 2,
            max_repair_attempts: 2,
            max_verify_retries: 2,
            max_recover_attempts: 2,
            oracle_timeout_ms: 60_000,
            transport_timeout_ms: 15_000,
            memory_hints_k: 3,
            failure_notes_k: 5,
            diff_log_capacity: 16,
            max_steps: 200,
        }
    }
}

impl ExecutorConfig {
    /// 第 attempt 次（从 0 开始）重试前的退避：基数翻倍，封顶
    pub fn observe_backoff(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.observe_backoff_ms
            .saturating_mul(factor)
            .min(self.observe_backoff_max_ms)
    }
}

/// [snapshot] 段：索引预算、折叠参数与给 oracle 的裁剪上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    pub max_bytes: usize,
    pub max_elements: usize,
    pub collapse_threshold: usize,
    pub collapse_keep: usize,
    pub max_sections: usize,
    pub max_items: usize,
    pub max_actions: usize,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        let budget = IndexBudget::default();
        let limits = TrimLimits::default();
        Self {
            max_bytes: budget.max_bytes,
            max_elements: budget.max_elements,
            collapse_threshold: budget.collapse_threshold,
            collapse_keep: budget.collapse_keep,
            max_sections: limits.max_sections,
            max_items: limits.max_items,
            max_actions: limits.max_actions,
        }
    }
}

impl SnapshotSection {
    pub fn index_budget(&self) -> IndexBudget {
        IndexBudget {
            max_bytes: self.max_bytes,
            max_elements: self.max_elements,
            collapse_threshold: self.collapse_threshold,
            collapse_keep: self.collapse_keep,
        }
    }

    pub fn trim_limits(&self) -> TrimLimits {
        TrimLimits {
            max_sections: self.max_sections,
            max_items: self.max_items,
            max_actions: self.max_actions,
        }
    }
}

/// [registry] 段：工具目录文件；未设置时使用内置目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegistrySection {
    pub catalog_path: Option<PathBuf>,
}

/// [memory] 段
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// 0 表示关闭提示存储
    #[serde(default = "default_max_hints")]
    pub max_hints: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_hints: default_max_hints(),
        }
    }
}

fn default_max_hints() -> usize {
    200
}

/// [agent] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 子目标上报后重新规划的次数
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_replans: default_max_replans(),
        }
    }
}

fn default_max_replans() -> u32 {
    1
}

/// 从 config 目录加载配置，环境变量 BEELINE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEELINE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BEELINE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.executor.observe_retries, 3);
        assert_eq!(cfg.executor.max_stale_redecides, 2);
        assert_eq!(cfg.executor.memory_hints_k, 3);
        assert_eq!(cfg.agent.max_replans, 1);
        assert_eq!(cfg.llm.provider, "openai");
        assert!(cfg.registry.catalog_path.is_none());
    }

    #[test]
    fn test_observe_backoff_doubles_and_caps() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.observe_backoff(0), 200);
        assert_eq!(cfg.observe_backoff(1), 400);
        assert_eq!(cfg.observe_backoff(3), 1_600);
        assert_eq!(cfg.observe_backoff(4), 2_000);
        assert_eq!(cfg.observe_backoff(80), 2_000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[executor]\nmax_steps = 40\nmax_verify_retries = 1\n\n[llm]\nmodel = \"local-model\"\n\n[snapshot]\nmax_elements = 50\n"
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.executor.max_steps, 40);
        assert_eq!(cfg.executor.max_verify_retries, 1);
        // 未写出的键保持默认
        assert_eq!(cfg.executor.observe_retries, 3);
        assert_eq!(cfg.llm.model, "local-model");
        assert_eq!(cfg.snapshot.index_budget().max_elements, 50);
        assert_eq!(cfg.snapshot.trim_limits().max_sections, 3);
    }
}

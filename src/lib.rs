//! beeline - LLM 驱动网页自动化的确定性执行内核
//!
//! 模块划分：
//! - **agent**: 顶层运行时（规划、按序执行子目标、重新规划、报告）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 版本化 State Store、错误分类与恢复引擎
//! - **executor**: OBSERVE → PRE_CHECK → DECIDE → ACT → VERIFY 反应式循环
//! - **interrupt**: 模态框 / 同意条 / 浮层 / toast 的检测与关闭
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 建议性提示存储与子目标工作记忆
//! - **observability**: tracing 初始化
//! - **oracle**: 决策 oracle 边界与基于 LLM 的实现
//! - **planner**: 子目标规划与声明式成功谓词
//! - **snapshot**: ARIA 快照解析、结构化索引、差异
//! - **tools**: Tool Registry（校验、修复）与 Act 路径
//! - **transport**: 浏览器传输边界与回放实现

pub mod agent;
pub mod config;
pub mod core;
pub mod executor;
pub mod interrupt;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod oracle;
pub mod planner;
pub mod snapshot;
pub mod tools;
pub mod transport;

pub use agent::{create_agent, Agent, AgentReport, SubgoalReport};
pub use executor::{Executor, ExecutorEvent, SubgoalOutcome, SubgoalStatus};

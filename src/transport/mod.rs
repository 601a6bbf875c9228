//! 浏览器传输边界：observe 取原始观察，execute 执行一次工具调用
//!
//! 参数与返回值对核心而言是不透明的 JSON；元素引用参数到达这里时已是裸 stable_ref（不带版本）。

pub mod replay;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::snapshot::RawObservation;

pub use replay::ReplayTransport;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported tool: {0}")]
    UnsupportedTool(String),

    #[error("target not found on page: {0}")]
    UnknownTarget(String),

    #[error("execution failed: {0}")]
    Failed(String),

    #[error("invalid site definition: {0}")]
    InvalidSite(String),
}

/// 浏览器控制层
#[async_trait]
pub trait Transport: Send + Sync {
    async fn observe(&self) -> Result<RawObservation, TransportError>;

    async fn execute(&self, tool: &str, args: &Value) -> Result<Value, TransportError>;
}

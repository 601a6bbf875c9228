//! Tool Registry 与 Act 路径：只读目录、schema 校验、结构修复、带审计的执行器

pub mod act;
pub mod attempt;
pub mod builtin;
pub mod executor;
pub mod registry;
pub mod repair;
pub mod schema;

pub use act::{ActPipeline, ActReceipt, PreparedCall};
pub use attempt::ToolCallAttempt;
pub use builtin::builtin_specs;
pub use executor::ToolExecutor;
pub use registry::{RegistryError, ToolRegistry, ToolSpec, ValidationResult, ELEMENT_REF_KEYWORD};
pub use schema::{tool_call_schema_json, ToolCall};

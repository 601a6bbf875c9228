//! 记忆层：跨子目标的建议性提示（Memory Store）与子目标内的工作记忆

pub mod hints;
pub mod working;

pub use hints::{HintStore, InMemoryHintStore, LearnedMapping, MemoryHint, NoopHintStore};
pub use working::WorkingMemory;

//! Interruption Handler：模态框、Cookie 同意条、浮层、toast 的检测与关闭

pub mod classifier;
pub mod handler;

pub use classifier::{BlockerClassifier, BlockerKind, HeuristicClassifier};
pub use handler::{BlockerCandidate, InterruptionHandler, ResolveOutcome};

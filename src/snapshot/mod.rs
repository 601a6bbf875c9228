//! 观察层：ARIA 快照解析、结构化索引、差异与分段上下文

pub mod context;
pub mod diff;
pub mod model;
pub mod parser;
pub mod processor;

pub use context::{build_sections, render_sections, trim_for_task, Section, TrimLimits};
pub use diff::{diff, ChangeSummary, ElementChange};
pub use model::{
    AvailableAction, CollapsedGroup, ElementRecord, FormRecord, PageMetadata, RawObservation,
    Snapshot, StableRef, StructuredIndex,
};
pub use parser::{parse_aria, AriaTree, ParseError};
pub use processor::{IndexBudget, ProcessingError, SnapshotProcessor, VersionClock};

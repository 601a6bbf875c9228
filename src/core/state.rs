//! State Store：当前权威快照、版本与结构化索引
//!
//! ExecutionState 是唯一可变记录，每次成功 OBSERVE 后整体原子替换（不合并）；
//! 旧版本立即丢弃，只在有界的尾随差异日志中保留 ChangeSummary 供调试，从不参与决策。
//! `resolve` 是 ValidatedRef 的唯一构造入口：ACT 只接受 ValidatedRef，过期引用无法执行。

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::core::ExecError;
use crate::snapshot::{
    diff, ChangeSummary, PageMetadata, Snapshot, StableRef, StructuredIndex, VersionClock,
};

/// 执行循环阶段（事件、追踪与失败报告用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorPhase {
    Observe,
    PreCheck,
    Decide,
    Act,
    Verify,
    Retry,
    Recover,
    Done,
    Escalate,
}

impl fmt::Display for ExecutorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorPhase::Observe => "OBSERVE",
            ExecutorPhase::PreCheck => "PRE_CHECK",
            ExecutorPhase::Decide => "DECIDE",
            ExecutorPhase::Act => "ACT",
            ExecutorPhase::Verify => "VERIFY",
            ExecutorPhase::Retry => "RETRY",
            ExecutorPhase::Recover => "RECOVER",
            ExecutorPhase::Done => "DONE",
            ExecutorPhase::Escalate => "ESCALATE",
        };
        f.write_str(s)
    }
}

/// oracle 使用的带版本元素引用：`e12@7`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub stable_ref: StableRef,
    pub version: u64,
}

impl ElementRef {
    pub fn new(stable_ref: StableRef, version: u64) -> Self {
        Self { stable_ref, version }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.stable_ref, self.version)
    }
}

/// 引用格式错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed element reference '{0}' (expected <ref>@<version>)")]
pub struct ElementRefError(pub String);

impl FromStr for ElementRef {
    type Err = ElementRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (r, v) = s.rsplit_once('@').ok_or_else(|| ElementRefError(s.to_string()))?;
        let version = v.parse::<u64>().map_err(|_| ElementRefError(s.to_string()))?;
        if r.is_empty() {
            return Err(ElementRefError(s.to_string()));
        }
        Ok(Self::new(StableRef::new(r), version))
    }
}

/// 已通过 State Store 校验的引用；字段私有，只能由 `StateStore::resolve` 构造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRef {
    stable_ref: StableRef,
    version: u64,
}

impl ValidatedRef {
    pub fn stable_ref(&self) -> &StableRef {
        &self.stable_ref
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn to_element_ref(&self) -> ElementRef {
        ElementRef::new(self.stable_ref.clone(), self.version)
    }
}

/// State Store 唯一的可变记录
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub snapshot: Option<Snapshot>,
    pub index: StructuredIndex,
    pub metadata: PageMetadata,
    pub version: u64,
}

impl ExecutionState {
    /// 首次观察之前的空状态（版本 0，不含任何元素）
    pub fn empty() -> Self {
        Self {
            snapshot: None,
            index: StructuredIndex::default(),
            metadata: PageMetadata::default(),
            version: 0,
        }
    }
}

/// 版本化的 State Store；可被多个组件共享读取，只有自身修改 ExecutionState
pub struct StateStore {
    clock: VersionClock,
    current: RwLock<Arc<ExecutionState>>,
    diff_log: Mutex<VecDeque<ChangeSummary>>,
    diff_log_capacity: usize,
}

impl StateStore {
    pub fn new(diff_log_capacity: usize) -> Self {
        Self::with_clock(VersionClock::new(), diff_log_capacity)
    }

    pub fn with_clock(clock: VersionClock, diff_log_capacity: usize) -> Self {
        Self {
            clock,
            current: RwLock::new(Arc::new(ExecutionState::empty())),
            diff_log: Mutex::new(VecDeque::with_capacity(diff_log_capacity)),
            diff_log_capacity,
        }
    }

    /// 与 SnapshotProcessor 共享的版本时钟
    pub fn clock(&self) -> VersionClock {
        self.clock.clone()
    }

    /// 原子替换整个 ExecutionState，返回严格递增的新版本号
    pub fn update(&self, snapshot: Snapshot, mut index: StructuredIndex, metadata: PageMetadata) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let prev = Arc::clone(&guard);

        let mut snapshot = snapshot;
        let mut version = snapshot.version;
        if version <= prev.version {
            let restamped = prev.version + 1;
            tracing::warn!(
                incoming = version,
                current = prev.version,
                restamped,
                "snapshot version not ahead of store, restamping"
            );
            version = restamped;
            snapshot = snapshot.restamp(version);
        }
        index.version = version;
        self.clock.observe(version);

        let change = diff(&prev.index, &index);
        tracing::debug!(
            from = change.from_version,
            to = change.to_version,
            added = change.added.len(),
            removed = change.removed.len(),
            changed = change.changed.len(),
            "state updated"
        );

        *guard = Arc::new(ExecutionState {
            snapshot: Some(snapshot),
            index,
            metadata,
            version,
        });
        drop(guard);

        if self.diff_log_capacity > 0 {
            let mut log = self.diff_log.lock().unwrap_or_else(PoisonError::into_inner);
            if log.len() == self.diff_log_capacity {
                log.pop_front();
            }
            log.push_back(change);
        }
        version
    }

    /// 最新状态；调用方不得跨 update 缓存其中的 stable_ref
    pub fn current(&self) -> Arc<ExecutionState> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn version(&self) -> u64 {
        self.current().version
    }

    /// 仅当 version 等于当前版本且 ref 存在于当前索引时为 true
    pub fn validate_ref(&self, stable_ref: &StableRef, version: u64) -> bool {
        let state = self.current();
        state.version == version && state.index.contains(stable_ref)
    }

    /// 将 oracle 给出的引用校验为 ValidatedRef；版本不符或不存在即 StaleRef
    pub fn resolve(&self, element: &ElementRef) -> Result<ValidatedRef, ExecError> {
        let state = self.current();
        if state.version == element.version && state.index.contains(&element.stable_ref) {
            Ok(ValidatedRef {
                stable_ref: element.stable_ref.clone(),
                version: element.version,
            })
        } else {
            Err(ExecError::StaleRef {
                reference: element.to_string(),
                current_version: state.version,
            })
        }
    }

    /// ACT 前的再次确认：ValidatedRef 的版本仍是当前版本
    pub fn recheck(&self, validated: &ValidatedRef) -> Result<(), ExecError> {
        self.resolve(&validated.to_element_ref()).map(|_| ())
    }

    /// 尾随差异日志（仅调试用）
    pub fn diff_log(&self) -> Vec<ChangeSummary> {
        self.diff_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

//! 子目标内的工作记忆：当前子目标、已尝试动作、失败原因
//!
//! 只在一个子目标的执行循环内有效，拼入 oracle 上下文（Recent attempts / Recent failures），减少重复犯错。

/// 每类最多保留的条数
const MAX_NOTES: usize = 8;

#[derive(Clone, Debug, Default)]
pub struct WorkingMemory {
    pub goal: Option<String>,
    pub attempts: Vec<String>,
    pub failures: Vec<String>,
}

fn push_bounded(list: &mut Vec<String>, item: String) {
    list.push(item);
    if list.len() > MAX_NOTES {
        list.remove(0);
    }
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        self.goal = Some(goal.into());
    }

    /// 记录一次动作，格式 "tool args -> outcome"
    pub fn add_attempt(&mut self, attempt: impl Into<String>) {
        push_bounded(&mut self.attempts, attempt.into());
    }

    pub fn add_failure(&mut self, failure: impl Into<String>) {
        push_bounded(&mut self.failures, failure.into());
    }

    /// 最近 n 条失败
    pub fn recent_failures(&self, n: usize) -> Vec<String> {
        let start = self.failures.len().saturating_sub(n);
        self.failures[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notes_are_bounded() {
        let mut wm = WorkingMemory::new();
        for i in 0..20 {
            wm.add_failure(format!("f{i}"));
        }
        assert_eq!(wm.failures.len(), MAX_NOTES);
        assert_eq!(wm.recent_failures(2), vec!["f18".to_string(), "f19".to_string()]);
    }

    #[test]
    fn test_goal_and_attempts() {
        let mut wm = WorkingMemory::new();
        assert!(wm.recent_failures(3).is_empty());
        wm.set_goal("Log in");
        wm.add_attempt("click e3@2 -> ok");
        assert_eq!(wm.goal.as_deref(), Some("Log in"));
        assert_eq!(wm.attempts, vec!["click e3@2 -> ok".to_string()]);
    }
}

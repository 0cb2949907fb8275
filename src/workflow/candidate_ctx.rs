//! 候选上下文
//!
//! 封装"我正在抢哪门课的哪个班级，第几次尝试"这一信息，只用于日志

use std::fmt::Display;

use crate::models::PendingAttempt;

/// 候选上下文
#[derive(Debug, Clone)]
pub struct CandidateCtx {
    /// 课程代码（展示用）
    pub label: String,

    /// 班级
    pub section: String,

    /// 第几次尝试（从1开始）
    pub attempt: u32,
}

impl From<&PendingAttempt> for CandidateCtx {
    fn from(pending: &PendingAttempt) -> Self {
        Self {
            label: pending.label().to_string(),
            section: pending.section.clone(),
            attempt: pending.attempt_count,
        }
    }
}

impl Display for CandidateCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[候选 {}/{} #{}]",
            self.label, self.section, self.attempt
        )
    }
}

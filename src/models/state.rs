//! 持久化状态中的记录类型
//!
//! 页面每次提交表单都会整页刷新，这些记录就是跨越刷新的全部上下文。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::class_option::{Category, ClassOption};

/// 运行模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Idle,
    Hunting,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Idle => f.write_str("idle"),
            RunMode::Hunting => f.write_str("hunting"),
        }
    }
}

/// 正在进行的抢课尝试
///
/// 提交前写入，刷新后评估一次即清除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAttempt {
    pub raw_value: String,
    pub value_code: String,
    pub display_code: String,
    pub name: String,
    pub section: String,
    pub category: Category,
    pub attempt_count: u32,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl PendingAttempt {
    pub fn new(candidate: &ClassOption, attempt_count: u32, timestamp: i64) -> Self {
        Self {
            raw_value: candidate.raw_value.clone(),
            value_code: candidate.value_code.clone(),
            display_code: candidate.display_code.clone(),
            name: candidate.name.clone(),
            section: candidate.section.clone(),
            category: candidate.category,
            attempt_count,
            timestamp,
        }
    }

    pub fn label(&self) -> &str {
        if self.display_code.is_empty() {
            &self.value_code
        } else {
            &self.display_code
        }
    }

    /// 刷新后的页面里找不到该班级时，用旧记录拼出一个候选
    pub fn to_candidate(&self) -> ClassOption {
        let mut candidate = ClassOption::from_raw(self.category, self.raw_value.clone());
        candidate.value_code = self.value_code.clone();
        candidate.display_code = self.display_code.clone();
        candidate.name = self.name.clone();
        candidate.section = self.section.clone();
        candidate
    }
}

/// 验证码弹窗上显示的说明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptchaMeta {
    pub title: String,
    pub description: String,
    pub section: String,
    pub category: Category,
    pub attempt: u32,
}

impl CaptchaMeta {
    pub fn for_attempt(pending: &PendingAttempt) -> Self {
        Self {
            title: format!("{} - 班级 {}", pending.label(), pending.section),
            description: pending.name.clone(),
            section: pending.section.clone(),
            category: pending.category,
            attempt: pending.attempt_count.max(1),
        }
    }
}

/// 最近一次的验证码快照（只保留一份）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptchaSnapshot {
    /// `data:image/png;base64,...`，截取失败时为空
    pub image: String,
    pub image_url: String,
    pub source_context_id: String,
    pub meta: Option<CaptchaMeta>,
    pub captured_at: i64,
}

/// 名额基线中的一条
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineEntry {
    /// None 表示页面上还没出现过名额数字，与真正的 0 名额区分
    pub quota: Option<u32>,
    pub filled: Option<u32>,
    pub observed_at: i64,
}

/// rawValue → 基线
pub type QuotaBaseline = BTreeMap<String, BaselineEntry>;

/// 检测到名额增加的班级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedItem {
    pub raw_value: String,
    pub display_code: String,
    pub name: String,
    pub section: String,
    pub category: Category,
    pub old_quota: u32,
    pub new_quota: u32,
    pub delta: u32,
}

/// 缓存的班级列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedClasses {
    pub updated_at: i64,
    pub items: Vec<ClassOption>,
}

/// 用户选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOptions {
    pub max_captcha_attempts: u32,
    pub watch_interval_secs: u64,
}

impl UserOptions {
    pub const DEFAULT_MAX_CAPTCHA_ATTEMPTS: u32 = 8;
    pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 30;

    /// 0 视为未设置，使用默认值；其余限制在 1..=20 与 5..=300
    pub fn clamped(self) -> Self {
        let attempts = match self.max_captcha_attempts {
            0 => Self::DEFAULT_MAX_CAPTCHA_ATTEMPTS,
            n => n,
        };
        let interval = match self.watch_interval_secs {
            0 => Self::DEFAULT_WATCH_INTERVAL_SECS,
            n => n,
        };
        Self {
            max_captcha_attempts: attempts.clamp(1, 20),
            watch_interval_secs: interval.clamp(5, 300),
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(5))
    }
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            max_captcha_attempts: Self::DEFAULT_MAX_CAPTCHA_ATTEMPTS,
            watch_interval_secs: Self::DEFAULT_WATCH_INTERVAL_SECS,
        }
    }
}

/// 名额监控状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStatus {
    pub enabled: bool,
    pub last_check_ts: Option<i64>,
    pub baseline_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fall_back_and_clamp() {
        let opts = UserOptions {
            max_captcha_attempts: 0,
            watch_interval_secs: 1,
        }
        .clamped();
        assert_eq!(opts.max_captcha_attempts, 8);
        assert_eq!(opts.watch_interval_secs, 5);

        let opts = UserOptions {
            max_captcha_attempts: 99,
            watch_interval_secs: 1000,
        }
        .clamped();
        assert_eq!(opts.max_captcha_attempts, 20);
        assert_eq!(opts.watch_interval_secs, 300);
    }

    #[test]
    fn captcha_meta_uses_value_code_when_display_code_missing() {
        let candidate = ClassOption::from_raw(Category::Major, "IF4101|B|2023|IF");
        let pending = PendingAttempt::new(&candidate, 2, 0);
        let meta = CaptchaMeta::for_attempt(&pending);
        assert_eq!(meta.title, "IF4101 - 班级 B");
        assert_eq!(meta.attempt, 2);
    }

    #[test]
    fn run_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunMode::Hunting).unwrap(), "\"hunting\"");
    }
}

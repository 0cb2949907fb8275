//! 持久化状态存储 - 基础设施层
//!
//! 唯一可信的状态来源。页面刷新后内存里的一切都不可信，
//! 所有流程都从这里读取、写回。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::{
    CachedClasses, CaptchaSnapshot, ClassOption, PendingAttempt, QuotaBaseline, RunMode,
    UserOptions, WatchStatus,
};

/// 状态键，用于变更通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Priority,
    RunMode,
    Pending,
    ActiveIndex,
    Classes,
    LastCaptcha,
    WatchEnabled,
    WatchBaseline,
    WatchLastCheck,
    WatchQueue,
    CollapsedSections,
    Options,
}

/// 全部持久化状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    pub priority: Vec<ClassOption>,
    pub run_mode: RunMode,
    pub pending: Option<PendingAttempt>,
    pub active_index: usize,
    pub classes: Option<CachedClasses>,
    pub last_captcha: Option<CaptchaSnapshot>,
    pub watch_enabled: bool,
    pub watch_baseline: QuotaBaseline,
    pub watch_last_check: Option<i64>,
    pub watch_queue: VecDeque<String>,
    /// 界面折叠偏好，核心流程不读取
    pub collapsed_sections: BTreeMap<String, bool>,
    pub options: Option<UserOptions>,
}

impl StateSnapshot {
    /// 两份快照之间发生变化的键
    pub fn changed_keys(&self, other: &StateSnapshot) -> Vec<StateKey> {
        let mut keys = Vec::new();
        if self.priority != other.priority {
            keys.push(StateKey::Priority);
        }
        if self.run_mode != other.run_mode {
            keys.push(StateKey::RunMode);
        }
        if self.pending != other.pending {
            keys.push(StateKey::Pending);
        }
        if self.active_index != other.active_index {
            keys.push(StateKey::ActiveIndex);
        }
        if self.classes != other.classes {
            keys.push(StateKey::Classes);
        }
        if self.last_captcha != other.last_captcha {
            keys.push(StateKey::LastCaptcha);
        }
        if self.watch_enabled != other.watch_enabled {
            keys.push(StateKey::WatchEnabled);
        }
        if self.watch_baseline != other.watch_baseline {
            keys.push(StateKey::WatchBaseline);
        }
        if self.watch_last_check != other.watch_last_check {
            keys.push(StateKey::WatchLastCheck);
        }
        if self.watch_queue != other.watch_queue {
            keys.push(StateKey::WatchQueue);
        }
        if self.collapsed_sections != other.collapsed_sections {
            keys.push(StateKey::CollapsedSections);
        }
        if self.options != other.options {
            keys.push(StateKey::Options);
        }
        keys
    }

    pub fn watch_status(&self) -> WatchStatus {
        WatchStatus {
            enabled: self.watch_enabled,
            last_check_ts: self.watch_last_check,
            baseline_size: self.watch_baseline.len(),
        }
    }
}

/// 状态存储
///
/// - clone 之后共享同一份状态
/// - 每次写入都会落盘（如果有文件）并广播变化的键
#[derive(Clone)]
pub struct Store {
    state: Arc<Mutex<StateSnapshot>>,
    path: Option<PathBuf>,
    changes: broadcast::Sender<StateKey>,
}

impl Store {
    /// 纯内存存储（测试用）
    pub fn in_memory() -> Self {
        Self::with_state(StateSnapshot::default(), None)
    }

    /// 打开文件存储，文件不存在时从空状态开始
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            StateSnapshot::default()
        };
        debug!("状态文件: {}", path.display());
        Ok(Self::with_state(state, Some(path)))
    }

    fn with_state(state: StateSnapshot, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(state)),
            path,
            changes,
        }
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> broadcast::Receiver<StateKey> {
        self.changes.subscribe()
    }

    /// 当前状态的完整拷贝
    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.lock().await.clone()
    }

    /// 原子地修改多个键
    pub async fn update<R>(&self, f: impl FnOnce(&mut StateSnapshot) -> R) -> Result<R> {
        let mut guard = self.state.lock().await;
        let before = guard.clone();
        let result = f(&mut guard);

        let changed = before.changed_keys(&guard);
        if changed.is_empty() {
            return Ok(result);
        }

        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &guard).await {
                *guard = before;
                return Err(e);
            }
        }
        drop(guard);

        for key in changed {
            // 没有订阅者时发送失败，忽略
            let _ = self.changes.send(key);
        }
        Ok(result)
    }

    async fn read<R>(&self, f: impl FnOnce(&StateSnapshot) -> R) -> R {
        let guard = self.state.lock().await;
        f(&guard)
    }

    pub async fn priority(&self) -> Vec<ClassOption> {
        self.read(|s| s.priority.clone()).await
    }

    pub async fn set_priority(&self, priority: Vec<ClassOption>) -> Result<()> {
        self.update(|s| s.priority = priority).await
    }

    pub async fn run_mode(&self) -> RunMode {
        self.read(|s| s.run_mode).await
    }

    pub async fn set_run_mode(&self, mode: RunMode) -> Result<()> {
        self.update(|s| s.run_mode = mode).await
    }

    pub async fn pending(&self) -> Option<PendingAttempt> {
        self.read(|s| s.pending.clone()).await
    }

    pub async fn active_index(&self) -> usize {
        self.read(|s| s.active_index).await
    }

    pub async fn set_active_index(&self, index: usize) -> Result<()> {
        self.update(|s| s.active_index = index).await
    }

    pub async fn cached_classes(&self) -> Option<CachedClasses> {
        self.read(|s| s.classes.clone()).await
    }

    pub async fn set_cached_classes(&self, classes: CachedClasses) -> Result<()> {
        self.update(|s| s.classes = Some(classes)).await
    }

    pub async fn last_captcha(&self) -> Option<CaptchaSnapshot> {
        self.read(|s| s.last_captcha.clone()).await
    }

    pub async fn set_last_captcha(&self, snapshot: Option<CaptchaSnapshot>) -> Result<()> {
        self.update(|s| s.last_captcha = snapshot).await
    }

    pub async fn watch_enabled(&self) -> bool {
        self.read(|s| s.watch_enabled).await
    }

    pub async fn set_watch_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.watch_enabled = enabled).await
    }

    pub async fn watch_baseline(&self) -> QuotaBaseline {
        self.read(|s| s.watch_baseline.clone()).await
    }

    pub async fn set_watch_baseline(&self, baseline: QuotaBaseline) -> Result<()> {
        self.update(|s| s.watch_baseline = baseline).await
    }

    pub async fn watch_queue(&self) -> VecDeque<String> {
        self.read(|s| s.watch_queue.clone()).await
    }

    pub async fn watch_status(&self) -> WatchStatus {
        self.read(|s| s.watch_status()).await
    }

    pub async fn set_collapsed_section(&self, section: &str, collapsed: bool) -> Result<()> {
        self.update(|s| {
            s.collapsed_sections.insert(section.to_string(), collapsed);
        })
        .await
    }

    pub async fn options(&self) -> Option<UserOptions> {
        self.read(|s| s.options).await
    }

    pub async fn set_options(&self, options: UserOptions) -> Result<()> {
        self.update(|s| s.options = Some(options.clamped())).await
    }
}

/// 先写临时文件再重命名，避免半截文件
async fn persist(path: &Path, state: &StateSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::Store(format!("无法写入 {}: {}", path.display(), e)))?;
    Ok(())
}

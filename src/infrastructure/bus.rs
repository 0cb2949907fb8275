//! 跨上下文消息 - 基础设施层
//!
//! 页面代理只通过消息与外界交互：
//! - `Command`：外部（控制台 / 弹窗）发给页面代理的指令
//! - `Event`：页面代理发出的通知（验证码、结果、名额变化）

use std::collections::BTreeMap;
use tokio::sync::{broadcast, mpsc};

use crate::error::{AppError, Result};
use crate::models::{
    CaptchaSnapshot, ClassOption, ExtendedItem, PendingAttempt, RunMode, WatchStatus,
};

/// 发给页面代理的指令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartHunt,
    StopHunt,
    /// 替换整个优先级列表
    SetPriority(Vec<ClassOption>),
    /// 按 rawValue 从当前页面追加一个候选
    AddPriority(String),
    RemovePriority(String),
    /// 优先级列表已在存储中被修改
    PriorityChanged,
    CaptchaValue(String),
    RefreshCaptcha,
    WatchStart,
    WatchStop,
    RebuildWatchBaseline,
    /// 状态列表中折叠 / 展开一个类别
    SetSectionCollapsed { section: String, collapsed: bool },
    Status,
    Shutdown,
}

/// 状态摘要
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub run_mode: RunMode,
    pub active_index: usize,
    pub priority: Vec<ClassOption>,
    pub pending: Option<PendingAttempt>,
    pub queue_len: usize,
    pub watch: WatchStatus,
    /// 类别键 → 是否折叠
    pub collapsed: BTreeMap<String, bool>,
}

/// 页面代理发出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    NeedCaptcha(CaptchaSnapshot),
    Notify { title: String, message: String },
    WatchFoundIncrease(Vec<ExtendedItem>),
    WatchRejected { reason: String },
    Status(StatusReport),
}

/// 事件发送端
///
/// 没有订阅者时事件直接丢弃，不影响抢课流程
#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

/// 消息总线
#[derive(Clone)]
pub struct Bus {
    commands: mpsc::Sender<Command>,
    events: EventSink,
}

impl Bus {
    /// 创建总线，返回指令接收端（交给页面代理）
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (commands, rx) = mpsc::channel(capacity);
        let bus = Self {
            commands,
            events: EventSink::new(capacity),
        };
        (bus, rx)
    }

    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::ChannelClosed)
    }

    pub fn events(&self) -> EventSink {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn commands_reach_the_receiver() {
        let (bus, mut rx) = Bus::new(4);
        assert_ok!(bus.send(Command::Status).await);
        assert_eq!(rx.recv().await, Some(Command::Status));
    }

    #[tokio::test]
    async fn send_fails_once_agent_is_gone() {
        let (bus, rx) = Bus::new(4);
        drop(rx);
        let err = assert_err!(bus.send(Command::StartHunt).await);
        assert!(matches!(err, AppError::ChannelClosed));
    }
}

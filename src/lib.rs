//! # FRS Auto Taker
//!
//! 在 FRS 选课页面上自动抢课：按优先级逐个提交选课表单，
//! 由操作员输入验证码；空闲时监控名额，名额增加就立刻切换到抢课。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 与刷新能力
//! - `Store` - 持久化状态，所有进度的唯一来源
//! - `Bus` - 指令与事件通道
//!
//! ### ② 业务能力层（Services）
//! - `PageReader` / `PageActions` - 页面能力接口
//! - `FrsPage` - 在真实标签页中实现上述接口
//! - `CaptchaRelay` / `Notifier` - 验证码转发与通知
//!
//! ### ③ 流程层（Workflow）
//! - `HuntingEngine` - 候选选择、尝试、刷新后评估
//! - `QuotaWatcher` - 名额基线与增加检测
//!
//! ### ④ 编排层（Orchestration）
//! - `Agent` - 页面加载入口与指令分发
//! - `App` - 应用生命周期
//!
//! 提交验证码会导致整页刷新，刷新后从存储恢复进度继续。

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::connect_to_browser_and_page;
pub use config::Config;
pub use error::{AppError, Result};
pub use infrastructure::{Bus, Command, Event, JsExecutor, Store};
pub use models::{ClassOption, PendingAttempt, RunMode};
pub use orchestrator::{Agent, App};
pub use services::{FrsPage, PageActions, PageReader};
pub use workflow::{HuntingEngine, QuotaWatcher};

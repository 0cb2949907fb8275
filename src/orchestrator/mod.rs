//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、退出）
//! - 唯一持有 Browser 的模块
//! - 首次运行时导入优先级列表
//!
//! ### `agent` - 页面代理
//! - 每次页面加载的入口（缓存班级 → 名额检查 → 恢复抢课）
//! - 分发控制台指令
//! - 执行名额监控安排的刷新
//!
//! ### `console` - 控制台
//! - 把终端输入解析成指令
//! - 打印页面代理发出的事件
//!
//! ## 层次关系
//!
//! ```text
//! app (Browser / Store / Bus)
//!     ↓
//! agent (页面加载 + 指令)
//!     ↓
//! workflow::HuntingEngine / workflow::QuotaWatcher
//!     ↓
//! services (能力层：FrsPage / CaptchaRelay / Notifier)
//!     ↓
//! infrastructure (基础设施：JsExecutor / Store / Bus)
//! ```

pub mod agent;
pub mod app;
pub mod console;

pub use agent::{Agent, Flow, LoadOutcome};
pub use app::App;
pub use console::parse_line;

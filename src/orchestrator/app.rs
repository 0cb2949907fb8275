//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：日志文件、连接浏览器、打开状态文件
//! 2. **初始数据**：首次运行时写入用户选项，并从 TOML 导入优先级列表
//! 3. **任务编排**：控制台输入、事件打印与页面代理并行运行
//!
//! 本模块是唯一持有 Browser 的地方。

use anyhow::{Context, Result};
use chromiumoxide::Browser;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::{Bus, Command, JsExecutor, Store};
use crate::models::{load_priority_file, resolve_priority};
use crate::orchestrator::agent::Agent;
use crate::orchestrator::console;
use crate::services::{FrsPage, PageReader};
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    _browser: Browser,
    bus: Bus,
    commands: mpsc::Receiver<Command>,
    agent: Agent<FrsPage>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(&config);

        let (browser, page) = browser::connect_to_browser_and_page(
            config.browser_debug_port,
            Some(&config.target_url),
            Some(&config.target_title),
        )
        .await?;

        let page = Arc::new(FrsPage::new(JsExecutor::new(page)));

        let store = Store::open(&config.state_file)
            .await
            .with_context(|| format!("无法打开状态文件: {}", config.state_file))?;
        if store.options().await.is_none() {
            store.set_options(config.seed_options()).await?;
        }

        seed_priority(&store, page.as_ref(), &config).await?;

        let (bus, commands) = Bus::new(64);
        let agent = Agent::new(store, page, bus.events(), &config);

        Ok(Self {
            config,
            _browser: browser,
            bus,
            commands,
            agent,
        })
    }

    /// 运行应用主逻辑，收到 quit 或输入结束后返回
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            _browser,
            bus,
            commands,
            mut agent,
        } = self;

        let printer = tokio::spawn(console::print_events(bus.events().subscribe()));
        let reader = tokio::spawn(console::run_console(bus.clone()));
        drop(bus);

        agent.run(commands).await?;

        reader.abort();
        printer.abort();
        logging::log_shutdown(&config);
        Ok(())
    }
}

/// 存储中还没有优先级列表时，从 TOML 文件导入
async fn seed_priority(store: &Store, page: &FrsPage, config: &Config) -> Result<()> {
    if !store.priority().await.is_empty() {
        return Ok(());
    }

    let Some(file) = load_priority_file(Path::new(&config.priority_file)).await? else {
        info!(
            "未找到优先级文件 {}，可在控制台使用 add <rawValue> 添加",
            config.priority_file
        );
        return Ok(());
    };

    let classes = page.parse_options().await?;
    let (priority, unknown) = resolve_priority(&file, &classes);
    for raw_value in &unknown {
        warn!("⚠️ 页面上找不到班级: {}", raw_value);
    }

    info!("✓ 从 {} 导入 {} 个候选", config.priority_file, priority.len());
    store.set_priority(priority).await?;
    Ok(())
}

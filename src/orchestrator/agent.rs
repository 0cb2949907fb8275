//! 页面代理 - 编排层
//!
//! ## 职责
//!
//! 1. **页面加载入口**：每次页面加载都缓存班级、跑一轮名额检查、恢复抢课
//! 2. **指令分发**：把外部指令交给抢课引擎 / 名额监控
//! 3. **计时**：名额监控安排的刷新、验证码错误后的退避重试都在主循环里等待，
//!    等待期间指令照常处理
//!
//! 抢课引擎与名额监控之间唯一的互斥手段是存储中的 RunMode。

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::infrastructure::{Command, Event, EventSink, StatusReport, Store};
use crate::models::{CachedClasses, Category, ClassOption, UserOptions};
use crate::services::{CaptchaRelay, Notifier, PageActions, PageReader};
use crate::utils::clock::now_ms;
use crate::workflow::{
    wait_deadline, AttemptOutcome, CycleOutcome, HuntSettings, HuntingEngine, NextStep,
    QuotaWatcher, ReloadTimer, ResumeOutcome, SubmitOutcome,
};

/// 处理完一条指令后是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// 一次页面加载的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub cycle: CycleOutcome,
    /// 名额监控已经切换到抢课时为 None
    pub resume: Option<ResumeOutcome>,
}

/// 页面代理
pub struct Agent<P> {
    store: Store,
    page: Arc<P>,
    engine: HuntingEngine<P>,
    watcher: QuotaWatcher<P>,
    events: EventSink,
    seed_options: UserOptions,
    /// 验证码错误后的退避
    retry: ReloadTimer,
}

impl<P: PageReader + PageActions> Agent<P> {
    pub fn new(store: Store, page: Arc<P>, events: EventSink, config: &Config) -> Self {
        let seed_options = config.seed_options();
        let relay = CaptchaRelay::new(store.clone(), events.clone());
        let notifier = Notifier::new(events.clone());
        let engine = HuntingEngine::new(
            store.clone(),
            page.clone(),
            relay,
            notifier,
            HuntSettings::from_config(config),
        );
        let watcher = QuotaWatcher::new(store.clone(), page.clone(), events.clone(), &seed_options);

        Self {
            store,
            page,
            engine,
            watcher,
            events,
            seed_options,
            retry: ReloadTimer::default(),
        }
    }

    pub fn engine(&self) -> &HuntingEngine<P> {
        &self.engine
    }

    pub fn watcher(&self) -> &QuotaWatcher<P> {
        &self.watcher
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn retry_timer(&self) -> &ReloadTimer {
        &self.retry
    }

    /// 选项随时可能被修改，每次使用前重新读取
    async fn load_options(&mut self) -> UserOptions {
        let options = self
            .store
            .options()
            .await
            .unwrap_or(self.seed_options)
            .clamped();
        self.engine.apply_options(&options);
        self.watcher.apply_options(&options);
        options
    }

    /// 页面加载入口
    pub async fn on_page_load(&mut self) -> Result<LoadOutcome> {
        self.retry.cancel();
        self.load_options().await;

        let items = match self.page.parse_options().await {
            Ok(items) => items,
            Err(e) => {
                warn!("解析班级失败: {}", e);
                Vec::new()
            }
        };
        info!("📚 页面加载: 解析到 {} 个班级", items.len());
        self.store
            .set_cached_classes(CachedClasses {
                updated_at: now_ms(),
                items,
            })
            .await?;

        let cycle = self.watcher.check_cycle(&self.engine).await?;
        if matches!(cycle, CycleOutcome::HandedOff { .. }) {
            return Ok(LoadOutcome {
                cycle,
                resume: None,
            });
        }

        let resume = self.engine.resume().await?;
        if let ResumeOutcome::Resumed {
            evaluation: Some(evaluation),
            ..
        } = &resume
        {
            if let NextStep::Retry { after } = evaluation.next {
                self.retry.arm(after);
            }
        }
        Ok(LoadOutcome {
            cycle,
            resume: Some(resume),
        })
    }

    /// 处理一条指令
    pub async fn handle(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::StartHunt => {
                if self.store.watch_enabled().await {
                    self.watcher.enable(false, &self.engine).await?;
                }
                self.retry.cancel();
                self.load_options().await;
                self.engine.start().await?;
            }
            Command::StopHunt => {
                self.retry.cancel();
                self.engine.stop().await?;
            }
            Command::SetPriority(priority) => self.priority_changed(dedupe(priority)).await?,
            Command::AddPriority(raw_value) => self.add_priority(&raw_value).await?,
            Command::RemovePriority(raw_value) => {
                let mut priority = self.store.priority().await;
                let before = priority.len();
                priority.retain(|c| c.raw_value != raw_value);
                if priority.len() == before {
                    warn!("优先级列表中没有 {}", raw_value);
                } else {
                    self.priority_changed(priority).await?;
                }
            }
            Command::PriorityChanged => {
                let priority = self.store.priority().await;
                self.priority_changed(priority).await?;
            }
            Command::CaptchaValue(value) => {
                if self.retry.is_armed() {
                    warn!("正在等待重试，忽略验证码输入");
                    return Ok(Flow::Continue);
                }
                match self.engine.submit_captcha(&value).await {
                    Ok(SubmitOutcome::Submitted) => {
                        self.on_page_load().await?;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // 页面状态未知，刷新后由评估决定下一步
                        warn!("提交验证码失败: {}，刷新页面后继续", e);
                        self.reload_and_resume().await?;
                    }
                }
            }
            Command::RefreshCaptcha => {
                self.engine.refresh_captcha().await?;
            }
            Command::WatchStart => {
                self.load_options().await;
                match self.watcher.enable(true, &self.engine).await {
                    Ok(_) => {}
                    Err(e @ AppError::WatchRejected { .. }) => {
                        self.events.emit(Event::WatchRejected {
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
            Command::WatchStop => {
                self.watcher.enable(false, &self.engine).await?;
            }
            Command::RebuildWatchBaseline => {
                self.watcher.rebuild_baseline().await?;
            }
            Command::SetSectionCollapsed { section, collapsed } => {
                if Category::from_key(&section).is_none() {
                    warn!("未知的类别: {}", section);
                } else {
                    self.store.set_collapsed_section(&section, collapsed).await?;
                }
            }
            Command::Status => {
                let report = self.status().await;
                self.events.emit(Event::Status(report));
            }
            Command::Shutdown => return Ok(Flow::Shutdown),
        }
        Ok(Flow::Continue)
    }

    /// 优先级列表变化：从头开始，监控中则重建基线
    async fn priority_changed(&mut self, priority: Vec<ClassOption>) -> Result<()> {
        self.retry.cancel();
        self.engine.priority_changed(priority).await?;
        if self.store.watch_enabled().await {
            self.watcher.rebuild_baseline().await?;
        }
        Ok(())
    }

    async fn add_priority(&mut self, raw_value: &str) -> Result<()> {
        let classes = self
            .store
            .cached_classes()
            .await
            .map(|c| c.items)
            .unwrap_or_default();
        let Some(class) = classes.into_iter().find(|c| c.raw_value == raw_value) else {
            warn!("页面上找不到班级: {}", raw_value);
            return Ok(());
        };

        let mut priority = self.store.priority().await;
        if priority.iter().any(|c| c.raw_value == raw_value) {
            info!("{} 已在优先级列表中", raw_value);
            return Ok(());
        }
        info!("➕ 加入优先级 #{}: {}", priority.len() + 1, class);
        priority.push(class);
        self.priority_changed(priority).await
    }

    pub async fn status(&self) -> StatusReport {
        let state = self.store.snapshot().await;
        StatusReport {
            run_mode: state.run_mode,
            active_index: state.active_index,
            queue_len: state.watch_queue.len(),
            watch: state.watch_status(),
            pending: state.pending,
            priority: state.priority,
            collapsed: state.collapsed_sections,
        }
    }

    /// 退避结束，对同一候选再试一次
    pub async fn fire_retry(&mut self) -> Result<Option<AttemptOutcome>> {
        self.retry.cancel();
        self.engine.retry_pending().await
    }

    /// 主循环：处理指令，并在计时器到期时刷新页面或重试
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        if let Err(e) = self.on_page_load().await {
            error!("页面加载处理失败: {}", e);
        }

        loop {
            let deadline = self.watcher.timer().deadline();
            let retry_at = self.retry.deadline();
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        info!("指令通道已关闭");
                        break;
                    };
                    match self.handle(command).await {
                        Ok(Flow::Shutdown) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => error!("处理指令失败: {}", e),
                    }
                }
                _ = wait_deadline(deadline) => {
                    if self.watcher.take_due_reload() {
                        if let Err(e) = self.reload_and_resume().await {
                            error!("刷新页面失败: {}", e);
                        }
                    }
                }
                _ = wait_deadline(retry_at) => {
                    if let Err(e) = self.fire_retry().await {
                        error!("重试失败: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    async fn reload_and_resume(&mut self) -> Result<LoadOutcome> {
        info!("🔄 刷新页面");
        self.page.reload().await?;
        self.on_page_load().await
    }
}

/// 去掉重复的 rawValue，保留第一次出现的位置
fn dedupe(priority: Vec<ClassOption>) -> Vec<ClassOption> {
    let mut out: Vec<ClassOption> = Vec::with_capacity(priority.len());
    for class in priority {
        if !out.iter().any(|c| c.raw_value == class.raw_value) {
            out.push(class);
        }
    }
    out
}

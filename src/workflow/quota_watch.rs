//! 名额监控 - 流程层
//!
//! 只在空闲时运行：刷新页面 → 对比基线 → 发现名额增加 → 交给抢课引擎。
//! 网站没有实时数据接口，名额只能通过整页刷新观察到。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::infrastructure::{Event, EventSink, Store};
use crate::models::{
    BaselineEntry, CachedClasses, ClassOption, ExtendedItem, QuotaBaseline, RunMode, UserOptions,
};
use crate::services::{PageActions, PageReader};
use crate::utils::clock::now_ms;
use crate::workflow::hunting::{HuntingEngine, SelectOutcome};

/// 可取消的截止时间：名额监控的下一次刷新，或验证码失败后的重试
#[derive(Debug, Clone, Copy, Default)]
pub struct ReloadTimer {
    deadline: Option<Instant>,
}

impl ReloadTimer {
    pub fn arm(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }
}

/// 等到截止时间；没有截止时间时永远挂起
pub async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// 一轮检查的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 监控未开启或正在抢课
    Inactive,
    /// 发现名额增加，已切换到抢课
    HandedOff {
        items: Vec<ExtendedItem>,
        queue: Vec<String>,
        selection: SelectOutcome,
    },
    /// 已安排下一次刷新
    Scheduled {
        after: Duration,
        extended: Vec<ExtendedItem>,
    },
}

/// 由优先级列表与当前班级生成基线
///
/// 页面没有名额数字的班级记为 None 占位
pub fn build_baseline(
    priority: &[ClassOption],
    classes: &[ClassOption],
    observed_at: i64,
) -> QuotaBaseline {
    let wanted: HashSet<&str> = priority.iter().map(|p| p.raw_value.as_str()).collect();
    classes
        .iter()
        .filter(|c| wanted.contains(c.raw_value.as_str()))
        .map(|c| {
            (
                c.raw_value.clone(),
                BaselineEntry {
                    quota: c.capacity.quota,
                    filled: c.capacity.filled,
                    observed_at,
                },
            )
        })
        .collect()
}

/// 对比基线与当前班级，返回名额增加的条目
///
/// 基线中原本为 None、现在有数字的条目会被就地补全，不算增加
pub fn diff_baseline(baseline: &mut QuotaBaseline, classes: &[ClassOption]) -> Vec<ExtendedItem> {
    let current: HashMap<&str, &ClassOption> =
        classes.iter().map(|c| (c.raw_value.as_str(), c)).collect();

    let mut extended = Vec::new();
    for (raw_value, base) in baseline.iter_mut() {
        let Some(class) = current.get(raw_value.as_str()) else {
            continue;
        };
        match (base.quota, class.capacity.quota) {
            (None, Some(_)) => {
                base.quota = class.capacity.quota;
                base.filled = class.capacity.filled;
            }
            (Some(old_quota), Some(new_quota)) if new_quota > old_quota => {
                extended.push(ExtendedItem {
                    raw_value: raw_value.clone(),
                    display_code: class.label().to_string(),
                    name: class.name.clone(),
                    section: class.section.clone(),
                    category: class.category,
                    old_quota,
                    new_quota,
                    delta: new_quota - old_quota,
                });
            }
            _ => {}
        }
    }
    extended
}

/// 按优先级排序，并生成只包含优先级候选的队列
pub fn queue_from_increases(
    items: &mut [ExtendedItem],
    priority: &[ClassOption],
) -> VecDeque<String> {
    let order: HashMap<&str, usize> = priority
        .iter()
        .enumerate()
        .map(|(i, p)| (p.raw_value.as_str(), i))
        .collect();

    items.sort_by_key(|it| order.get(it.raw_value.as_str()).copied().unwrap_or(usize::MAX));
    items
        .iter()
        .filter(|it| order.contains_key(it.raw_value.as_str()))
        .map(|it| it.raw_value.clone())
        .collect()
}

/// 名额监控
pub struct QuotaWatcher<P> {
    store: Store,
    page: Arc<P>,
    events: EventSink,
    interval: Duration,
    timer: ReloadTimer,
}

impl<P: PageReader + PageActions> QuotaWatcher<P> {
    pub fn new(store: Store, page: Arc<P>, events: EventSink, options: &UserOptions) -> Self {
        Self {
            store,
            page,
            events,
            interval: options.clamped().watch_interval(),
            timer: ReloadTimer::default(),
        }
    }

    pub fn apply_options(&mut self, options: &UserOptions) {
        self.interval = options.clamped().watch_interval();
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timer(&self) -> &ReloadTimer {
        &self.timer
    }

    /// 计时器到期，由调用方负责刷新页面
    pub fn take_due_reload(&mut self) -> bool {
        let due = self
            .timer
            .deadline()
            .is_some_and(|deadline| deadline <= Instant::now());
        if due {
            self.timer.cancel();
        }
        due
    }

    /// 开启 / 关闭监控，只有空闲时允许开启
    pub async fn enable(
        &mut self,
        enable: bool,
        engine: &HuntingEngine<P>,
    ) -> Result<CycleOutcome> {
        if enable {
            let run_mode = self.store.run_mode().await;
            if run_mode != RunMode::Idle {
                warn!("正在抢课，拒绝开启名额监控");
                return Err(AppError::WatchRejected { run_mode });
            }
        }

        self.store.set_watch_enabled(enable).await?;
        self.timer.cancel();

        if enable {
            info!("👀 开启名额监控 (间隔 {} 秒)", self.interval.as_secs());
            self.rebuild_baseline().await?;
            return self.check_cycle(engine).await;
        }

        info!("名额监控已关闭");
        if let Err(e) = self.page.remove_overlay().await {
            debug!("移除提示层失败: {}", e);
        }
        Ok(CycleOutcome::Inactive)
    }

    /// 用当前优先级列表重建基线
    pub async fn rebuild_baseline(&self) -> Result<QuotaBaseline> {
        let state = self.store.snapshot().await;
        let cache = match state.classes.filter(|c| !c.items.is_empty()) {
            Some(cache) => cache,
            None => self.refresh_cache().await?,
        };

        let baseline = build_baseline(&state.priority, &cache.items, cache.updated_at);
        debug!("基线已重建: {} 条", baseline.len());
        self.store.set_watch_baseline(baseline.clone()).await?;
        Ok(baseline)
    }

    async fn refresh_cache(&self) -> Result<CachedClasses> {
        let cache = CachedClasses {
            updated_at: now_ms(),
            items: self.page.parse_options().await?,
        };
        self.store.set_cached_classes(cache.clone()).await?;
        Ok(cache)
    }

    /// 一轮检查
    pub async fn check_cycle(&mut self, engine: &HuntingEngine<P>) -> Result<CycleOutcome> {
        let state = self.store.snapshot().await;
        if !state.watch_enabled || state.run_mode != RunMode::Idle {
            return Ok(CycleOutcome::Inactive);
        }

        let cache = match state.classes.filter(|c| !c.items.is_empty()) {
            Some(cache) => cache,
            None => self.refresh_cache().await?,
        };

        let mut baseline = state.watch_baseline;
        if baseline.is_empty() {
            baseline = build_baseline(&state.priority, &cache.items, cache.updated_at);
        }

        let mut extended = diff_baseline(&mut baseline, &cache.items);
        if !extended.is_empty() {
            let queue = queue_from_increases(&mut extended, &state.priority);
            for item in &extended {
                info!(
                    "📈 名额增加: {} 班级 {} {} → {} (+{})",
                    item.display_code, item.section, item.old_quota, item.new_quota, item.delta
                );
            }

            if let Err(e) = self.page.show_increase_overlay(&extended).await {
                warn!("显示提示层失败: {}", e);
            }
            self.events.emit(Event::WatchFoundIncrease(extended.clone()));

            if !queue.is_empty() {
                return self.hand_off(engine, extended, queue, baseline).await;
            }
            info!("名额增加的班级都不在优先级列表中，继续监控");
        }

        let refreshed = build_baseline(&state.priority, &cache.items, cache.updated_at);
        self.store
            .update(|s| {
                s.watch_baseline = refreshed;
                s.watch_last_check = Some(now_ms());
            })
            .await?;

        self.timer.arm(self.interval);
        debug!("{} 秒后刷新页面", self.interval.as_secs());

        Ok(CycleOutcome::Scheduled {
            after: self.interval,
            extended,
        })
    }

    /// 关闭监控并直接开始抢课
    async fn hand_off(
        &mut self,
        engine: &HuntingEngine<P>,
        items: Vec<ExtendedItem>,
        queue: VecDeque<String>,
        baseline: QuotaBaseline,
    ) -> Result<CycleOutcome> {
        self.timer.cancel();
        let queued: Vec<String> = queue.iter().cloned().collect();
        self.store
            .update(|s| {
                s.watch_enabled = false;
                s.run_mode = RunMode::Hunting;
                s.pending = None;
                s.watch_queue = queue;
                s.watch_baseline = baseline;
                s.watch_last_check = Some(now_ms());
            })
            .await?;

        info!("🎯 切换到抢课，队列 {} 个候选", queued.len());
        let selection = engine.select_next(true).await?;

        Ok(CycleOutcome::HandedOff {
            items,
            queue: queued,
            selection,
        })
    }
}

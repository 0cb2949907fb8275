//! 抢课引擎 - 流程层
//!
//! 每个候选的处理周期：
//! 1. 选择候选（名额队列优先，否则按 ActiveIndex）
//! 2. 写入 PendingAttempt → 截取验证码 → 填写表单，等待操作员输入验证码
//! 3. 提交导致整页刷新，刷新后评估结果：前进 / 退避后重试 / 放弃
//!
//! 所有进度都在存储里，页面刷新后调用 `resume()` 即可继续。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::infrastructure::Store;
use crate::models::{
    CaptchaMeta, CaptchaSnapshot, ClassOption, PendingAttempt, RunMode, UserOptions,
};
use crate::services::{CaptchaImage, CaptchaRelay, Notifier, PageActions, PageReader};
use crate::utils::clock::now_ms;
use crate::workflow::candidate_ctx::CandidateCtx;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HuntSettings {
    pub max_captcha_attempts: u32,
    pub backoff: Duration,
}

impl HuntSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_captcha_attempts: config.seed_options().max_captcha_attempts,
            backoff: Duration::from_millis(config.captcha_backoff_ms),
        }
    }

    pub fn apply_options(&mut self, options: &UserOptions) {
        self.max_captcha_attempts = options.clamped().max_captcha_attempts;
    }
}

impl Default for HuntSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 一次尝试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 表单已填好，等待验证码
    AwaitingCaptcha { raw_value: String, attempt: u32 },
    /// 页面结构不匹配，已停止抢课
    Aborted { reason: String },
}

/// 选择下一个候选的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    NotHunting,
    /// 所有候选都已尝试，回到空闲
    Completed,
    Attempted(AttemptOutcome),
}

/// 刷新后对上一次尝试的判断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 结果表格中已出现该课程
    Success,
    /// 班级确实已满
    Full,
    /// 页面上已经没有这个班级
    Unavailable,
    /// 推定为验证码错误
    CaptchaError,
}

/// 评估之后该做什么
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// 验证码可能错误，退避之后由调用方触发 `retry_pending`
    Retry { after: Duration },
    SelectNext { force_restart: bool },
    /// 名额队列已处理完（或抢课已停止）
    Idle,
}

/// 评估结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// 验证码重试次数用尽
    pub exhausted: bool,
    pub next: NextStep,
}

/// 页面加载后恢复的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Idle,
    Resumed {
        evaluation: Option<Evaluation>,
        selection: Option<SelectOutcome>,
    },
}

/// 提交验证码的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// 已提交，页面完成导航
    Submitted,
    Ignored,
    Aborted,
}

/// 抢课引擎
///
/// - 不在内存中保存进度，所有状态都读写 Store
/// - 只通过 PageReader / PageActions 接触页面
pub struct HuntingEngine<P> {
    store: Store,
    page: Arc<P>,
    relay: CaptchaRelay,
    notifier: Notifier,
    settings: HuntSettings,
}

impl<P: PageReader + PageActions> HuntingEngine<P> {
    pub fn new(
        store: Store,
        page: Arc<P>,
        relay: CaptchaRelay,
        notifier: Notifier,
        settings: HuntSettings,
    ) -> Self {
        Self {
            store,
            page,
            relay,
            notifier,
            settings,
        }
    }

    pub fn apply_options(&mut self, options: &UserOptions) {
        self.settings.apply_options(options);
    }

    /// 从第一个候选开始抢课
    pub async fn start(&self) -> Result<SelectOutcome> {
        self.store
            .update(|s| {
                s.pending = None;
                s.active_index = 0;
                s.run_mode = RunMode::Hunting;
                s.watch_queue.clear();
            })
            .await?;
        info!("🚀 开始抢课");
        self.select_next(false).await
    }

    /// 无条件停止：进行中的尝试随时可以从存储恢复，所以直接清空
    pub async fn stop(&self) -> Result<()> {
        self.store
            .update(|s| {
                s.run_mode = RunMode::Idle;
                s.pending = None;
                s.active_index = 0;
                s.last_captcha = None;
                s.watch_queue.clear();
            })
            .await?;
        info!("⏹ 已停止抢课");
        Ok(())
    }

    /// 优先级列表变化后从头开始，不在抢课时只保存列表
    pub async fn priority_changed(&self, priority: Vec<ClassOption>) -> Result<SelectOutcome> {
        self.store
            .update(|s| {
                s.priority = priority;
                s.active_index = 0;
            })
            .await?;
        self.select_next(true).await
    }

    /// 选择下一个候选并发起尝试
    pub async fn select_next(&self, force_restart: bool) -> Result<SelectOutcome> {
        loop {
            let state = self.store.snapshot().await;
            if state.run_mode != RunMode::Hunting {
                return Ok(SelectOutcome::NotHunting);
            }

            // 名额队列优先，队首在尝试有结果后才出队
            if let Some(head) = state.watch_queue.front().cloned() {
                if let Some(index) = state.priority.iter().position(|c| c.raw_value == head) {
                    let candidate = &state.priority[index];
                    info!("📣 名额增加，优先尝试 {}", candidate.label());
                    return self
                        .attempt_candidate(candidate, index)
                        .await
                        .map(SelectOutcome::Attempted);
                }

                warn!("队列中的 {} 已不在优先级列表中，丢弃", head);
                self.store
                    .update(|s| {
                        if s.watch_queue.front() == Some(&head) {
                            s.watch_queue.pop_front();
                        }
                    })
                    .await?;
                continue;
            }

            let index = if force_restart { 0 } else { state.active_index };
            let Some(candidate) = state.priority.get(index) else {
                self.notifier.notify("完成", "所有候选都已尝试。");
                self.store
                    .update(|s| {
                        s.run_mode = RunMode::Idle;
                        s.pending = None;
                    })
                    .await?;
                return Ok(SelectOutcome::Completed);
            };

            return self
                .attempt_candidate(candidate, index)
                .await
                .map(SelectOutcome::Attempted);
        }
    }

    /// 对一个候选发起尝试，停在等待验证码的状态
    pub async fn attempt_candidate(
        &self,
        candidate: &ClassOption,
        index: usize,
    ) -> Result<AttemptOutcome> {
        let timestamp = now_ms();
        let pending = self
            .store
            .update(|s| {
                let previous = s
                    .pending
                    .as_ref()
                    .filter(|p| p.raw_value == candidate.raw_value)
                    .map(|p| p.attempt_count)
                    .unwrap_or(0);
                let pending = PendingAttempt::new(candidate, previous + 1, timestamp);
                s.pending = Some(pending.clone());
                s.active_index = index;
                pending
            })
            .await?;

        let ctx = CandidateCtx::from(&pending);
        info!("{} 🎯 尝试抢课 (优先级 #{})", ctx, index + 1);

        // 表单不完整时不向操作员索要验证码
        if let Err(e) = self.page.ensure_form().await {
            return self.abort_on(e).await;
        }

        let image = match self.page.capture_captcha().await {
            Ok(image) => image,
            Err(e) => {
                warn!("{} 截取验证码失败: {}", ctx, e);
                CaptchaImage::failed(String::new())
            }
        };
        debug!("{} 验证码来源: {:?}", ctx, image.via);

        self.relay
            .publish(CaptchaSnapshot {
                image: image.data_url,
                image_url: image.image_url,
                source_context_id: self.page.context_id(),
                meta: Some(CaptchaMeta::for_attempt(&pending)),
                captured_at: now_ms(),
            })
            .await;

        if let Err(e) = self.page.prepare_claim(&candidate.raw_value).await {
            return self.abort_on(e).await;
        }

        Ok(AttemptOutcome::AwaitingCaptcha {
            raw_value: pending.raw_value,
            attempt: pending.attempt_count,
        })
    }

    /// 页面结构不匹配：提示用户并停止，其余错误继续向上抛
    async fn abort_on(&self, err: AppError) -> Result<AttemptOutcome> {
        if !err.is_structural() {
            return Err(err);
        }

        let reason = err.to_string();
        error!("❌ {}", reason);
        if let Err(e) = self.page.alert(&reason).await {
            warn!("页面弹窗失败: {}", e);
        }
        self.notifier.notify("页面结构错误", &reason);
        self.stop().await?;

        Ok(AttemptOutcome::Aborted { reason })
    }

    /// 操作员送来了验证码
    pub async fn submit_captcha(&self, value: &str) -> Result<SubmitOutcome> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }

        let state = self.store.snapshot().await;
        let Some(pending) = state.pending.filter(|_| state.run_mode == RunMode::Hunting) else {
            warn!("没有等待验证码的尝试，忽略输入");
            return Ok(SubmitOutcome::Ignored);
        };

        info!("{} 📤 提交验证码", CandidateCtx::from(&pending));
        match self.page.submit_captcha(value).await {
            Ok(()) => Ok(SubmitOutcome::Submitted),
            Err(e) => {
                self.abort_on(e).await?;
                Ok(SubmitOutcome::Aborted)
            }
        }
    }

    /// 换一张验证码并重新发布
    pub async fn refresh_captcha(&self) -> Result<bool> {
        let Some(image) = self.page.refresh_captcha().await? else {
            warn!("无法刷新验证码图片");
            return Ok(false);
        };

        let meta = self.store.pending().await.as_ref().map(CaptchaMeta::for_attempt);
        self.relay
            .publish(CaptchaSnapshot {
                image: image.data_url,
                image_url: image.image_url,
                source_context_id: self.page.context_id(),
                meta,
                captured_at: now_ms(),
            })
            .await;
        Ok(true)
    }

    /// 刷新后评估上一次尝试
    pub async fn evaluate_after_reload(&self, pending: PendingAttempt) -> Result<Evaluation> {
        let ctx = CandidateCtx::from(&pending);
        let queue_was_empty = self.store.watch_queue().await.is_empty();
        let verdict = self.judge(&pending).await;
        info!("{} 📋 评估结果: {:?}", ctx, verdict);

        let label = pending.label();
        match verdict {
            Verdict::Success => self.notifier.notify(
                "成功",
                &format!("已选上 {} 班级 {}。", label, pending.section),
            ),
            Verdict::Full => self.notifier.notify(
                "班级已满",
                &format!("{} 班级 {} 已满，继续下一个候选。", label, pending.section),
            ),
            Verdict::Unavailable => self.notifier.notify(
                "班级不可用",
                &format!("{} 班级 {} 已不在页面上，跳过。", label, pending.section),
            ),
            Verdict::CaptchaError => {
                if pending.attempt_count < self.settings.max_captcha_attempts {
                    warn!(
                        "{} ⚠️ 验证码可能错误，{} ms 后重试",
                        ctx,
                        self.settings.backoff.as_millis()
                    );
                    return Ok(Evaluation {
                        verdict,
                        exhausted: false,
                        next: NextStep::Retry {
                            after: self.settings.backoff,
                        },
                    });
                }
                self.notifier.notify(
                    "验证码失败",
                    &format!("{} 班级 {} 尝试次数过多，跳过。", label, pending.section),
                );
            }
        }

        let raw_value = pending.raw_value.clone();
        let next = self
            .store
            .update(|s| {
                s.pending = None;
                if queue_was_empty {
                    s.active_index += 1;
                }
                if s.watch_queue.front() == Some(&raw_value) {
                    s.watch_queue.pop_front();
                    if s.watch_queue.is_empty() {
                        s.run_mode = RunMode::Idle;
                        return NextStep::Idle;
                    }
                    return NextStep::SelectNext {
                        force_restart: true,
                    };
                }
                NextStep::SelectNext {
                    force_restart: false,
                }
            })
            .await?;

        if next == NextStep::Idle {
            info!("名额队列已处理完，回到空闲");
        }

        Ok(Evaluation {
            verdict,
            exhausted: verdict == Verdict::CaptchaError,
            next,
        })
    }

    /// 退避结束后对同一候选再试一次
    ///
    /// 退避期间已被停止时返回 None
    pub async fn retry_pending(&self) -> Result<Option<AttemptOutcome>> {
        let state = self.store.snapshot().await;
        if state.run_mode != RunMode::Hunting {
            debug!("抢课已停止，取消重试");
            return Ok(None);
        }
        let Some(pending) = state.pending else {
            return Ok(None);
        };

        // 优先使用最新缓存中的班级信息
        let candidate = state
            .classes
            .as_ref()
            .and_then(|c| c.items.iter().find(|c| c.raw_value == pending.raw_value))
            .or_else(|| state.priority.iter().find(|c| c.raw_value == pending.raw_value))
            .cloned()
            .unwrap_or_else(|| pending.to_candidate());

        self.attempt_candidate(&candidate, state.active_index)
            .await
            .map(Some)
    }

    /// 判断上一次尝试的结果
    ///
    /// 读取页面失败时按验证码错误处理，交给重试逻辑
    async fn judge(&self, pending: &PendingAttempt) -> Verdict {
        if self.is_acquired(pending).await {
            return Verdict::Success;
        }

        let classes = match self.page.parse_options().await {
            Ok(classes) => classes,
            Err(e) => {
                warn!("重新解析班级失败: {}", e);
                Vec::new()
            }
        };

        match classes.iter().find(|c| c.raw_value == pending.raw_value) {
            Some(found) if found.capacity.is_full() => Verdict::Full,
            Some(_) => Verdict::CaptchaError,
            // 整个列表为空说明选项还没渲染出来，不能断定班级已消失
            None if classes.is_empty() => Verdict::CaptchaError,
            None => Verdict::Unavailable,
        }
    }

    async fn is_acquired(&self, pending: &PendingAttempt) -> bool {
        for code in [pending.display_code.as_str(), pending.value_code.as_str()] {
            if code.is_empty() {
                continue;
            }
            match self.page.is_acquired(code, &pending.section).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!("读取结果表格失败: {}", e),
            }
        }
        false
    }

    /// 页面加载后的唯一入口：先评估上一次尝试，再选择下一个候选
    pub async fn resume(&self) -> Result<ResumeOutcome> {
        let state = self.store.snapshot().await;
        if state.run_mode != RunMode::Hunting {
            return Ok(ResumeOutcome::Idle);
        }

        let evaluation = match state.pending {
            Some(pending) => Some(self.evaluate_after_reload(pending).await?),
            None => None,
        };

        let selection = match evaluation.as_ref().map(|e| e.next) {
            None => Some(self.select_next(false).await?),
            Some(NextStep::SelectNext { force_restart }) => {
                Some(self.select_next(force_restart).await?)
            }
            Some(NextStep::Retry { .. }) | Some(NextStep::Idle) => None,
        };

        Ok(ResumeOutcome::Resumed {
            evaluation,
            selection,
        })
    }
}

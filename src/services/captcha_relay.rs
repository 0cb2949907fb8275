//! 验证码中转 - 业务能力层
//!
//! 只负责"把最新的验证码交给操作员"，不关心流程

use tracing::{info, warn};

use crate::infrastructure::{Event, EventSink, Store};
use crate::models::CaptchaSnapshot;

/// 验证码中转
///
/// 存储中的快照是唯一可信来源，新的快照直接覆盖旧的
#[derive(Clone)]
pub struct CaptchaRelay {
    store: Store,
    events: EventSink,
}

impl CaptchaRelay {
    pub fn new(store: Store, events: EventSink) -> Self {
        Self { store, events }
    }

    /// 保存快照并通知操作员，失败只记录日志
    pub async fn publish(&self, snapshot: CaptchaSnapshot) {
        if snapshot.image.is_empty() {
            warn!("验证码图片截取失败，操作员需直接查看页面");
        }
        if let Err(e) = self.store.set_last_captcha(Some(snapshot.clone())).await {
            warn!("保存验证码快照失败: {}", e);
        }

        if let Some(meta) = &snapshot.meta {
            info!("🔐 需要验证码: {} (第 {} 次)", meta.title, meta.attempt);
        }
        self.events.emit(Event::NeedCaptcha(snapshot));
    }
}

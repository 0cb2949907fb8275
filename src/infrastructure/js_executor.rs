//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS / 刷新页面"的能力

use chromiumoxide::cdp::browser_protocol::page::EventLoadEventFired;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

use crate::error::{AppError, Result};

/// 等待新文档加载完成的上限
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 与导航能力
/// - 不认识班级 / 候选
/// - 不处理抢课流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 标签页标识，用于把验证码值送回同一个页面
    pub fn context_id(&self) -> String {
        self.page.target_id().inner().clone()
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> Result<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 执行会触发导航的脚本，返回时新文档已触发 load 事件
    ///
    /// 监听在脚本执行之前注册，旧文档的状态不会被误认为导航完成
    pub async fn eval_and_wait_load(&self, js_code: impl Into<String>) -> Result<()> {
        let mut loads = self.page.event_listener::<EventLoadEventFired>().await?;
        self.eval(js_code).await?;
        wait_for_load(&mut loads, NAVIGATION_TIMEOUT).await?;
        debug!("页面导航完成");
        Ok(())
    }

    /// 整页刷新，返回时新文档已加载
    pub async fn reload(&self) -> Result<()> {
        let mut loads = self.page.event_listener::<EventLoadEventFired>().await?;
        self.page.reload().await?;
        wait_for_load(&mut loads, NAVIGATION_TIMEOUT).await?;
        debug!("页面已刷新");
        Ok(())
    }
}

/// 等待 load 事件流中的下一个事件
pub async fn wait_for_load<S>(loads: &mut S, timeout: Duration) -> Result<()>
where
    S: Stream + Unpin,
{
    match tokio::time::timeout(timeout, loads.next()).await {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(AppError::Script("页面事件流已关闭".to_string())),
        Err(_) => Err(AppError::Script(format!(
            "等待页面加载超时 ({} 秒)",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn load_event_completes_wait() {
        let mut loads = stream::iter(vec![()]);
        assert_ok!(wait_for_load(&mut loads, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn no_load_event_times_out() {
        // 旧文档已加载完毕但新文档迟迟不来
        let mut loads = stream::pending::<()>();
        let err = assert_err!(wait_for_load(&mut loads, Duration::from_secs(30)).await);
        assert!(matches!(err, AppError::Script(_)));
    }

    #[tokio::test]
    async fn closed_stream_is_an_error() {
        let mut loads = stream::empty::<()>();
        assert_err!(wait_for_load(&mut loads, Duration::from_secs(1)).await);
    }
}

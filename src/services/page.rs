//! 页面能力接口 - 业务能力层
//!
//! 抢课流程只通过这两个 trait 接触页面，测试时可以注入合成数据。

#![allow(async_fn_in_trait)]

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ClassOption, ExtendedItem};

/// 页面读取：班级列表 + 已选课程表
pub trait PageReader {
    /// 解析页面上所有可选班级
    async fn parse_options(&self) -> Result<Vec<ClassOption>>;

    /// 结果表格中是否已经列出该课程与班级
    async fn is_acquired(&self, code: &str, section: &str) -> Result<bool>;
}

/// 验证码图片的获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureSource {
    /// 页面上的图片已加载，直接绘制
    InPlace,
    /// 等待新图片加载后绘制
    Load,
    /// 直接拉取原始字节
    Fetch,
    Failed,
}

/// 截取到的验证码图片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptchaImage {
    pub image_url: String,
    /// data URL，失败时为空
    pub data_url: String,
    pub via: CaptureSource,
}

impl CaptchaImage {
    pub fn failed(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            data_url: String::new(),
            via: CaptureSource::Failed,
        }
    }
}

/// 页面操作：表单、验证码、刷新、提示
pub trait PageActions {
    /// 检查提交表单必需的元素，缺失时返回 `StructuralMismatch`
    async fn ensure_form(&self) -> Result<()>;

    /// 填入动作码与候选 rawValue，清空旧的验证码
    async fn prepare_claim(&self, raw_value: &str) -> Result<()>;

    /// 截取当前验证码图片
    async fn capture_captcha(&self) -> Result<CaptchaImage>;

    /// 换一张验证码，图片不存在或加载失败时返回 None
    async fn refresh_captcha(&self) -> Result<Option<CaptchaImage>>;

    /// 填入验证码并提交，返回时提交后的新文档已加载
    async fn submit_captcha(&self, value: &str) -> Result<()>;

    /// 整页刷新
    async fn reload(&self) -> Result<()>;

    async fn show_increase_overlay(&self, items: &[ExtendedItem]) -> Result<()>;

    async fn remove_overlay(&self) -> Result<()>;

    /// 页面内弹窗提示
    async fn alert(&self, message: &str) -> Result<()>;

    /// 页面上下文标识
    fn context_id(&self) -> String;
}

//! 错误类型
//!
//! 抢课流程内部的错误在本地消化（重试 / 跳过 / 回到空闲），
//! 只有页面结构不匹配会直接提示给用户。

use thiserror::Error;

use crate::models::RunMode;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 页面缺少必需的表单元素（网站结构已变化，不可重试）
    #[error("FRS 表单结构已变化，缺少元素: {missing}")]
    StructuralMismatch { missing: String },

    /// 只有空闲状态才能开启名额监控
    #[error("当前模式为 {run_mode}，必须空闲才能开启名额监控")]
    WatchRejected { run_mode: RunMode },

    /// 浏览器 / CDP 错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// 页面脚本返回了意外的结果
    #[error("脚本执行失败: {0}")]
    Script(String),

    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML 解析失败
    #[error("TOML解析失败: {0}")]
    Toml(#[from] toml::de::Error),

    /// 文件读写失败
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),

    /// 状态存储错误
    #[error("状态存储错误: {0}")]
    Store(String),

    /// 消息通道已关闭
    #[error("消息通道已关闭")]
    ChannelClosed,
}

impl AppError {
    /// 创建结构不匹配错误
    pub fn missing(element: impl Into<String>) -> Self {
        AppError::StructuralMismatch {
            missing: element.into(),
        }
    }

    /// 是否属于页面结构不匹配（需要提示用户）
    pub fn is_structural(&self) -> bool {
        matches!(self, AppError::StructuralMismatch { .. })
    }
}

/// 应用程序结果类型
pub type Result<T> = std::result::Result<T, AppError>;

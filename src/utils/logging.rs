//! 日志工具模块
//!
//! 日志统一走 tracing，RUST_LOG 可以覆盖默认级别

use anyhow::Result;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化 tracing 订阅者，重复调用时忽略
pub fn init(verbose: bool) {
    let default_level = if verbose { "frs_auto_taker=debug,info" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\nFRS 抢课日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    let options = config.seed_options();
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - FRS 自动抢课");
    info!("🌐 目标页面: {}", config.target_url);
    info!("💾 状态文件: {}", config.state_file);
    info!(
        "🔁 验证码最多 {} 次 | 名额监控间隔 {} 秒",
        options.max_captcha_attempts, options.watch_interval_secs
    );
    info!("{}", "=".repeat(60));
}

/// 记录程序退出信息
pub fn log_shutdown(config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!(
        "👋 程序退出: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("状态已保存至: {}", config.state_file);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate_text("Basis Data", 20), "Basis Data");
        assert_eq!(truncate_text("Pemrograman Web", 4), "Pemr...");
        assert_eq!(truncate_text("数据结构与算法", 4), "数据结构...");
    }
}

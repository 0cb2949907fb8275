use crate::models::UserOptions;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// FRS 页面 URL
    pub target_url: String,
    /// 用于查找已打开标签页的标题片段
    pub target_title: String,
    /// 持久化状态文件
    pub state_file: String,
    /// 优先级列表（TOML）
    pub priority_file: String,
    /// 每个候选的验证码最大尝试次数
    pub max_captcha_attempts: u32,
    /// 名额监控的刷新间隔（秒）
    pub watch_interval_secs: u64,
    /// 验证码失败后的固定退避（毫秒）
    pub captcha_backoff_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            target_url: "https://akademik.its.ac.id/list_frs.php".to_string(),
            target_title: "FRS".to_string(),
            state_file: "frs_state.json".to_string(),
            priority_file: "priority.toml".to_string(),
            max_captcha_attempts: UserOptions::DEFAULT_MAX_CAPTCHA_ATTEMPTS,
            watch_interval_secs: UserOptions::DEFAULT_WATCH_INTERVAL_SECS,
            captcha_backoff_ms: 3000,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.browser_debug_port),
            target_url: std::env::var("TARGET_URL").unwrap_or(default.target_url),
            target_title: std::env::var("TARGET_TITLE").unwrap_or(default.target_title),
            state_file: std::env::var("STATE_FILE").unwrap_or(default.state_file),
            priority_file: std::env::var("PRIORITY_FILE").unwrap_or(default.priority_file),
            max_captcha_attempts: std::env::var("MAX_CAPTCHA_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_captcha_attempts),
            watch_interval_secs: std::env::var("WATCH_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.watch_interval_secs),
            captcha_backoff_ms: std::env::var("CAPTCHA_BACKOFF_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.captcha_backoff_ms),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    /// 由环境配置得到的初始用户选项（已限制在合法范围内）
    pub fn seed_options(&self) -> UserOptions {
        UserOptions {
            max_captcha_attempts: self.max_captcha_attempts,
            watch_interval_secs: self.watch_interval_secs,
        }
        .clamped()
    }
}

//! 控制台 - 编排层
//!
//! 操作员在终端里输入指令或验证码，页面代理的事件在这里打印出来。
//!
//! | 输入 | 指令 |
//! |------|------|
//! | `start` / `stop` | 开始 / 停止抢课 |
//! | `watch on` / `watch off` | 开启 / 关闭名额监控 |
//! | `baseline` | 重建名额基线 |
//! | `refresh` | 换一张验证码 |
//! | `status` / `list` | 打印状态 |
//! | `add <rawValue>` / `remove <rawValue>` | 修改优先级列表 |
//! | `collapse <类别>` / `expand <类别>` | 状态列表中折叠 / 展开一个类别 |
//! | `captcha <值>` 或其它任意文本 | 提交验证码 |
//! | `quit` / `exit` | 退出 |

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::infrastructure::{Bus, Command, Event, StatusReport};
use crate::models::Category;
use crate::utils::logging::truncate_text;

/// 把一行输入解析成指令，空行返回 None
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match (verb.to_lowercase().as_str(), rest) {
        ("start", "") => Command::StartHunt,
        ("stop", "") => Command::StopHunt,
        ("watch", "on") => Command::WatchStart,
        ("watch", "off") => Command::WatchStop,
        ("baseline", "") => Command::RebuildWatchBaseline,
        ("refresh", "") => Command::RefreshCaptcha,
        ("status", "") | ("list", "") => Command::Status,
        ("add", raw) if !raw.is_empty() => Command::AddPriority(raw.to_string()),
        ("remove", raw) if !raw.is_empty() => Command::RemovePriority(raw.to_string()),
        ("collapse", section) if !section.is_empty() => Command::SetSectionCollapsed {
            section: section.to_lowercase(),
            collapsed: true,
        },
        ("expand", section) if !section.is_empty() => Command::SetSectionCollapsed {
            section: section.to_lowercase(),
            collapsed: false,
        },
        ("captcha", value) if !value.is_empty() => Command::CaptchaValue(value.to_string()),
        ("quit", "") | ("exit", "") => Command::Shutdown,
        _ => Command::CaptchaValue(line.to_string()),
    };
    Some(command)
}

/// 读取标准输入并转发指令，输入结束或收到 quit 时返回
pub async fn run_console(bus: Bus) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("⌨️ 控制台已就绪，输入 status 查看状态");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("标准输入已关闭");
                break;
            }
            Err(e) => {
                warn!("读取标准输入失败: {}", e);
                break;
            }
        };

        let Some(command) = parse_line(&line) else {
            continue;
        };
        let shutdown = command == Command::Shutdown;
        if let Err(e) = bus.send(command).await {
            debug!("页面代理已退出: {}", e);
            break;
        }
        if shutdown {
            break;
        }
    }
}

/// 打印页面代理发出的事件
pub async fn print_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("丢失了 {} 条事件", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &Event) {
    match event {
        Event::Notify { title, message } => info!("🔔 [{}] {}", title, message),
        Event::NeedCaptcha(snapshot) => {
            match &snapshot.meta {
                Some(meta) => info!(
                    "🔐 需要验证码: {} ({}) 类别 {} 第 {} 次",
                    meta.title,
                    truncate_text(&meta.description, 40),
                    meta.category,
                    meta.attempt
                ),
                None => info!("🔐 需要验证码"),
            }
            if snapshot.image.is_empty() {
                warn!("验证码图片截取失败，请在浏览器中查看: {}", snapshot.image_url);
            } else {
                debug!("验证码图片 {} 字节", snapshot.image.len());
            }
            info!("请在浏览器标签页中查看验证码，输入后回车");
        }
        Event::WatchFoundIncrease(items) => {
            // 终端响铃
            print!("\x07");
            info!("📈 发现 {} 个班级名额增加", items.len());
            for item in items {
                info!(
                    "   {} - {} / 班级 {} / 名额 {} → {} (+{})",
                    item.display_code,
                    truncate_text(&item.name, 30),
                    item.section,
                    item.old_quota,
                    item.new_quota,
                    item.delta
                );
            }
        }
        Event::WatchRejected { reason } => warn!("⚠️ {}", reason),
        Event::Status(report) => print_status(report),
    }
}

fn print_status(report: &StatusReport) {
    info!("{}", "─".repeat(60));
    info!(
        "📊 模式: {} | 当前位置: #{} | 名额队列: {}",
        report.run_mode,
        report.active_index + 1,
        report.queue_len
    );
    match &report.pending {
        Some(pending) => info!(
            "⏳ 等待验证码: {} 班级 {} (第 {} 次)",
            pending.label(),
            pending.section,
            pending.attempt_count
        ),
        None => info!("⏳ 没有进行中的尝试"),
    }
    info!(
        "👀 名额监控: {} | 基线 {} 条",
        if report.watch.enabled { "开启" } else { "关闭" },
        report.watch.baseline_size
    );
    if report.priority.is_empty() {
        info!("优先级列表为空，使用 add <rawValue> 添加");
    }
    for category in Category::ALL {
        let entries: Vec<_> = report
            .priority
            .iter()
            .enumerate()
            .filter(|(_, c)| c.category == category)
            .collect();
        if entries.is_empty() {
            continue;
        }
        if is_collapsed(report, category) {
            info!("▸ [{}] 已折叠 {} 个候选", category, entries.len());
            continue;
        }
        info!("▾ [{}]", category);
        for (i, class) in entries {
            let marker = if i == report.active_index { "▶" } else { " " };
            info!("{} #{} {} [{}]", marker, i + 1, class, class.raw_value);
        }
    }
    info!("{}", "─".repeat(60));
}

fn is_collapsed(report: &StatusReport, category: Category) -> bool {
    report.collapsed.get(category.key()).copied().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_words() {
        assert_eq!(parse_line("start"), Some(Command::StartHunt));
        assert_eq!(parse_line("  STOP "), Some(Command::StopHunt));
        assert_eq!(parse_line("watch on"), Some(Command::WatchStart));
        assert_eq!(parse_line("watch off"), Some(Command::WatchStop));
        assert_eq!(parse_line("list"), Some(Command::Status));
        assert_eq!(parse_line("quit"), Some(Command::Shutdown));
    }

    #[test]
    fn parses_priority_edits() {
        assert_eq!(
            parse_line("add IF1234|A|2023|51100"),
            Some(Command::AddPriority("IF1234|A|2023|51100".to_string()))
        );
        assert_eq!(
            parse_line("remove IF1234|A|2023|51100"),
            Some(Command::RemovePriority("IF1234|A|2023|51100".to_string()))
        );
    }

    #[test]
    fn parses_section_toggles() {
        assert_eq!(
            parse_line("collapse TPB"),
            Some(Command::SetSectionCollapsed {
                section: "tpb".to_string(),
                collapsed: true,
            })
        );
        assert_eq!(
            parse_line("expand jur"),
            Some(Command::SetSectionCollapsed {
                section: "jur".to_string(),
                collapsed: false,
            })
        );
    }

    #[test]
    fn other_text_is_a_captcha_value() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("x7k2pq"), Some(Command::CaptchaValue("x7k2pq".to_string())));
        assert_eq!(
            parse_line("captcha start"),
            Some(Command::CaptchaValue("start".to_string()))
        );
        // 缺参数的 add 当作验证码
        assert_eq!(parse_line("add"), Some(Command::CaptchaValue("add".to_string())));
    }
}

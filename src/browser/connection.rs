use anyhow::Result;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 连接到已开启调试端口的浏览器，并找到 FRS 标签页
///
/// 优先复用 URL 匹配的标签页，其次是标题匹配的，都没有时新开一个
pub async fn connect_to_browser_and_page(
    port: u16,
    target_url: Option<&str>,
    target_title: Option<&str>,
) -> Result<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);
    debug!("目标 URL: {:?}, 目标标题: {:?}", target_url, target_title);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        e
    })?;

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个标签页", pages.len());

    if let Some(url) = target_url {
        for p in pages.iter() {
            if let Ok(Some(page_url)) = p.url().await {
                if page_url.starts_with(url) {
                    info!("✓ 找到 FRS 标签页: {}", page_url);
                    return Ok((browser, p.clone()));
                }
            }
        }
    }

    if let Some(title) = target_title {
        for p in pages.iter() {
            if let Ok(Some(page_title)) = p.get_title().await {
                debug!("检查标签页标题: {}", page_title);
                if page_title.contains(title) {
                    info!("✓ 找到 FRS 标签页: {}", page_title);
                    return Ok((browser, p.clone()));
                }
            }
        }
    }

    debug!("未找到匹配的标签页，将新开一个");
    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新标签页失败: {}", e);
        e
    })?;
    if let Some(url) = target_url {
        page.goto(url).await.map_err(|e| {
            error!("导航到 {} 失败: {}", url, e);
            e
        })?;
        info!("已打开: {} (如需登录请在浏览器中完成)", url);
    }

    Ok((browser, page))
}

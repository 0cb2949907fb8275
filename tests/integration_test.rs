use frs_auto_taker::browser::connect_to_browser_and_page;
use frs_auto_taker::config::Config;
use frs_auto_taker::infrastructure::JsExecutor;
use frs_auto_taker::services::{FrsPage, PageActions, PageReader};
use frs_auto_taker::utils::logging;

// 需要一个以 --remote-debugging-port 启动、并已登录 FRS 的浏览器

#[tokio::test]
#[ignore] // 默认忽略，需要手动运行：cargo test -- --ignored
async fn test_browser_connection() {
    logging::init(true);
    let config = Config::from_env();

    let result = connect_to_browser_and_page(
        config.browser_debug_port,
        Some(&config.target_url),
        Some(&config.target_title),
    )
    .await;

    assert!(result.is_ok(), "应该能够成功连接浏览器");
}

#[tokio::test]
#[ignore]
async fn test_parse_live_frs_page() {
    logging::init(true);
    let config = Config::from_env();

    let (_browser, page) = connect_to_browser_and_page(
        config.browser_debug_port,
        Some(&config.target_url),
        Some(&config.target_title),
    )
    .await
    .expect("连接浏览器失败");
    let page = FrsPage::new(JsExecutor::new(page));

    page.ensure_form().await.expect("FRS 表单应当存在");
    let classes = page.parse_options().await.expect("解析班级失败");
    println!("找到 {} 个班级", classes.len());
    for class in classes.iter().take(10) {
        println!("  {} [{}]", class, class.raw_value);
    }
    assert!(classes.iter().all(|c| !c.raw_value.is_empty()));
}

#[tokio::test]
#[ignore]
async fn test_live_reload_waits_for_new_document() {
    logging::init(true);
    let config = Config::from_env();

    let (_browser, page) = connect_to_browser_and_page(
        config.browser_debug_port,
        Some(&config.target_url),
        Some(&config.target_title),
    )
    .await
    .expect("连接浏览器失败");
    let executor = JsExecutor::new(page);

    executor
        .eval("window.__frsMarker = 1")
        .await
        .expect("写入标记失败");
    executor.reload().await.expect("刷新失败");

    // 旧文档上的标记不应留到新文档
    let fresh: bool = executor
        .eval_as("window.__frsMarker === undefined")
        .await
        .expect("读取标记失败");
    assert!(fresh);
}

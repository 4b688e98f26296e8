use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult, BrowserError};

/// 连接到调试端口上的浏览器
///
/// 事件处理器在后台任务中持续排空。这里只负责建立连接，
/// 不创建任何页面，目标标签页必须已经由用户打开。
pub async fn connect_to_browser(port: u16) -> AppResult<Browser> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::browser_connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    Ok(browser)
}

/// 按 URL 特征查找已打开的标签页
///
/// 返回第一个 URL 包含 `pattern` 的页面；找不到时返回 None，
/// 由调用方决定是否中止本轮处理。
pub async fn find_page_by_url(browser: &Browser, pattern: &str) -> AppResult<Option<Page>> {
    let pages = browser
        .pages()
        .await
        .map_err(|e| {
            AppError::Browser(BrowserError::PageListFailed {
                source: Box::new(e),
            })
        })?;
    debug!("获取到 {} 个页面", pages.len());

    for p in pages.iter() {
        match p.url().await {
            Ok(Some(url)) => {
                debug!("检查页面 URL: {}", url);
                if url.contains(pattern) {
                    info!("✓ 找到目标页面: {}", url);
                    return Ok(Some(p.clone()));
                }
            }
            Ok(None) => {}
            Err(e) => {
                // 个别页面查询失败不影响整体扫描
                debug!("查询页面 URL 失败: {}", e);
            }
        }
    }

    debug!("未找到 URL 包含 '{}' 的页面", pattern);
    Ok(None)
}

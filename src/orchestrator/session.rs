//! 会话供应
//!
//! 在浏览器已打开的标签页里定位 Flow 页面，搭好驱动并挂起会话
//! 任务。页面刷新后旧会话作废，重建走同一条路，只是多等一拍
//! 让页面完成加载。

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Browser;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::browser::find_page_by_url;
use crate::driver::{spawn_session, CdpPageAdapter, DriverTiming, FlowDriver, SessionHandle};
use crate::error::AppResult;
use crate::infrastructure::JsExecutor;
use crate::services::{DownloadNamer, DownloadWatcher};

/// 重建会话前等页面稳定的间隔
const REESTABLISH_SETTLE: Duration = Duration::from_secs(1);

/// 会话供应抽象
///
/// 周期层只关心"给我一个能用的会话"，定位细节和测试替身都在
/// 这层背后。
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// 定位 Flow 标签页并建立会话，找不到标签页时返回 None
    async fn locate(&self) -> AppResult<Option<SessionHandle>>;

    /// 页面刷新后重建会话
    async fn reestablish(&self) -> AppResult<Option<SessionHandle>>;
}

/// 通过 CDP 建立会话
pub struct CdpSessionProvider {
    browser: Arc<Browser>,
    url_pattern: String,
    namer: Arc<DownloadNamer>,
    watcher: Arc<DownloadWatcher>,
    timing: DriverTiming,
}

impl CdpSessionProvider {
    /// 创建新的会话供应器
    pub fn new(
        browser: Arc<Browser>,
        url_pattern: impl Into<String>,
        namer: Arc<DownloadNamer>,
        watcher: Arc<DownloadWatcher>,
    ) -> Self {
        Self {
            browser,
            url_pattern: url_pattern.into(),
            namer,
            watcher,
            timing: DriverTiming::default(),
        }
    }

    async fn build_session(&self) -> AppResult<Option<SessionHandle>> {
        let page = match find_page_by_url(&self.browser, &self.url_pattern).await? {
            Some(page) => page,
            None => return Ok(None),
        };

        // 下载行为绑在页面上，页面一换就得重新配置
        if let Err(e) = self.watcher.configure_page(&page).await {
            warn!("⚠️ 配置页面下载行为失败: {}", e);
        }

        let executor = JsExecutor::new(page);
        let adapter = CdpPageAdapter::new(executor);
        let driver = FlowDriver::with_timing(adapter, Arc::clone(&self.namer), self.timing.clone());
        Ok(Some(spawn_session(driver)))
    }
}

#[async_trait]
impl SessionProvider for CdpSessionProvider {
    async fn locate(&self) -> AppResult<Option<SessionHandle>> {
        self.build_session().await
    }

    async fn reestablish(&self) -> AppResult<Option<SessionHandle>> {
        info!("🔄 重新定位 Flow 标签页...");
        sleep(REESTABLISH_SETTLE).await;
        self.build_session().await
    }
}

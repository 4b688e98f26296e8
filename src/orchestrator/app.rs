//! 应用装配与守护循环 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责装配资源并驱动周期触发。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志、连接浏览器、装配表格与会话依赖
//! 2. **守护循环**：按运行状态里的间隔周期触发，停止即退出
//! 3. **单轮运行**：手动触发一个周期，便于调试
//! 4. **轻量命令**：启动配置、请求停止、查看状态（不碰浏览器）
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有 Browser 和下载监视任务的模块
//! - **触发与执行分离**：周期在独立任务里跑，触发器不被长周期
//!   拖住，真正的排他在 CycleRunner 的锁里
//! - **向下委托**：周期细节全部交给 cycle 模块

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chromiumoxide::Browser;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::browser;
use crate::config::Config;
use crate::orchestrator::cycle::{CycleOutcome, CycleRunner};
use crate::orchestrator::session::CdpSessionProvider;
use crate::services::{
    extract_sheet_id, DownloadNamer, DownloadWatcher, RowStore, SheetAuth, SheetsRowStore,
};
use crate::state::StateStore;
use crate::utils::logging::init_log_file;
use crate::workflow::RowFlow;

/// 状态命令展示的最近下载条数
const RECENT_DOWNLOAD_LIMIT: usize = 10;

/// 应用主结构
pub struct App {
    state_store: StateStore,
    runner: Arc<CycleRunner>,
    _browser: Arc<Browser>,
    _watcher_task: JoinHandle<()>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config);

        let state_store = StateStore::new(&config.state_file);

        // 连接浏览器
        let browser = Arc::new(browser::connect_to_browser(config.browser_debug_port).await?);

        // 下载链路：命名器 + 目录监视
        let namer = Arc::new(DownloadNamer::new());
        let watcher = Arc::new(DownloadWatcher::new(
            &config.download_dir,
            Arc::clone(&namer),
        ));
        let watcher_task = Arc::clone(&watcher).spawn();

        // 表格链路：服务账号 + 存取服务
        let auth = Arc::new(SheetAuth::load(&config.service_account_file).await?);
        let store: Arc<dyn RowStore> = Arc::new(SheetsRowStore::new(auth));

        let provider = Box::new(CdpSessionProvider::new(
            Arc::clone(&browser),
            config.flow_url_pattern.clone(),
            namer,
            watcher,
        ));

        let runner = Arc::new(CycleRunner::new(
            state_store.clone(),
            store,
            provider,
            RowFlow::new().with_verbose(config.verbose_logging),
        ));

        Ok(Self {
            state_store,
            runner,
            _browser: browser,
            _watcher_task: watcher_task,
        })
    }

    /// 守护模式：按运行状态里的间隔周期触发，停止后退出
    pub async fn run_daemon(&self) -> Result<()> {
        let state = self.state_store.load().await?;
        if !state.is_running {
            warn!("⚠️ 自动化未启动，先用 start 命令配置表格");
            return Ok(());
        }

        let mut period = Duration::from_secs(state.auto_check_interval.max(1));
        let mut ticker = tokio::time::interval(period);
        info!("⏰ 周期触发已启动，每 {} 秒一轮", period.as_secs());

        loop {
            ticker.tick().await;

            let current = self.state_store.load().await?;
            if !current.is_running {
                info!("⏹️ 自动化已停止，退出守护");
                break;
            }

            // 运行状态里的间隔改了就换一个节拍器
            let wanted = Duration::from_secs(current.auto_check_interval.max(1));
            if wanted != period {
                info!("⏰ 周期间隔调整为 {} 秒", wanted.as_secs());
                period = wanted;
                ticker = tokio::time::interval(period);
            }

            // 周期在独立任务里跑，触发器不等它结束；
            // 上一轮没跑完时新一轮会在锁上直接放弃
            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move {
                match runner.run_cycle().await {
                    Ok(outcome) => debug!("[周期] 结束: {:?}", outcome),
                    Err(e) => error!("[周期] ❌ 致命错误: {}", e),
                }
            });
        }

        Ok(())
    }

    /// 手动触发一个周期
    pub async fn run_once(&self) -> Result<()> {
        match self.runner.run_cycle().await? {
            CycleOutcome::Ran { attempted } => info!("✅ 单轮完成，处理了 {} 行", attempted),
            outcome => info!("单轮结束: {:?}", outcome),
        }
        Ok(())
    }
}

/// 写入启动配置并把运行状态置为启动
///
/// 接受表格链接或裸 ID，重新启动会清空已处理行的记录。
pub async fn configure_start(config: &Config, sheet_ref: &str, interval: Option<u64>) -> Result<()> {
    let sheet_id = extract_sheet_id(sheet_ref)?;
    let tab = config.sheet_tab.clone();
    let check_interval = interval.unwrap_or(config.default_check_interval);

    let state_store = StateStore::new(&config.state_file);
    let state = state_store
        .update(move |s| {
            s.client_sheet_id = sheet_id;
            s.sheet_name = tab;
            s.auto_check_interval = check_interval;
            s.processed_rows = 0;
            s.processed_row_keys.clear();
            s.is_running = true;
        })
        .await?;

    info!("🚀 自动化已启动");
    info!("  表格: {}", state.client_sheet_id);
    info!("  页名: {}", state.sheet_name);
    info!("  周期间隔: {} 秒", state.auto_check_interval);
    Ok(())
}

/// 请求停止，进行中的行做完当前步骤后退出
pub async fn request_stop(config: &Config) -> Result<()> {
    let state_store = StateStore::new(&config.state_file);
    state_store.update(|s| s.is_running = false).await?;
    info!("⏹️ 已请求停止");
    Ok(())
}

/// 展示运行状态、表格实时进度和最近的下载
pub async fn show_status(config: &Config) -> Result<()> {
    let state_store = StateStore::new(&config.state_file);
    let state = state_store.load().await?;

    info!("{}", "=".repeat(60));
    info!("📊 运行状态");
    info!("  启动: {}", if state.is_running { "是" } else { "否" });
    if state.client_sheet_id.is_empty() {
        info!("  表格: (未配置)");
    } else {
        info!("  表格: {}", state.client_sheet_id);
    }
    info!("  页名: {}", state.sheet_name);
    info!("  周期间隔: {} 秒", state.auto_check_interval);
    info!("  上次统计: {}/{} 行已完成", state.processed_rows, state.total_rows);

    if !state.client_sheet_id.is_empty() {
        match read_sheet_progress(config, &state.client_sheet_id, &state.sheet_name).await {
            Ok((done, total)) => info!("  表格实时进度: {}/{} 行已完成", done, total),
            Err(e) => warn!("  ⚠️ 读取表格失败: {}", e),
        }
    }

    let namer = Arc::new(DownloadNamer::new());
    let watcher = DownloadWatcher::new(&config.download_dir, namer);
    let recent = watcher.recent_downloads(RECENT_DOWNLOAD_LIMIT).await?;
    if recent.is_empty() {
        info!("  最近下载: (无)");
    } else {
        info!("  最近下载:");
        for entry in recent {
            info!("    {}", entry.file_name);
        }
    }
    info!("{}", "=".repeat(60));
    Ok(())
}

async fn read_sheet_progress(config: &Config, sheet_id: &str, tab: &str) -> Result<(usize, usize)> {
    let auth = Arc::new(SheetAuth::load(&config.service_account_file).await?);
    let store = SheetsRowStore::new(auth);
    let rows = store.read_status_column(sheet_id, tab).await?;

    let total = rows.len().saturating_sub(1);
    let done = rows
        .iter()
        .skip(1)
        .filter(|row| {
            row.first()
                .map(|status| status.trim().to_lowercase() == "done")
                .unwrap_or(false)
        })
        .count();
    Ok((done, total))
}

// ========== 日志辅助函数 ==========

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 表格驱动视频生成模式");
    info!("🌐 浏览器调试端口: {}", config.browser_debug_port);
    info!("📄 目标页面: {}", config.flow_url_pattern);
    info!("📂 下载目录: {}", config.download_dir);
    info!("{}", "=".repeat(60));
}

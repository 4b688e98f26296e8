//! 下载监视服务 - 业务能力层
//!
//! 浏览器把文件落到下载目录后，这里负责两件事：
//!
//! - 通过 CDP 把页面的下载行为指向受控目录
//! - 轮询目录，把新落盘的文件按命名器备好的名字重命名
//!
//! Chrome 下载先以 `.crdownload` 半成品出现，完成后去掉后缀。
//! 半成品出现时取走命名槽位锁定目标名，完整文件出现时执行
//! 重命名；跳过半成品阶段的小文件直接用当前槽位。

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, BrowserError, FileError};
use crate::services::DownloadNamer;

/// Chrome 半成品下载的文件名后缀
const PARTIAL_SUFFIX: &str = ".crdownload";

/// 目录轮询间隔
const SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// 下载目录里的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    pub file_name: String,
    pub modified: Option<SystemTime>,
}

/// 下载监视服务
///
/// 职责：
/// - 配置页面的下载目录
/// - 发现新下载并按槽位重命名
/// - 为状态查询列出最近的下载
pub struct DownloadWatcher {
    dir: PathBuf,
    namer: Arc<DownloadNamer>,
    poll: Duration,
}

/// 扫描之间携带的记忆
#[derive(Default)]
struct WatchState {
    primed: bool,
    known_files: HashSet<String>,
    known_partials: HashSet<String>,
    /// 半成品基础名 -> 完成后的目标文件名
    pending: HashMap<String, String>,
}

impl DownloadWatcher {
    /// 创建新的下载监视服务
    pub fn new(dir: impl Into<PathBuf>, namer: Arc<DownloadNamer>) -> Self {
        Self {
            dir: dir.into(),
            namer,
            poll: SCAN_INTERVAL,
        }
    }

    /// 把页面的下载行为指向监视目录
    ///
    /// 目录不存在时先创建，CDP 要求绝对路径。
    pub async fn configure_page(&self, page: &Page) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::File(FileError::CreateDirFailed {
                path: self.dir.display().to_string(),
                source: Box::new(e),
            })
        })?;
        let absolute = tokio::fs::canonicalize(&self.dir).await.map_err(|e| {
            AppError::Browser(BrowserError::DownloadConfigFailed {
                source: Box::new(e),
            })
        })?;

        let params = SetDownloadBehaviorParams {
            behavior: SetDownloadBehaviorBehavior::Allow,
            download_path: Some(absolute.to_string_lossy().to_string()),
            browser_context_id: None,
            events_enabled: None,
        };
        page.execute(params).await.map_err(|e| {
            AppError::Browser(BrowserError::DownloadConfigFailed {
                source: Box::new(e),
            })
        })?;

        info!("📂 页面下载目录已指向: {}", absolute.display());
        Ok(())
    }

    /// 在后台任务中持续监视下载目录
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(&self) {
        info!("👀 下载监视已启动: {}", self.dir.display());
        let mut state = WatchState::default();
        loop {
            if let Err(e) = self.scan(&mut state).await {
                warn!("⚠️ 下载目录扫描失败: {}", e);
            }
            sleep(self.poll).await;
        }
    }

    /// 扫一遍目录，处理新出现的半成品和完整文件
    ///
    /// 首次扫描只记录现状，启动前就躺在目录里的文件不会被动过。
    async fn scan(&self, state: &mut WatchState) -> AppResult<()> {
        let mut seen_files = HashSet::new();
        let mut seen_partials = HashSet::new();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // 目录还没建好，等配置阶段创建
            Err(_) => return Ok(()),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::file_read_failed(self.dir.display().to_string(), e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match name.strip_suffix(PARTIAL_SUFFIX) {
                Some(base) => {
                    seen_partials.insert(base.to_string());
                }
                None => {
                    seen_files.insert(name);
                }
            }
        }

        if !state.primed {
            state.known_files = seen_files;
            state.known_partials = seen_partials;
            state.primed = true;
            return Ok(());
        }

        // 新出现的半成品：下载开始，锁定目标文件名
        for base in &seen_partials {
            if state.known_partials.contains(base) || state.pending.contains_key(base) {
                continue;
            }
            match self.namer.consume() {
                Some(target) => {
                    info!("📥 检测到新下载: {}{}，完成后重命名为 {}", base, PARTIAL_SUFFIX, target);
                    state.pending.insert(base.clone(), target);
                }
                None => {
                    debug!("检测到新下载 {} 但没有备好的文件名，保留默认命名", base);
                }
            }
        }

        // 新落盘的完整文件：按锁定的目标名或当前槽位重命名
        let completed: Vec<String> = seen_files
            .iter()
            .filter(|name| !state.known_files.contains(*name))
            .cloned()
            .collect();
        let mut renamed = Vec::new();
        for name in completed {
            let target = state.pending.remove(&name).or_else(|| self.namer.consume());
            match target {
                Some(target) => {
                    let final_name = self.rename_download(&name, &target).await?;
                    renamed.push(final_name);
                }
                None => debug!("发现未跟踪的文件: {}", name),
            }
        }

        seen_files.extend(renamed);
        state.known_files = seen_files;
        state.known_partials = seen_partials;
        Ok(())
    }

    /// 把落盘文件重命名为目标名，占用时按 Chrome 习惯加 " (n)"
    async fn rename_download(&self, from_name: &str, target: &str) -> AppResult<String> {
        let from = self.dir.join(from_name);
        let to = unique_path(&self.dir, target);
        tokio::fs::rename(&from, &to).await.map_err(|e| {
            AppError::File(FileError::RenameFailed {
                from: from.display().to_string(),
                to: to.display().to_string(),
                source: Box::new(e),
            })
        })?;

        let final_name = to
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| target.to_string());
        info!("✓ 下载完成: {} -> {}", from_name, final_name);
        Ok(final_name)
    }

    /// 最近的下载，按修改时间倒序
    pub async fn recent_downloads(&self, limit: usize) -> AppResult<Vec<DownloadEntry>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::file_read_failed(self.dir.display().to_string(), e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            let modified = entry.metadata().await.ok().and_then(|m| m.modified().ok());
            found.push(DownloadEntry {
                file_name: name,
                modified,
            });
        }

        found.sort_by(|a, b| b.modified.cmp(&a.modified));
        found.truncate(limit);
        Ok(found)
    }
}

/// 在目录里找一个不冲突的路径
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
        None => (file_name.to_string(), String::new()),
    };
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{} ({}){}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

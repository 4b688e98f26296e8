//! 单行生成状态机
//!
//! 按固定顺序走完一行视频的页面操作：新建项目（可选）→ 写入
//! 提示词 → 打开设置并按需调画幅和数量 → 提交 → 观察进度指示 →
//! 逐个触发下载。时间节奏全部来自 [`DriverTiming`]，元素等待是
//! 对适配器的协作轮询。
//!
//! 进度指示的存活时长是成败判据：存活不足阈值视为快速失败，
//! 此时驱动会安排页面自行刷新再上抛错误。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::driver::{selectors, DriveError, DriverTiming, PageAdapter};
use crate::services::DownloadNamer;
use crate::utils::truncate_text;

/// 页面默认的生成数量，等于默认值时跳过下拉操作
const PAGE_DEFAULT_VIDEO_COUNT: u32 = 2;

/// 一行的生成任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    /// 表格中的行号（1 基，含表头）
    pub row_number: usize,
    /// 提示词
    pub prompt: String,
    /// 画幅比例，留空沿用页面当前值
    pub aspect_ratio: Option<String>,
    /// 本行要生成的视频数
    pub video_count: u32,
}

/// 一次生成的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOutcome {
    /// 已触发的下载数
    pub downloads_started: usize,
}

/// Flow 页面的单行驱动
pub struct FlowDriver<A: PageAdapter> {
    adapter: A,
    namer: Arc<DownloadNamer>,
    timing: DriverTiming,
}

impl<A: PageAdapter> FlowDriver<A> {
    /// 创建新的驱动，使用默认时间参数
    pub fn new(adapter: A, namer: Arc<DownloadNamer>) -> Self {
        Self::with_timing(adapter, namer, DriverTiming::default())
    }

    /// 创建新的驱动并指定时间参数
    pub fn with_timing(adapter: A, namer: Arc<DownloadNamer>, timing: DriverTiming) -> Self {
        Self {
            adapter,
            namer,
            timing,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// 页面是否还能执行脚本
    pub async fn page_alive(&self) -> bool {
        self.adapter.is_alive().await
    }

    /// 执行一行的完整生成流程
    ///
    /// 快速失败时先安排页面自刷新（刷新失败只记日志），再上抛
    /// [`DriveError::QuickFailure`] 让上层决定表格状态。
    pub async fn generate(&self, job: &VideoJob) -> Result<GenerateOutcome, DriveError> {
        let result = self.run_steps(job).await;
        if let Err(DriveError::QuickFailure { lifetime }) = &result {
            warn!(
                "[行 {}] ⚡ 进度指示仅存活 {:.1} 秒，安排页面 {} 秒后刷新",
                job.row_number,
                lifetime.as_secs_f64(),
                self.timing.reload_delay.as_secs()
            );
            if let Err(e) = self.adapter.schedule_reload(self.timing.reload_delay).await {
                warn!("[行 {}] ⚠️ 安排页面刷新失败: {}", job.row_number, e);
            }
        }
        result
    }

    async fn run_steps(&self, job: &VideoJob) -> Result<GenerateOutcome, DriveError> {
        info!(
            "[行 {}] 🚀 开始生成，提示词: {}",
            job.row_number,
            truncate_text(&job.prompt, 50)
        );

        // ========== 第一步：新建项目（按钮可能不存在，容忍缺席） ==========
        match self
            .wait_click(selectors::START_PROJECT, self.timing.project_wait)
            .await
        {
            Ok(()) => sleep(self.timing.step_pause).await,
            Err(e) => debug!("[行 {}] 新建项目按钮未出现，沿用当前项目: {}", job.row_number, e),
        }

        // ========== 第二步：写入提示词 ==========
        if job.prompt.trim().is_empty() {
            return Err(DriveError::EmptyPrompt);
        }
        self.wait_write(selectors::PROMPT_INPUT, &job.prompt).await?;
        sleep(self.timing.step_pause).await;

        // ========== 第三步：设置面板 ==========
        self.wait_click(selectors::SETTINGS_DIALOG, self.timing.element_wait)
            .await?;
        sleep(self.timing.step_pause).await;

        if let Some(ratio) = &job.aspect_ratio {
            info!("[行 {}] 画幅比例: {}", job.row_number, ratio);
            self.wait_click(selectors::ASPECT_RATIO_DROPDOWN, self.timing.element_wait)
                .await?;
            sleep(self.timing.option_pause).await;
            self.wait_click(&selectors::aspect_ratio_option(ratio), self.timing.element_wait)
                .await?;
            sleep(self.timing.option_pause).await;
        }

        if job.video_count != PAGE_DEFAULT_VIDEO_COUNT {
            info!("[行 {}] 生成数量: {}", job.row_number, job.video_count);
            self.wait_click(selectors::VIDEO_COUNT_DROPDOWN, self.timing.element_wait)
                .await?;
            sleep(self.timing.option_pause).await;
            self.wait_click(
                &selectors::videos_count_option(job.video_count),
                self.timing.element_wait,
            )
            .await?;
            sleep(self.timing.option_pause).await;
        }

        // ========== 第四步：提交并观察进度 ==========
        self.wait_click(selectors::SUBMIT_BUTTON, self.timing.element_wait)
            .await?;
        info!("[行 {}] 📤 已提交，等待进度指示消失", job.row_number);
        sleep(self.timing.submit_settle).await;
        self.watch_indicator(job.row_number).await?;
        sleep(self.timing.post_generate_pause).await;

        // ========== 第五步：触发下载 ==========
        let downloads_started = self.download_videos(job).await?;

        info!(
            "[行 {}] ✅ 生成完成，已触发 {} 个下载",
            job.row_number, downloads_started
        );
        Ok(GenerateOutcome { downloads_started })
    }

    /// 轮询点击：元素可见即点击并等稳定间隔，时限内未出现则报错
    async fn wait_click(&self, xpath: &str, wait: Duration) -> Result<(), DriveError> {
        let deadline = Instant::now() + wait;
        loop {
            if self.adapter.click(xpath).await? {
                sleep(self.timing.click_settle).await;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriveError::ElementNotFound {
                    xpath: xpath.to_string(),
                });
            }
            sleep(self.timing.element_poll).await;
        }
    }

    /// 轮询写入：输入框可见即写入并等稳定间隔，时限内未出现则报错
    async fn wait_write(&self, xpath: &str, text: &str) -> Result<(), DriveError> {
        let deadline = Instant::now() + self.timing.element_wait;
        loop {
            if self.adapter.write_text(xpath, text).await? {
                sleep(self.timing.input_settle).await;
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriveError::ElementNotFound {
                    xpath: xpath.to_string(),
                });
            }
            sleep(self.timing.element_poll).await;
        }
    }

    /// 等进度指示消失，按存活时长区分快速失败与正常结束
    ///
    /// 指示从未出现等价于存活时长为零，同样落入快速失败分支。
    async fn watch_indicator(&self, row_number: usize) -> Result<(), DriveError> {
        let started = Instant::now();
        loop {
            if !self.adapter.is_visible(selectors::LOADING_INDICATOR).await? {
                break;
            }
            if started.elapsed() >= self.timing.indicator_timeout {
                return Err(DriveError::HangTimeout);
            }
            sleep(self.timing.indicator_poll).await;
        }

        let lifetime = started.elapsed();
        if lifetime < self.timing.quick_failure_window {
            return Err(DriveError::QuickFailure { lifetime });
        }
        debug!(
            "[行 {}] 进度指示存活 {:.1} 秒后消失",
            row_number,
            lifetime.as_secs_f64()
        );
        Ok(())
    }

    /// 逐个触发下载，返回实际触发的数量
    ///
    /// 每次点击前先向命名器备好目标文件名，下载监视器据此重命名
    /// 落盘文件。页面上的按钮数可能少于任务要求，取两者较小值。
    async fn download_videos(&self, job: &VideoJob) -> Result<usize, DriveError> {
        let total = self.adapter.count_nodes(selectors::DOWNLOAD_DROPDOWN).await?;
        let planned = (job.video_count as usize).min(total);
        if planned == 0 {
            warn!("[行 {}] ⚠️ 页面上没有找到下载按钮", job.row_number);
            return Ok(0);
        }
        info!(
            "[行 {}] 📥 页面上共 {} 个下载按钮，本行触发 {} 个",
            job.row_number, total, planned
        );

        for i in 0..planned {
            let file_name =
                download_filename(job.row_number, i + 1, chrono::Utc::now().timestamp_millis());
            self.namer.prepare(&file_name);
            sleep(self.timing.prepare_pause).await;

            if !self.adapter.click_nth(selectors::DOWNLOAD_DROPDOWN, i).await? {
                return Err(DriveError::ElementNotFound {
                    xpath: format!("{}[{}]", selectors::DOWNLOAD_DROPDOWN, i + 1),
                });
            }
            sleep(self.timing.click_settle).await;
            self.wait_click(selectors::DOWNLOAD_MENU_ITEM, self.timing.menu_wait)
                .await?;
            sleep(self.timing.download_start_pause).await;
        }

        Ok(planned)
    }
}

/// 下载文件名：行号 + 视频序号 + 毫秒时间戳
pub fn download_filename(row_number: usize, video_index: usize, timestamp_ms: i64) -> String {
    format!("row{}_video{}_{}.mp4", row_number, video_index, timestamp_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_filename_format() {
        assert_eq!(
            download_filename(5, 2, 1700000000000),
            "row5_video2_1700000000000.mp4"
        );
    }

    #[test]
    fn test_download_filename_is_chrome_safe() {
        let name = download_filename(12, 1, 1700000000123);
        assert!(!name.contains('/'));
        assert!(!name.contains(' '));
        assert!(name.ends_with(".mp4"));
    }
}

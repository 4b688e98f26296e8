//! 行处理流程 - 流程层
//!
//! 核心职责：定义"一行"的完整处理顺序
//!
//! 流程顺序：
//! 1. 状态写成 Processing...
//! 2. 经会话把生成任务交给页面驱动
//! 3. 成功写 Done，失败归类后写 Error - 说明
//!
//! 页面正在刷新的两类失败（通道关闭、快速失败）在写回错误之前
//! 先冷却一段长延迟，给页面留出刷新的时间。

use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::driver::{DriveError, SessionHandle};
use crate::services::RowStore;
use crate::utils::truncate_text;
use crate::workflow::row_ctx::RowCtx;

/// 行开始处理时写入的状态
pub const STATUS_PROCESSING: &str = "Processing...";

/// 行处理成功时写入的状态
pub const STATUS_DONE: &str = "Done";

/// 页面刷新类失败的默认冷却时长
const RELOAD_COOLDOWN: Duration = Duration::from_secs(70);

/// 行处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// 处理成功，状态已写成 Done
    Completed,
    /// 处理失败，状态已写成 Error - 说明
    Failed,
}

/// 失败归类结果
struct Verdict {
    message: String,
    cooldown: bool,
}

/// 行处理流程
///
/// - 编排单行的状态写入顺序
/// - 决定失败后是否冷却
/// - 不持有任何资源（表格、会话都由调用方传入）
pub struct RowFlow {
    cooldown: Duration,
    verbose_logging: bool,
}

impl RowFlow {
    /// 创建新的行处理流程
    pub fn new() -> Self {
        Self {
            cooldown: RELOAD_COOLDOWN,
            verbose_logging: false,
        }
    }

    /// 指定冷却时长创建
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            cooldown,
            verbose_logging: false,
        }
    }

    /// 开关任务明细日志
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose_logging = verbose;
        self
    }

    /// 处理一行：标记、生成、写回终态
    pub async fn process(
        &self,
        store: &dyn RowStore,
        sheet_id: &str,
        tab: &str,
        session: &SessionHandle,
        ctx: &RowCtx,
    ) -> Result<RowOutcome> {
        info!(
            "[行 {}] 开始处理，提示词: {}",
            ctx.row_number,
            truncate_text(ctx.prompt(), 50)
        );

        store
            .write_status(sheet_id, tab, ctx.row_number, STATUS_PROCESSING)
            .await?;

        let job = ctx.video_job();
        if self.verbose_logging {
            info!(
                "[行 {}] 任务明细: 画幅={:?}, 数量={}, 提示词: {}",
                ctx.row_number, job.aspect_ratio, job.video_count, job.prompt
            );
        }

        match session.generate(job).await {
            Ok(outcome) => {
                store
                    .write_status(sheet_id, tab, ctx.row_number, STATUS_DONE)
                    .await?;
                info!(
                    "[行 {}] ✓ 处理成功，已触发 {} 个下载",
                    ctx.row_number, outcome.downloads_started
                );
                Ok(RowOutcome::Completed)
            }
            Err(e) => {
                warn!("[行 {}] ⚠️ 生成失败: {}", ctx.row_number, e);
                let verdict = classify(&e);
                if verdict.cooldown {
                    info!(
                        "[行 {}] ⏳ 等待 {} 秒让页面完成刷新...",
                        ctx.row_number,
                        self.cooldown.as_secs()
                    );
                    sleep(self.cooldown).await;
                }
                store
                    .write_status(
                        sheet_id,
                        tab,
                        ctx.row_number,
                        &format!("Error - {}", verdict.message),
                    )
                    .await?;
                Ok(RowOutcome::Failed)
            }
        }
    }
}

impl Default for RowFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// 把驱动错误归类成写进表格的说明
///
/// 只有页面刷新类的失败需要冷却，其余错误原样写回。
fn classify(err: &DriveError) -> Verdict {
    match err {
        DriveError::NotConnected => Verdict {
            message: "Page session not established".to_string(),
            cooldown: false,
        },
        DriveError::ChannelClosed => Verdict {
            message: "Generation failed - page reloading".to_string(),
            cooldown: true,
        },
        DriveError::QuickFailure { .. } => Verdict {
            message: "Generation failed - quick failure detected".to_string(),
            cooldown: true,
        },
        DriveError::EmptyPrompt
        | DriveError::ElementNotFound { .. }
        | DriveError::HangTimeout
        | DriveError::Script { .. } => Verdict {
            message: err.to_string(),
            cooldown: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_reload_failures_need_cooldown() {
        let verdict = classify(&DriveError::ChannelClosed);
        assert_eq!(verdict.message, "Generation failed - page reloading");
        assert!(verdict.cooldown);

        let verdict = classify(&DriveError::QuickFailure {
            lifetime: Duration::from_secs(3),
        });
        assert_eq!(verdict.message, "Generation failed - quick failure detected");
        assert!(verdict.cooldown);
    }

    #[test]
    fn test_classify_connection_failure_skips_cooldown() {
        let verdict = classify(&DriveError::NotConnected);
        assert_eq!(verdict.message, "Page session not established");
        assert!(!verdict.cooldown);
    }

    #[test]
    fn test_classify_other_failures_keep_raw_message() {
        let verdict = classify(&DriveError::EmptyPrompt);
        assert_eq!(verdict.message, "Prompt is empty");
        assert!(!verdict.cooldown);

        let verdict = classify(&DriveError::HangTimeout);
        assert_eq!(
            verdict.message,
            "Generation timeout - loading indicator never disappeared"
        );
        assert!(!verdict.cooldown);

        let verdict = classify(&DriveError::ElementNotFound {
            xpath: "//textarea".to_string(),
        });
        assert_eq!(verdict.message, "Element not found: //textarea");
        assert!(!verdict.cooldown);
    }
}

//! 页面会话
//!
//! 把驱动包进后台任务，请求走 mpsc 通道串行执行，应答走一次性
//! 通道。通道语义贴着页面的真实状态：任务发现页面在生成中途
//! 失联时直接退出而不应答，调用方收到 [`DriveError::ChannelClosed`]，
//! 上层据此认定页面正在刷新。

use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::driver::{DriveError, FlowDriver, GenerateOutcome, PageAdapter, VideoJob};

/// 应答等待的默认时限（仅用于探测）
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// 会话请求
pub enum SessionRequest {
    /// 探测页面是否存活
    Ping { reply: oneshot::Sender<bool> },
    /// 执行一行生成
    GenerateVideo {
        job: VideoJob,
        reply: oneshot::Sender<Result<GenerateOutcome, DriveError>>,
    },
}

/// 会话句柄
///
/// 克隆开销只有一个通道发送端。
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    /// 包装一个请求通道
    pub fn new(tx: mpsc::Sender<SessionRequest>) -> Self {
        Self { tx }
    }

    /// 探测会话是否可用，任何一步失败都按不可用处理
    pub async fn ping(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(SessionRequest::Ping { reply: reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        matches!(timeout(PING_TIMEOUT, reply_rx).await, Ok(Ok(true)))
    }

    /// 提交一行生成并等待结果
    ///
    /// 请求发不出去是 [`DriveError::NotConnected`]，发出去了但
    /// 应答通道被丢弃是 [`DriveError::ChannelClosed`]。
    pub async fn generate(&self, job: VideoJob) -> Result<GenerateOutcome, DriveError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SessionRequest::GenerateVideo {
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DriveError::NotConnected)?;
        reply_rx.await.map_err(|_| DriveError::ChannelClosed)?
    }
}

/// 把驱动挂进后台任务，返回会话句柄
pub fn spawn_session<A>(driver: FlowDriver<A>) -> SessionHandle
where
    A: PageAdapter + 'static,
{
    let (tx, mut rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            match request {
                SessionRequest::Ping { reply } => {
                    let _ = reply.send(driver.page_alive().await);
                }
                SessionRequest::GenerateVideo { job, reply } => {
                    let result = driver.generate(&job).await;
                    // 脚本报错且页面已失联：多半在刷新，丢弃应答让
                    // 调用方走通道关闭分支，会话就此作废
                    if matches!(&result, Err(DriveError::Script { .. }))
                        && !driver.page_alive().await
                    {
                        warn!("[行 {}] ⚠️ 页面在生成中途失联，会话终止", job.row_number);
                        return;
                    }
                    let _ = reply.send(result);
                }
            }
        }
        debug!("会话通道已关闭，任务退出");
    });
    SessionHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> VideoJob {
        VideoJob {
            row_number: 2,
            prompt: "a cat surfing".to_string(),
            aspect_ratio: None,
            video_count: 2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_false_when_nobody_answers() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = SessionHandle::new(tx);

        assert!(!handle.ping().await);
    }

    #[tokio::test]
    async fn test_generate_not_connected_when_channel_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = SessionHandle::new(tx);

        let err = handle.generate(job()).await.unwrap_err();
        assert!(matches!(err, DriveError::NotConnected));
    }

    #[tokio::test]
    async fn test_generate_channel_closed_when_reply_dropped() {
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(async move {
            if let Some(SessionRequest::GenerateVideo { reply, .. }) = rx.recv().await {
                drop(reply);
            }
        });
        let handle = SessionHandle::new(tx);

        let err = handle.generate(job()).await.unwrap_err();
        assert!(matches!(err, DriveError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_ping_true_with_responder() {
        let (tx, mut rx) = mpsc::channel(1);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let SessionRequest::Ping { reply } = request {
                    let _ = reply.send(true);
                }
            }
        });
        let handle = SessionHandle::new(tx);

        assert!(handle.ping().await);
    }
}

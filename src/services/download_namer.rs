//! 下载命名服务 - 业务能力层
//!
//! 驱动层点击下载前把目标文件名备在这里，下载监视器发现新文件
//! 时取走并重命名。槽位只有一个：Flow 页面一次只会落一个下载。

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

/// 下载命名服务
///
/// 职责：
/// - 保存"下一个下载"的目标文件名
/// - 槽位被覆盖时以最新值为准
/// - 取走即清空，不保留历史
pub struct DownloadNamer {
    slot: Mutex<Option<String>>,
}

impl DownloadNamer {
    /// 创建新的下载命名服务
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// 备好下一个下载的目标文件名
    ///
    /// 上一个槽位还没被取走时直接覆盖，旧名随未落盘的下载一起作废。
    pub fn prepare(&self, file_name: &str) {
        let mut slot = self.lock();
        if let Some(old) = slot.replace(file_name.to_string()) {
            debug!("下载命名槽位覆盖: {} -> {}", old, file_name);
        }
        info!("📝 已备好下载文件名: {}", file_name);
    }

    /// 取走备好的文件名，槽位随之清空
    pub fn consume(&self) -> Option<String> {
        self.lock().take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // 槽位只是一个 Option，锁中毒时内容仍然可用
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DownloadNamer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_takes_and_clears() {
        let namer = DownloadNamer::new();
        namer.prepare("row2_video1_1700000000000.mp4");

        assert_eq!(
            namer.consume().as_deref(),
            Some("row2_video1_1700000000000.mp4")
        );
        assert_eq!(namer.consume(), None);
    }

    #[test]
    fn test_prepare_overwrites_stale_slot() {
        let namer = DownloadNamer::new();
        namer.prepare("row2_video1_1700000000000.mp4");
        namer.prepare("row2_video2_1700000000500.mp4");

        assert_eq!(
            namer.consume().as_deref(),
            Some("row2_video2_1700000000500.mp4")
        );
    }

    #[test]
    fn test_consume_empty_slot_is_none() {
        let namer = DownloadNamer::new();
        assert_eq!(namer.consume(), None);
    }
}

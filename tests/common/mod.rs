//! 集成测试共用的测试替身
//!
//! 表格、会话、页面适配器都有内存实现，测试在暂停时钟下跑，
//! 不碰网络也不碰浏览器。

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use veo_flow_automation::driver::{
    selectors, DriveError, GenerateOutcome, PageAdapter, SessionHandle, SessionRequest,
};
use veo_flow_automation::error::AppResult;
use veo_flow_automation::orchestrator::SessionProvider;
use veo_flow_automation::services::RowStore;

// ========== 表格替身 ==========

/// 一次状态写入的记录，时间戳走 tokio 时钟
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub row_number: usize,
    pub value: String,
    pub at: Instant,
}

/// 内存表格
pub struct FakeRowStore {
    rows: Mutex<Vec<Vec<String>>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl FakeRowStore {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// 所有写入，按发生顺序
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap().clone()
    }

    /// 写入的 (行号, 值) 序列，便于整体断言
    pub fn write_pairs(&self) -> Vec<(usize, String)> {
        self.writes()
            .into_iter()
            .map(|w| (w.row_number, w.value))
            .collect()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl RowStore for FakeRowStore {
    async fn read_all(&self, _sheet_id: &str, _tab: &str) -> AppResult<Vec<Vec<String>>> {
        Ok(self.rows())
    }

    async fn read_status_column(&self, _sheet_id: &str, _tab: &str) -> AppResult<Vec<Vec<String>>> {
        Ok(self
            .rows()
            .into_iter()
            .map(|row| row.into_iter().take(1).collect())
            .collect())
    }

    async fn write_status(
        &self,
        _sheet_id: &str,
        _tab: &str,
        row_number: usize,
        value: &str,
    ) -> AppResult<()> {
        self.writes.lock().unwrap().push(WriteRecord {
            row_number,
            value: value.to_string(),
            at: Instant::now(),
        });
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.get_mut(row_number - 1) {
            if let Some(cell) = row.get_mut(0) {
                *cell = value.to_string();
            }
        }
        Ok(())
    }
}

/// 从字面量搭一张表
pub fn sheet(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect()
}

// ========== 会话替身 ==========

/// 生成请求的应答剧本，逐条消费
pub enum SessionScript {
    /// 正常成功
    Succeed { downloads: usize },
    /// 返回一个驱动错误
    Fail(DriveError),
    /// 丢弃应答通道并终止会话（等价页面刷新）
    DropReply,
    /// 成功应答前先执行一个同步动作（比如翻转状态文件）
    SucceedThen {
        downloads: usize,
        before_reply: Box<dyn FnOnce() + Send>,
    },
    /// 通知测试已进入生成，并停在这里等放行
    Gate {
        entered: oneshot::Sender<()>,
        release: oneshot::Receiver<()>,
        downloads: usize,
    },
}

/// 起一个按剧本应答的假会话
pub fn spawn_scripted_session(ping_ok: bool, script: Vec<SessionScript>) -> SessionHandle {
    let (tx, mut rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut script = VecDeque::from(script);
        while let Some(request) = rx.recv().await {
            match request {
                SessionRequest::Ping { reply } => {
                    let _ = reply.send(ping_ok);
                }
                SessionRequest::GenerateVideo { reply, .. } => match script.pop_front() {
                    Some(SessionScript::Succeed { downloads }) => {
                        let _ = reply.send(Ok(GenerateOutcome {
                            downloads_started: downloads,
                        }));
                    }
                    Some(SessionScript::Fail(err)) => {
                        let _ = reply.send(Err(err));
                    }
                    Some(SessionScript::DropReply) => {
                        drop(reply);
                        return;
                    }
                    Some(SessionScript::SucceedThen {
                        downloads,
                        before_reply,
                    }) => {
                        before_reply();
                        let _ = reply.send(Ok(GenerateOutcome {
                            downloads_started: downloads,
                        }));
                    }
                    Some(SessionScript::Gate {
                        entered,
                        release,
                        downloads,
                    }) => {
                        let _ = entered.send(());
                        let _ = release.await;
                        let _ = reply.send(Ok(GenerateOutcome {
                            downloads_started: downloads,
                        }));
                    }
                    None => {
                        let _ = reply.send(Ok(GenerateOutcome {
                            downloads_started: 0,
                        }));
                    }
                },
            }
        }
    });
    SessionHandle::new(tx)
}

/// 按剧本供应会话
pub struct FakeProvider {
    locates: Mutex<VecDeque<Option<SessionHandle>>>,
    reestablishes: Mutex<VecDeque<Option<SessionHandle>>>,
}

impl FakeProvider {
    pub fn new(
        locates: Vec<Option<SessionHandle>>,
        reestablishes: Vec<Option<SessionHandle>>,
    ) -> Self {
        Self {
            locates: Mutex::new(VecDeque::from(locates)),
            reestablishes: Mutex::new(VecDeque::from(reestablishes)),
        }
    }

    /// 每次定位都给同一个会话
    pub fn with_session(session: SessionHandle) -> Self {
        Self::new(vec![Some(session)], Vec::new())
    }

    /// 永远找不到标签页
    pub fn tab_missing() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn locate(&self) -> AppResult<Option<SessionHandle>> {
        Ok(self.locates.lock().unwrap().pop_front().flatten())
    }

    async fn reestablish(&self) -> AppResult<Option<SessionHandle>> {
        Ok(self.reestablishes.lock().unwrap().pop_front().flatten())
    }
}

// ========== 页面适配器替身 ==========

/// 内存页面：固定一批可见元素，进度指示按提交时刻加偏移消失
pub struct FakePageAdapter {
    exists: Mutex<HashSet<String>>,
    clicks: Mutex<Vec<String>>,
    writes: Mutex<Vec<(String, String)>>,
    nth_clicks: Mutex<Vec<usize>>,
    download_buttons: usize,
    /// None 表示进度指示从不出现
    indicator_visible_for: Option<Duration>,
    submitted_at: Mutex<Option<Instant>>,
    reloads: Mutex<Vec<Duration>>,
    alive: AtomicBool,
}

impl FakePageAdapter {
    /// 一个元素齐全的 Flow 页面
    pub fn flow_page() -> Self {
        let mut exists = HashSet::new();
        for xpath in [
            selectors::START_PROJECT,
            selectors::PROMPT_INPUT,
            selectors::SETTINGS_DIALOG,
            selectors::ASPECT_RATIO_DROPDOWN,
            selectors::VIDEO_COUNT_DROPDOWN,
            selectors::SUBMIT_BUTTON,
            selectors::DOWNLOAD_MENU_ITEM,
        ] {
            exists.insert(xpath.to_string());
        }
        Self {
            exists: Mutex::new(exists),
            clicks: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            nth_clicks: Mutex::new(Vec::new()),
            download_buttons: 2,
            indicator_visible_for: Some(Duration::from_secs(20)),
            submitted_at: Mutex::new(None),
            reloads: Mutex::new(Vec::new()),
            alive: AtomicBool::new(true),
        }
    }

    pub fn without(self, xpath: &str) -> Self {
        self.exists.lock().unwrap().remove(xpath);
        self
    }

    pub fn with_element(self, xpath: impl Into<String>) -> Self {
        self.exists.lock().unwrap().insert(xpath.into());
        self
    }

    pub fn with_download_buttons(mut self, count: usize) -> Self {
        self.download_buttons = count;
        self
    }

    /// 进度指示从提交时刻起可见多久
    pub fn with_indicator_for(mut self, visible_for: Duration) -> Self {
        self.indicator_visible_for = Some(visible_for);
        self
    }

    /// 进度指示从不出现
    pub fn with_indicator_never(mut self) -> Self {
        self.indicator_visible_for = None;
        self
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn nth_clicks(&self) -> Vec<usize> {
        self.nth_clicks.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> Vec<Duration> {
        self.reloads.lock().unwrap().clone()
    }

    fn indicator_visible(&self) -> bool {
        let submitted_at = *self.submitted_at.lock().unwrap();
        match (submitted_at, self.indicator_visible_for) {
            (Some(at), Some(visible_for)) => Instant::now() < at + visible_for,
            _ => false,
        }
    }
}

#[async_trait]
impl PageAdapter for FakePageAdapter {
    async fn is_visible(&self, xpath: &str) -> Result<bool, DriveError> {
        if xpath == selectors::LOADING_INDICATOR {
            return Ok(self.indicator_visible());
        }
        Ok(self.exists.lock().unwrap().contains(xpath))
    }

    async fn click(&self, xpath: &str) -> Result<bool, DriveError> {
        self.clicks.lock().unwrap().push(xpath.to_string());
        if !self.exists.lock().unwrap().contains(xpath) {
            return Ok(false);
        }
        if xpath == selectors::SUBMIT_BUTTON {
            *self.submitted_at.lock().unwrap() = Some(Instant::now());
        }
        Ok(true)
    }

    async fn write_text(&self, xpath: &str, text: &str) -> Result<bool, DriveError> {
        if !self.exists.lock().unwrap().contains(xpath) {
            return Ok(false);
        }
        self.writes
            .lock()
            .unwrap()
            .push((xpath.to_string(), text.to_string()));
        Ok(true)
    }

    async fn count_nodes(&self, xpath: &str) -> Result<usize, DriveError> {
        if xpath == selectors::DOWNLOAD_DROPDOWN {
            return Ok(self.download_buttons);
        }
        Ok(usize::from(self.exists.lock().unwrap().contains(xpath)))
    }

    async fn click_nth(&self, xpath: &str, index: usize) -> Result<bool, DriveError> {
        if xpath == selectors::DOWNLOAD_DROPDOWN {
            self.nth_clicks.lock().unwrap().push(index);
            return Ok(index < self.download_buttons);
        }
        Ok(false)
    }

    async fn schedule_reload(&self, delay: Duration) -> Result<(), DriveError> {
        self.reloads.lock().unwrap().push(delay);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

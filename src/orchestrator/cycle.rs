//! 单周期处理器
//!
//! 一个周期 = 读一遍表格 + 顺序处理所有待处理行。周期之间靠
//! try_lock 保证绝不并排：上一轮没跑完时新一轮直接放弃。行与
//! 行之间有固定的节流间隔，处理中途每行都重读一次运行状态，
//! 支持外部随时叫停。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AppError, ConfigError};
use crate::orchestrator::session::SessionProvider;
use crate::services::RowStore;
use crate::state::{RunState, StateStore};
use crate::workflow::{RowCtx, RowFlow, RowOutcome};

/// 行与行之间的默认节流间隔
const ROW_THROTTLE: Duration = Duration::from_secs(2);

/// 表格页名缺失时的回退值
const FALLBACK_TAB: &str = "Sheet1";

/// 一个周期的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 上一轮还没结束，本轮直接放弃
    Overlapped,
    /// 自动化处于停止状态
    NotRunning,
    /// 表格里只有表头
    NoData,
    /// 所有行都已是 Done
    AllDone,
    /// 没有找到 Flow 标签页
    TabMissing,
    /// 会话重建后仍无响应
    SessionUnresponsive,
    /// 实际跑了行处理
    Ran { attempted: usize },
}

/// 单周期处理器
///
/// - 持有表格、会话供应、行流程这三样依赖
/// - 周期排他由内部锁保证，调用方只管触发
/// - 不持有浏览器资源本身
pub struct CycleRunner {
    state_store: StateStore,
    store: Arc<dyn RowStore>,
    provider: Box<dyn SessionProvider>,
    flow: RowFlow,
    lock: Mutex<()>,
    row_throttle: Duration,
}

impl CycleRunner {
    /// 创建新的周期处理器
    pub fn new(
        state_store: StateStore,
        store: Arc<dyn RowStore>,
        provider: Box<dyn SessionProvider>,
        flow: RowFlow,
    ) -> Self {
        Self::with_throttle(state_store, store, provider, flow, ROW_THROTTLE)
    }

    /// 指定行间节流创建
    pub fn with_throttle(
        state_store: StateStore,
        store: Arc<dyn RowStore>,
        provider: Box<dyn SessionProvider>,
        flow: RowFlow,
        row_throttle: Duration,
    ) -> Self {
        Self {
            state_store,
            store,
            provider,
            flow,
            lock: Mutex::new(()),
            row_throttle,
        }
    }

    /// 跑一个完整周期
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        // 排他：上一轮还在进行就立即放弃本轮
        let _guard = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("[周期] ⏭️ 上一轮还在进行，跳过本轮");
                return Ok(CycleOutcome::Overlapped);
            }
        };

        let state = self.state_store.load().await?;
        if !state.is_running {
            debug!("[周期] 自动化未启动");
            return Ok(CycleOutcome::NotRunning);
        }
        if state.client_sheet_id.is_empty() {
            return Err(AppError::Config(ConfigError::MissingSheetId).into());
        }
        let sheet_id = state.client_sheet_id.clone();
        let tab = if state.sheet_name.is_empty() {
            FALLBACK_TAB.to_string()
        } else {
            state.sheet_name.clone()
        };

        info!("[周期] 🔍 检查表格 {} 的 {} 页...", sheet_id, tab);
        let rows = self.store.read_all(&sheet_id, &tab).await?;
        if rows.len() <= 1 {
            info!("[周期] 表格里没有数据行");
            return Ok(CycleOutcome::NoData);
        }

        let total_rows = rows.len() - 1;
        let unprocessed = count_unprocessed(&rows);
        self.state_store
            .update(|s| {
                s.total_rows = total_rows;
                s.processed_rows = total_rows - unprocessed;
            })
            .await?;

        if unprocessed == 0 {
            info!("[周期] ✅ 全部 {} 行都已处理", total_rows);
            return Ok(CycleOutcome::AllDone);
        }
        info!("[周期] 共 {} 行，其中 {} 行待处理", total_rows, unprocessed);

        let session = match self.acquire_session().await? {
            SessionAttempt::Ready(session) => session,
            SessionAttempt::TabMissing => return Ok(CycleOutcome::TabMissing),
            SessionAttempt::Unresponsive => return Ok(CycleOutcome::SessionUnresponsive),
        };

        // 逐行处理，行号是 1 基且包含表头行
        let headers = &rows[0];
        let mut attempted = 0usize;
        for (index, row) in rows.iter().enumerate().skip(1) {
            let current = self.state_store.load().await?;
            if !current.is_running {
                info!("[周期] ⏹️ 收到停止指令，中断本轮");
                break;
            }

            let row_number = index + 1;
            let ctx = RowCtx::from_row(row_number, headers, row);
            if ctx.is_done() {
                debug!("[行 {}] 已完成，跳过", row_number);
                continue;
            }

            let outcome = self
                .flow
                .process(self.store.as_ref(), &sheet_id, &tab, &session, &ctx)
                .await?;
            if outcome == RowOutcome::Completed {
                let key = RunState::row_key(&sheet_id, row_number);
                self.state_store
                    .update(move |s| {
                        s.processed_row_keys.insert(key);
                        s.processed_rows += 1;
                    })
                    .await?;
            }
            attempted += 1;

            sleep(self.row_throttle).await;
        }

        info!("[周期] 本轮处理了 {} 行", attempted);
        Ok(CycleOutcome::Ran { attempted })
    }

    /// 定位会话并确认它应答，必要时重建一次
    async fn acquire_session(&self) -> Result<SessionAttempt> {
        let session = match self.provider.locate().await? {
            Some(session) => session,
            None => {
                warn!("[周期] ⚠️ 没有找到 Flow 标签页");
                return Ok(SessionAttempt::TabMissing);
            }
        };
        if session.ping().await {
            return Ok(SessionAttempt::Ready(session));
        }

        info!("[周期] 会话无响应，尝试重建...");
        match self.provider.reestablish().await? {
            Some(session) if session.ping().await => Ok(SessionAttempt::Ready(session)),
            Some(_) => {
                warn!("[周期] ⚠️ 重建后的会话仍无响应");
                Ok(SessionAttempt::Unresponsive)
            }
            None => {
                warn!("[周期] ⚠️ 重建时没有找到 Flow 标签页");
                Ok(SessionAttempt::TabMissing)
            }
        }
    }
}

enum SessionAttempt {
    Ready(crate::driver::SessionHandle),
    TabMissing,
    Unresponsive,
}

/// 数一遍待处理行（A 列不是 done 的数据行）
fn count_unprocessed(rows: &[Vec<String>]) -> usize {
    rows.iter()
        .skip(1)
        .filter(|row| {
            row.first()
                .map(|status| status.trim().to_lowercase() != "done")
                .unwrap_or(true)
        })
        .count()
}

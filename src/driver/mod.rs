//! 页面驱动层
//!
//! ## 职责
//!
//! 本层把"在 Flow 页面上生成一行视频"的全部 DOM 操作封装起来：
//!
//! - `selectors` - Flow 页面的 XPath 选择器表
//! - `page_adapter` - DOM 原子操作的抽象（探测 / 点击 / 写入），
//!   CDP 实现通过 JsExecutor 执行 document.evaluate 片段
//! - `flow_driver` - 单行生成的状态机：新建项目 → 提示词 → 设置 →
//!   提交 → 等待进度指示消失 → 逐个触发下载
//! - `session` - 把驱动包进后台任务的会话通道
//!
//! 等待都是对 tokio 时钟的协作轮询，失败形态是带类型的 [`DriveError`]，
//! 上层按枚举分支而不是匹配错误文本。

pub mod flow_driver;
pub mod page_adapter;
pub mod selectors;
pub mod session;

use std::time::Duration;

pub use flow_driver::{FlowDriver, GenerateOutcome, VideoJob};
pub use page_adapter::{CdpPageAdapter, PageAdapter};
pub use session::{spawn_session, SessionHandle, SessionRequest};

/// 页面驱动失败形态
#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    /// 行数据没有提示词
    #[error("Prompt is empty")]
    EmptyPrompt,
    /// 等待元素出现超时
    #[error("Element not found: {xpath}")]
    ElementNotFound { xpath: String },
    /// 进度指示存活不足阈值，生成基本失败，页面将自行刷新
    #[error("Generation failed - loading indicator disappeared within 10 seconds. Page will reload.")]
    QuickFailure { lifetime: Duration },
    /// 进度指示在时限内始终未消失
    #[error("Generation timeout - loading indicator never disappeared")]
    HangTimeout,
    /// 会话从未建立（请求发不出去）
    #[error("Could not establish connection with the page session")]
    NotConnected,
    /// 请求已发出但应答通道关闭（页面多半在刷新）
    #[error("The message channel closed before a reply was received")]
    ChannelClosed,
    /// 脚本执行失败（CDP 传输层）
    #[error("Script execution failed: {message}")]
    Script { message: String },
}

impl DriveError {
    /// 包装脚本执行错误
    pub fn script(err: impl std::fmt::Display) -> Self {
        DriveError::Script {
            message: err.to_string(),
        }
    }
}

/// 页面驱动的时间参数
///
/// 默认值即 Flow 页面实测可用的节奏；测试在暂停时钟下运行，
/// 不需要缩短这些值。
#[derive(Debug, Clone)]
pub struct DriverTiming {
    /// 等待元素出现的默认时限
    pub element_wait: Duration,
    /// 元素出现轮询间隔
    pub element_poll: Duration,
    /// 点击后的稳定间隔
    pub click_settle: Duration,
    /// 写入文本后的稳定间隔
    pub input_settle: Duration,
    /// "新建项目"按钮的等待时限（允许不存在）
    pub project_wait: Duration,
    /// 主要步骤之间的间隔
    pub step_pause: Duration,
    /// 下拉选项之间的间隔
    pub option_pause: Duration,
    /// 提交后开始观察进度之前的等待
    pub submit_settle: Duration,
    /// 进度指示消失轮询间隔
    pub indicator_poll: Duration,
    /// 进度指示消失的总时限
    pub indicator_timeout: Duration,
    /// 进度指示存活低于该阈值视为快速失败
    pub quick_failure_window: Duration,
    /// 快速失败后页面自刷新的延迟
    pub reload_delay: Duration,
    /// 生成完成到开始下载之间的等待
    pub post_generate_pause: Duration,
    /// 槽位备好到点击下载之间的间隔
    pub prepare_pause: Duration,
    /// 下载菜单项的等待时限
    pub menu_wait: Duration,
    /// 每个下载启动后的等待
    pub download_start_pause: Duration,
}

impl Default for DriverTiming {
    fn default() -> Self {
        Self {
            element_wait: Duration::from_secs(10),
            element_poll: Duration::from_millis(100),
            click_settle: Duration::from_millis(500),
            input_settle: Duration::from_millis(300),
            project_wait: Duration::from_secs(2),
            step_pause: Duration::from_secs(1),
            option_pause: Duration::from_millis(500),
            submit_settle: Duration::from_secs(5),
            indicator_poll: Duration::from_millis(500),
            indicator_timeout: Duration::from_secs(520),
            quick_failure_window: Duration::from_secs(10),
            reload_delay: Duration::from_secs(60),
            post_generate_pause: Duration::from_secs(2),
            prepare_pause: Duration::from_millis(200),
            menu_wait: Duration::from_secs(5),
            download_start_pause: Duration::from_millis(1500),
        }
    }
}

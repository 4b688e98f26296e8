//! # Veo Flow Automation
//!
//! 表格驱动的 Flow 视频生成自动化
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//!
//! ### ② 业务能力层（Services / Driver）
//! - `services/` - 表格读写、服务账号认证、下载命名与监视
//! - `driver/` - Flow 页面的单行生成状态机与会话通道
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一行"的完整处理流程
//! - `RowCtx` - 上下文封装（行号 + 归一化字段）
//! - `RowFlow` - 流程编排（标记 → 生成 → 写回终态）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 应用装配与守护循环
//! - `orchestrator/cycle` - 单周期处理器，遍历表格行

pub mod browser;
pub mod config;
pub mod driver;
pub mod error;
pub mod infrastructure;

pub mod orchestrator;
pub mod services;
pub mod state;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{connect_to_browser, find_page_by_url};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::JsExecutor;
pub use orchestrator::{App, CycleOutcome, CycleRunner};
pub use state::{RunState, StateStore};
pub use workflow::{RowCtx, RowFlow, RowOutcome};

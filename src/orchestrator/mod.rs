//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责周期调度和资源装配，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用装配与守护循环
//! - 管理应用生命周期（初始化、守护、退出）
//! - 连接浏览器并装配表格、下载、会话依赖
//! - 按运行状态里的间隔周期触发
//! - 提供不碰浏览器的轻量命令（启动配置、停止、状态）
//!
//! ### `cycle` - 单周期处理器
//! - 读一遍表格并顺序处理所有待处理行
//! - 周期排他（上一轮没完就放弃本轮）
//! - 每行开工前重读运行状态，支持中途叫停
//! - 维护运行状态里的进度统计
//!
//! ### `session` - 会话供应
//! - 在已打开的标签页里定位 Flow 页面
//! - 搭好驱动并挂起会话任务
//! - 页面刷新后重建会话
//!
//! ## 层次关系
//!
//! ```text
//! app (守护循环，持有 Browser)
//!     ↓
//! cycle (处理一个周期的 Vec<Row>)
//!     ↓
//! workflow::RowFlow (处理单个 Row)
//!     ↓
//! driver (页面状态机与会话) / services (表格、下载能力)
//!     ↓
//! infrastructure (基础设施：JsExecutor)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：app 管装配与触发，cycle 管一轮的行处理
//! 2. **资源隔离**：只有编排层持有 Browser 和后台任务句柄
//! 3. **向下依赖**：编排层 → workflow → services/driver → infrastructure
//! 4. **无业务逻辑**：只做调度和统计，不做具体页面判断

pub mod app;
pub mod cycle;
pub mod session;

// 重新导出主要类型
pub use app::{configure_start, request_stop, show_status, App};
pub use cycle::{CycleOutcome, CycleRunner};
pub use session::{CdpSessionProvider, SessionProvider};

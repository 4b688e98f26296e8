//! 命令行入口
//!
//! Usage:
//!   veo-flow start --sheet <链接或ID> [--interval <秒>]  配置并进入守护循环
//!   veo-flow run                                         用已有配置进入守护循环
//!   veo-flow once                                        手动跑一个周期
//!   veo-flow stop                                        请求停止
//!   veo-flow status                                      查看运行状态

use anyhow::Result;
use clap::{Parser, Subcommand};

use veo_flow_automation::orchestrator::{configure_start, request_stop, show_status, App};
use veo_flow_automation::utils::logging;
use veo_flow_automation::Config;

#[derive(Parser)]
#[command(name = "veo-flow")]
#[command(author, version, about = "表格驱动的 Flow 视频生成自动化")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 配置表格、置为启动并进入守护循环
    Start {
        /// 表格链接或裸 ID
        #[arg(long)]
        sheet: String,

        /// 周期间隔（秒），缺省用配置文件里的值
        #[arg(long)]
        interval: Option<u64>,
    },

    /// 用已有配置进入守护循环（不改写启动配置）
    Run,

    /// 手动跑一个周期（守护进程还在跑时可能与其并行，建议先 stop）
    Once,

    /// 请求停止
    Stop,

    /// 查看运行状态
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load();

    let cli = Cli::parse();
    match cli.command {
        Command::Start { sheet, interval } => {
            configure_start(&config, &sheet, interval).await?;
            let app = App::initialize(config).await?;
            app.run_daemon().await?;
        }
        Command::Run => {
            let app = App::initialize(config).await?;
            app.run_daemon().await?;
        }
        Command::Once => {
            let app = App::initialize(config).await?;
            app.run_once().await?;
        }
        Command::Stop => request_stop(&config).await?,
        Command::Status => show_status(&config).await?,
    }

    Ok(())
}

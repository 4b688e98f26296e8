use serde::Deserialize;
use tracing::warn;

/// 默认配置文件路径
const CONFIG_FILE: &str = "automation.toml";

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// Flow 工具标签页的 URL 特征
    pub flow_url_pattern: String,
    /// 工作表标签名
    pub sheet_tab: String,
    /// 默认轮询间隔（秒）
    pub default_check_interval: u64,
    /// 运行状态文件
    pub state_file: String,
    /// 下载目录
    pub download_dir: String,
    /// 服务账号凭证文件（JSON）
    pub service_account_file: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            flow_url_pattern: "labs.google/fx/vi/tools/flow".to_string(),
            sheet_tab: "n8n".to_string(),
            default_check_interval: 60,
            state_file: "flow_state.json".to_string(),
            download_dir: "downloads".to_string(),
            service_account_file: "service_account.json".to_string(),
            output_log_file: "automation.log".to_string(),
            verbose_logging: false,
        }
    }
}

/// automation.toml 中的可选覆盖项
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    browser_debug_port: Option<u16>,
    flow_url_pattern: Option<String>,
    sheet_tab: Option<String>,
    default_check_interval: Option<u64>,
    state_file: Option<String>,
    download_dir: Option<String>,
    service_account_file: Option<String>,
    output_log_file: Option<String>,
    verbose_logging: Option<bool>,
}

impl Config {
    /// 读取配置：默认值 <- automation.toml（若存在） <- 环境变量
    pub fn load() -> Self {
        let base = match std::fs::read_to_string(CONFIG_FILE) {
            Ok(content) => match toml::from_str::<ConfigFile>(&content) {
                Ok(file) => Self::apply_file(Self::default(), file),
                Err(e) => {
                    warn!("⚠️ {} 解析失败，使用默认配置: {}", CONFIG_FILE, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        Self::apply_env(base)
    }

    /// 仅从环境变量读取（忽略配置文件）
    pub fn from_env() -> Self {
        Self::apply_env(Self::default())
    }

    fn apply_file(base: Self, file: ConfigFile) -> Self {
        Self {
            browser_debug_port: file.browser_debug_port.unwrap_or(base.browser_debug_port),
            flow_url_pattern: file.flow_url_pattern.unwrap_or(base.flow_url_pattern),
            sheet_tab: file.sheet_tab.unwrap_or(base.sheet_tab),
            default_check_interval: file.default_check_interval.unwrap_or(base.default_check_interval),
            state_file: file.state_file.unwrap_or(base.state_file),
            download_dir: file.download_dir.unwrap_or(base.download_dir),
            service_account_file: file.service_account_file.unwrap_or(base.service_account_file),
            output_log_file: file.output_log_file.unwrap_or(base.output_log_file),
            verbose_logging: file.verbose_logging.unwrap_or(base.verbose_logging),
        }
    }

    fn apply_env(default: Self) -> Self {
        Self {
            browser_debug_port: std::env::var("BROWSER_DEBUG_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.browser_debug_port),
            flow_url_pattern: std::env::var("FLOW_URL_PATTERN").unwrap_or(default.flow_url_pattern),
            sheet_tab: std::env::var("SHEET_TAB").unwrap_or(default.sheet_tab),
            default_check_interval: std::env::var("DEFAULT_CHECK_INTERVAL").ok().and_then(|v| v.parse().ok()).unwrap_or(default.default_check_interval),
            state_file: std::env::var("STATE_FILE").unwrap_or(default.state_file),
            download_dir: std::env::var("DOWNLOAD_DIR").unwrap_or(default.download_dir),
            service_account_file: std::env::var("SERVICE_ACCOUNT_FILE").unwrap_or(default.service_account_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.browser_debug_port, 9222);
        assert_eq!(config.sheet_tab, "n8n");
        assert_eq!(config.default_check_interval, 60);
        assert!(config.flow_url_pattern.contains("labs.google"));
    }

    #[test]
    fn test_file_overlay_partial() {
        let file: ConfigFile = toml::from_str(
            r#"
            browser_debug_port = 2001
            download_dir = "video_out"
            "#,
        )
        .unwrap();

        let config = Config::apply_file(Config::default(), file);
        assert_eq!(config.browser_debug_port, 2001);
        assert_eq!(config.download_dir, "video_out");
        // 未覆盖的字段保持默认值
        assert_eq!(config.sheet_tab, "n8n");
        assert_eq!(config.state_file, "flow_state.json");
    }
}

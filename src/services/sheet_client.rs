//! 表格存取服务 - 业务能力层
//!
//! 通过 Google Sheets v4 REST 接口读写任务表。读取一律走
//! `values` 端点，写入只更新单元格 A 列的状态值。表格 ID 随
//! 每次调用传入，运行状态里换表后下个周期立即生效。

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::error::{AppError, AppResult, SheetError};
use crate::services::SheetAuth;

/// Sheets v4 接口根地址
const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// 任务表读写抽象
///
/// 周期层只依赖这三个操作，测试用内存实现替换。
#[async_trait]
pub trait RowStore: Send + Sync {
    /// 读整张表（A 到 Z 列），首行是表头
    async fn read_all(&self, sheet_id: &str, tab: &str) -> AppResult<Vec<Vec<String>>>;

    /// 只读状态列（A 列），用于统计
    async fn read_status_column(&self, sheet_id: &str, tab: &str) -> AppResult<Vec<Vec<String>>>;

    /// 把状态写入第 row_number 行的 A 列（row_number 为 1 基）
    async fn write_status(
        &self,
        sheet_id: &str,
        tab: &str,
        row_number: usize,
        value: &str,
    ) -> AppResult<()>;
}

/// Google Sheets 实现
pub struct SheetsRowStore {
    http: Client,
    base_url: String,
    auth: Arc<SheetAuth>,
}

#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<JsonValue>>,
}

impl SheetsRowStore {
    /// 创建新的表格存取服务
    pub fn new(auth: Arc<SheetAuth>) -> Self {
        Self::with_base_url(auth, SHEETS_BASE_URL)
    }

    /// 指定接口根地址创建（测试指向本地假服务）
    pub fn with_base_url(auth: Arc<SheetAuth>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            auth,
        }
    }

    async fn read_range(&self, sheet_id: &str, range: &str) -> AppResult<Vec<Vec<String>>> {
        let endpoint = format!("{}/{}/values/{}", self.base_url, sheet_id, range);
        let token = self.auth.access_token().await?;

        debug!("读取表格范围: {}", range);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::sheet_request_failed(endpoint.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Sheet(SheetError::BadResponse {
                endpoint,
                status: status.as_u16(),
                body,
            }));
        }

        let parsed: ValuesResponse = response
            .json()
            .await
            .map_err(|e| AppError::sheet_request_failed(endpoint, e))?;
        Ok(stringify_values(parsed.values))
    }
}

#[async_trait]
impl RowStore for SheetsRowStore {
    async fn read_all(&self, sheet_id: &str, tab: &str) -> AppResult<Vec<Vec<String>>> {
        self.read_range(sheet_id, &format!("{}!A:Z", tab)).await
    }

    async fn read_status_column(&self, sheet_id: &str, tab: &str) -> AppResult<Vec<Vec<String>>> {
        self.read_range(sheet_id, &format!("{}!A:A", tab)).await
    }

    async fn write_status(
        &self,
        sheet_id: &str,
        tab: &str,
        row_number: usize,
        value: &str,
    ) -> AppResult<()> {
        let endpoint = format!(
            "{}/{}/values/{}!A{}?valueInputOption=RAW",
            self.base_url, sheet_id, tab, row_number
        );
        let token = self.auth.access_token().await?;

        debug!("写入第 {} 行状态: {}", row_number, value);
        let response = self
            .http
            .put(&endpoint)
            .bearer_auth(token)
            .json(&json!({ "values": [[value]] }))
            .send()
            .await
            .map_err(|e| AppError::sheet_request_failed(endpoint.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Sheet(SheetError::BadResponse {
                endpoint,
                status: status.as_u16(),
                body,
            }));
        }

        Ok(())
    }
}

/// 把接口返回的任意单元格值统一成字符串
fn stringify_values(values: Vec<Vec<JsonValue>>) -> Vec<Vec<String>> {
    values
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|cell| match cell {
                    JsonValue::String(s) => s,
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

/// 从用户输入解析表格 ID
///
/// 接受两种形态：裸 ID（不含斜杠和 http 字样）原样返回，
/// 完整链接从 `/spreadsheets/d/<id>` 段提取。
pub fn extract_sheet_id(input: &str) -> AppResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::Sheet(SheetError::InvalidReference {
            input: input.to_string(),
        }));
    }
    if !trimmed.contains('/') && !trimmed.contains("http") {
        return Ok(trimmed.to_string());
    }

    let re = Regex::new(r"/spreadsheets/d/([a-zA-Z0-9\-_]+)")
        .map_err(|e| AppError::Other(format!("表格链接正则无效: {}", e)))?;
    match re.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(id) => Ok(id.as_str().to_string()),
        None => Err(AppError::Sheet(SheetError::InvalidReference {
            input: input.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bare_id() {
        let id = extract_sheet_id("  1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms  ").unwrap();
        assert_eq!(id, "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms");
    }

    #[test]
    fn test_extract_id_from_full_url() {
        let id = extract_sheet_id(
            "https://docs.google.com/spreadsheets/d/1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms/edit#gid=0",
        )
        .unwrap();
        assert_eq!(id, "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms");
    }

    #[test]
    fn test_extract_rejects_unrelated_url() {
        assert!(extract_sheet_id("https://example.com/whatever").is_err());
        assert!(extract_sheet_id("   ").is_err());
    }

    #[test]
    fn test_stringify_values_mixed_cells() {
        let rows = vec![
            vec![json!("Done"), json!(42), json!(true)],
            vec![json!("")],
        ];

        let strings = stringify_values(rows);
        assert_eq!(strings[0], vec!["Done", "42", "true"]);
        assert_eq!(strings[1], vec![""]);
    }
}

//! 运行状态持久化
//!
//! 整个自动化的开关、表格配置和统计信息都保存在一个 JSON 文件里，
//! 文件中只有一个 `flowState` 键。停止命令就是把 `isRunning` 改写为
//! false，守护循环和行循环会在下一个检查点协作退出。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// 自动化运行状态
///
/// 字段名按 camelCase 序列化，processedRowKeys 以数组形式落盘、
/// 加载时还原为集合。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RunState {
    /// 自动化是否在运行
    pub is_running: bool,
    /// 目标表格 ID
    pub client_sheet_id: String,
    /// 工作表标签名
    pub sheet_name: String,
    /// 轮询间隔（秒）
    pub auto_check_interval: u64,
    /// 已处理行数（按表格中 Done 统计）
    pub processed_rows: usize,
    /// 数据行总数
    pub total_rows: usize,
    /// 本轮运行中标记为 Done 的行键（"表格ID:行号"）
    pub processed_row_keys: HashSet<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            is_running: false,
            client_sheet_id: String::new(),
            sheet_name: "n8n".to_string(),
            auto_check_interval: 60,
            processed_rows: 0,
            total_rows: 0,
            processed_row_keys: HashSet::new(),
        }
    }
}

impl RunState {
    /// 生成行键
    pub fn row_key(sheet_id: &str, row_number: usize) -> String {
        format!("{}:{}", sheet_id, row_number)
    }
}

/// 状态文件的顶层结构
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(rename = "flowState", default)]
    flow_state: RunState,
}

/// 状态存取器
///
/// 每次保存都是整文件重写；读取不存在的文件返回默认状态。
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取运行状态，文件不存在时返回默认值
    pub async fn load(&self) -> AppResult<RunState> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RunState::default());
            }
            Err(e) => {
                return Err(AppError::file_read_failed(
                    self.path.display().to_string(),
                    e,
                ));
            }
        };

        let file: StateFile = serde_json::from_str(&content)
            .map_err(|e| AppError::json_parse_failed(self.path.display().to_string(), e))?;
        Ok(file.flow_state)
    }

    /// 整文件重写保存
    pub async fn save(&self, state: &RunState) -> AppResult<()> {
        let file = StateFile {
            flow_state: state.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| AppError::file_write_failed(self.path.display().to_string(), e))?;
        Ok(())
    }

    /// 读取、修改、写回
    pub async fn update<F>(&self, mutate: F) -> AppResult<RunState>
    where
        F: FnOnce(&mut RunState),
    {
        let mut state = self.load().await?;
        mutate(&mut state);
        self.save(&state).await?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("flow_state.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default() {
        let (_dir, store) = temp_store();
        let state = store.load().await.unwrap();
        assert_eq!(state, RunState::default());
        assert!(!state.is_running);
        assert_eq!(state.sheet_name, "n8n");
    }

    #[tokio::test]
    async fn test_save_load_round_trip_with_key_set() {
        let (_dir, store) = temp_store();

        let mut state = RunState {
            is_running: true,
            client_sheet_id: "abc123".to_string(),
            auto_check_interval: 30,
            total_rows: 5,
            processed_rows: 2,
            ..Default::default()
        };
        state
            .processed_row_keys
            .insert(RunState::row_key("abc123", 2));
        state
            .processed_row_keys
            .insert(RunState::row_key("abc123", 4));

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.processed_row_keys.contains("abc123:4"));
    }

    #[tokio::test]
    async fn test_wire_format_is_camel_case_under_flow_state() {
        let (_dir, store) = temp_store();
        store.save(&RunState::default()).await.unwrap();

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let flow_state = value.get("flowState").expect("缺少 flowState 键");
        assert!(flow_state.get("isRunning").is_some());
        assert!(flow_state.get("clientSheetId").is_some());
        assert!(flow_state.get("autoCheckInterval").is_some());
        // 集合序列化为数组
        assert!(flow_state.get("processedRowKeys").unwrap().is_array());
    }

    #[tokio::test]
    async fn test_update_persists_mutation() {
        let (_dir, store) = temp_store();
        store
            .update(|s| {
                s.is_running = true;
                s.client_sheet_id = "sheet-1".to_string();
            })
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert!(loaded.is_running);
        assert_eq!(loaded.client_sheet_id, "sheet-1");

        store.update(|s| s.is_running = false).await.unwrap();
        assert!(!store.load().await.unwrap().is_running);
    }
}

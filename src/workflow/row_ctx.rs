//! 行处理上下文
//!
//! 封装"我正在处理表格的哪一行"这一信息。表头在这里归一化成
//! 小写键，生成任务需要的字段都从归一化后的映射里取。

use std::collections::HashMap;
use std::fmt::Display;

use crate::driver::VideoJob;

/// 行里没给生成数量时采用的默认值
const DEFAULT_VIDEO_COUNT: u32 = 2;

/// 行处理上下文
///
/// 包含处理单行所需的全部信息
#[derive(Debug, Clone)]
pub struct RowCtx {
    /// 表格中的行号（1 基，含表头行）
    pub row_number: usize,

    /// 归一化后的字段映射：键去空白并转小写，缺失的单元格补空串
    pub fields: HashMap<String, String>,

    /// A 列的原始状态值
    pub status: String,
}

impl RowCtx {
    /// 从表头和一行单元格创建上下文
    ///
    /// 行比表头短时缺失的列按空串处理；归一化后重复的表头以
    /// 靠后的列为准。
    pub fn from_row(row_number: usize, headers: &[String], row: &[String]) -> Self {
        let mut fields = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            let key = header.trim().to_lowercase();
            let value = row.get(index).cloned().unwrap_or_default();
            fields.insert(key, value);
        }
        let status = row.first().cloned().unwrap_or_default();

        Self {
            row_number,
            fields,
            status,
        }
    }

    /// 该行是否已处理完
    pub fn is_done(&self) -> bool {
        self.status.trim().to_lowercase() == "done"
    }

    /// 提示词，缺失时为空串
    pub fn prompt(&self) -> &str {
        self.field("prompt")
    }

    /// 画幅比例：先看 format 列，再看 aspect_ratio 列
    pub fn aspect_ratio(&self) -> Option<String> {
        ["format", "aspect_ratio"]
            .iter()
            .map(|key| self.field(key).trim())
            .find(|value| !value.is_empty())
            .map(|value| value.to_string())
    }

    /// 生成数量：先看 videos to generate 列，再看 video_count 列
    ///
    /// 缺失、空串或解析不了的值一律回退到默认值。
    pub fn video_count(&self) -> u32 {
        ["videos to generate", "video_count"]
            .iter()
            .map(|key| self.field(key).trim())
            .find(|value| !value.is_empty())
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_VIDEO_COUNT)
    }

    /// 组装本行的生成任务
    pub fn video_job(&self) -> VideoJob {
        VideoJob {
            row_number: self.row_number,
            prompt: self.prompt().to_string(),
            aspect_ratio: self.aspect_ratio(),
            video_count: self.video_count(),
        }
    }

    fn field(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }
}

impl Display for RowCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[行 #{} 状态#{}]", self.row_number, self.status)
    }
}

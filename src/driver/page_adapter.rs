//! DOM 原子操作抽象
//!
//! 驱动状态机只通过 [`PageAdapter`] 接触页面：每个方法是一次
//! 无内部等待的探测或动作，轮询节奏由上层控制。CDP 实现把
//! 原子操作翻译成 document.evaluate 片段交给 JsExecutor 执行。

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::driver::DriveError;
use crate::infrastructure::JsExecutor;

/// 页面原子操作
#[async_trait]
pub trait PageAdapter: Send + Sync {
    /// 元素当前是否可见
    async fn is_visible(&self, xpath: &str) -> Result<bool, DriveError>;

    /// 点击第一个可见匹配；元素不存在或不可见时返回 false
    async fn click(&self, xpath: &str) -> Result<bool, DriveError>;

    /// 清空并写入文本，派发 input/change/keydown/keyup 事件；
    /// 元素不存在或不可见时返回 false
    async fn write_text(&self, xpath: &str, text: &str) -> Result<bool, DriveError>;

    /// 匹配节点总数（快照，不判断可见性）
    async fn count_nodes(&self, xpath: &str) -> Result<usize, DriveError>;

    /// 点击快照中的第 index 个节点；节点不存在时返回 false
    async fn click_nth(&self, xpath: &str, index: usize) -> Result<bool, DriveError>;

    /// 安排页面在 delay 后自行刷新
    async fn schedule_reload(&self, delay: Duration) -> Result<(), DriveError>;

    /// 页面是否还能执行脚本
    async fn is_alive(&self) -> bool;
}

/// CDP 实现
pub struct CdpPageAdapter {
    executor: JsExecutor,
}

impl CdpPageAdapter {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &JsExecutor {
        &self.executor
    }

    async fn eval_bool(&self, js_code: String) -> Result<bool, DriveError> {
        self.executor
            .eval_as::<bool>(js_code)
            .await
            .map_err(DriveError::script)
    }
}

#[async_trait]
impl PageAdapter for CdpPageAdapter {
    async fn is_visible(&self, xpath: &str) -> Result<bool, DriveError> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                return !!(el && el.offsetParent !== null);
            }})()
            "#,
            xpath = js_string(xpath)?,
        );
        self.eval_bool(js_code).await
    }

    async fn click(&self, xpath: &str) -> Result<bool, DriveError> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                if (!el || el.offsetParent === null) {{
                    return false;
                }}
                el.click();
                return true;
            }})()
            "#,
            xpath = js_string(xpath)?,
        );
        self.eval_bool(js_code).await
    }

    async fn write_text(&self, xpath: &str, text: &str) -> Result<bool, DriveError> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.evaluate({xpath}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                if (!el || el.offsetParent === null) {{
                    return false;
                }}
                el.value = '';
                el.textContent = '';
                el.focus();
                document.execCommand('selectAll', false, null);
                document.execCommand('delete', false, null);
                el.value = {text};
                el.textContent = {text};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                el.dispatchEvent(new KeyboardEvent('keydown', {{ bubbles: true }}));
                el.dispatchEvent(new KeyboardEvent('keyup', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            xpath = js_string(xpath)?,
            text = js_string(text)?,
        );
        self.eval_bool(js_code).await
    }

    async fn count_nodes(&self, xpath: &str) -> Result<usize, DriveError> {
        let js_code = format!(
            r#"
            (() => {{
                const snapshot = document.evaluate({xpath}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                return snapshot.snapshotLength;
            }})()
            "#,
            xpath = js_string(xpath)?,
        );
        self.executor
            .eval_as::<usize>(js_code)
            .await
            .map_err(DriveError::script)
    }

    async fn click_nth(&self, xpath: &str, index: usize) -> Result<bool, DriveError> {
        let js_code = format!(
            r#"
            (() => {{
                const snapshot = document.evaluate({xpath}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                const el = snapshot.snapshotItem({index});
                if (!el) {{
                    return false;
                }}
                el.click();
                return true;
            }})()
            "#,
            xpath = js_string(xpath)?,
            index = index,
        );
        self.eval_bool(js_code).await
    }

    async fn schedule_reload(&self, delay: Duration) -> Result<(), DriveError> {
        let js_code = format!(
            r#"
            (() => {{
                setTimeout(() => {{ location.reload(); }}, {});
                return true;
            }})()
            "#,
            delay.as_millis(),
        );
        self.eval_bool(js_code).await?;
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        match self.executor.eval_as::<bool>("true").await {
            Ok(alive) => alive,
            Err(e) => {
                debug!("页面存活探测失败: {}", e);
                false
            }
        }
    }
}

/// 把任意文本编码为 JS 字符串字面量
fn js_string(text: &str) -> Result<String, DriveError> {
    serde_json::to_string(text).map_err(DriveError::script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_escapes_quotes_and_newlines() {
        let encoded = js_string(r#"a "quoted" prompt
second line"#)
        .unwrap();
        assert_eq!(encoded, r#""a \"quoted\" prompt\nsecond line""#);
    }

    #[test]
    fn test_js_string_keeps_xpath_intact() {
        let encoded = js_string(r#"//button//i[contains(text(), "add")]"#).unwrap();
        assert!(encoded.starts_with('"') && encoded.ends_with('"'));
        assert!(encoded.contains(r#"\"add\""#));
    }
}

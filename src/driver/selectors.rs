//! Flow 页面选择器表
//!
//! 页面没有稳定的 id/class，定位全部依赖 Material 图标文本和
//! 控件的相对位置。改版时优先核对这张表。

/// 新建项目按钮（"add" 图标）
pub const START_PROJECT: &str = r#"//button//i[contains(text(), "add")]"#;

/// 提示词输入框
pub const PROMPT_INPUT: &str = r#"//textarea"#;

/// 设置面板开关（"volume_up" 图标所在的非下拉按钮）
pub const SETTINGS_DIALOG: &str = r#"//button[not(@aria-haspopup)]//*[text()="volume_up"]/.."#;

/// 画幅比例下拉框
pub const ASPECT_RATIO_DROPDOWN: &str =
    r#"//*[text()="crop_landscape" or text()="crop_portrait"]/.."#;

/// 生成数量下拉框（设置面板中的第二个按钮）
pub const VIDEO_COUNT_DROPDOWN: &str =
    r#"(//button[../..//*[text()="crop_landscape" or text()="crop_portrait"]])[2]"#;

/// 提交按钮（"arrow_forward" 图标）
pub const SUBMIT_BUTTON: &str = r#"(//*[text()="arrow_forward"]/ancestor::button)[1]"#;

/// 生成进度指示（带百分号的文本节点）
pub const LOADING_INDICATOR: &str = r#"//*[text()="%"]"#;

/// 每个视频卡片上的下载下拉按钮
pub const DOWNLOAD_DROPDOWN: &str = r#"(//button[@id]//i[text()="download"]/..)"#;

/// 下载菜单里的原画质菜单项
pub const DOWNLOAD_MENU_ITEM: &str = r#"(//*[@role="menuitem"])[2]"#;

/// 画幅比例选项
pub fn aspect_ratio_option(ratio: &str) -> String {
    format!(r#"//span[contains(text(), "{}")]"#, ratio)
}

/// 生成数量选项
pub fn videos_count_option(count: u32) -> String {
    format!(r#"//span[contains(text(), "{}")]"#, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_selectors_interpolate() {
        assert_eq!(
            aspect_ratio_option("16:9"),
            r#"//span[contains(text(), "16:9")]"#
        );
        assert_eq!(
            videos_count_option(4),
            r#"//span[contains(text(), "4")]"#
        );
    }
}

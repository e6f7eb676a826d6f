//! JS 执行器 - 基础设施层
//!
//! 持有一个会话的 page 资源，只暴露"执行 JS"和"滚动页面"的能力

use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::AppResult;

/// JS 执行器
///
/// 职责：
/// - 持有会话唯一的 Page
/// - 暴露 eval() 能力
/// - 不认识主页 / 账号
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于导航、cookie、PDF 等操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 分步滚动到页面底部再回到顶部，触发懒加载的区块
    pub async fn scroll_through(&self, step_px: u32, pause: Duration) -> AppResult<()> {
        let height: u64 = self
            .eval_as("document.body ? document.body.scrollHeight : 0")
            .await?;

        let mut position = 0u64;
        while position < height {
            position += step_px as u64;
            self.eval(format!("window.scrollTo(0, {})", position)).await?;
            sleep(pause).await;
        }

        self.eval("window.scrollTo(0, 0)").await?;
        Ok(())
    }
}

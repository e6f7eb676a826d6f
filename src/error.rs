use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 存储相关错误（本地文件、仓库、对象存储）
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("启动浏览器失败 (账号: {account}): {source}")]
    LaunchFailed {
        account: String,
        #[source]
        source: BoxedSource,
    },
    /// 浏览器配置失败
    #[error("浏览器配置失败: {message}")]
    ConfigurationFailed { message: String },
    /// 导航失败
    #[error("导航到 {url} 失败: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: BoxedSource,
    },
    /// 页面元素不存在
    #[error("页面元素不存在: {selector}")]
    ElementNotFound { selector: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: BoxedSource,
    },
    /// 会话已结束
    #[error("会话已结束 (账号: {account})")]
    SessionClosed { account: String },
}

/// 存储相关错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: BoxedSource,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: BoxedSource,
    },
    /// 删除文件失败
    #[error("删除文件失败 ({path}): {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: BoxedSource,
    },
    /// 序列化失败
    #[error("序列化失败 ({what}): {source}")]
    SerializeFailed {
        what: String,
        #[source]
        source: BoxedSource,
    },
    /// ID 不能作为路径段使用
    #[error("非法的存储键: {key:?}")]
    InvalidKey { key: String },
    /// 外部协作方拒绝写入
    #[error("外部存储拒绝请求 ({collaborator}): {message}")]
    Rejected {
        collaborator: String,
        message: String,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 环境变量不存在
    #[error("环境变量 {var_name} 不存在")]
    EnvVarNotFound { var_name: String },
    /// 没有可用账号
    #[error("没有配置任何账号")]
    NoAccounts,
    /// 指定的账号不在配置里
    #[error("账号 {email} 没有配置")]
    UnknownAccount { email: String },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(StorageError::SerializeFailed {
            what: "json".to_string(),
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器启动错误
    pub fn browser_launch_failed(
        account: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            account: account.into(),
            source: Box::new(source),
        })
    }

    /// 创建导航失败错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件删除错误
    pub fn file_delete_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::DeleteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

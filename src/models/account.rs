use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

use crate::error::{AppResult, ConfigError};

/// 账号状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountState {
    /// 空闲，可被借出
    Idle,
    /// 已借出给某个 worker
    Active,
    /// 冷却中
    CoolingDown,
    /// 本次运行内永久停用
    Disabled,
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountState::Idle => "idle",
            AccountState::Active => "active",
            AccountState::CoolingDown => "cooling-down",
            AccountState::Disabled => "disabled",
        };
        f.write_str(label)
    }
}

/// 凭据引用
///
/// 只保存存放密码的环境变量名，登录时才解析出真正的密码
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRef(String);

impl CredentialRef {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self(env_var.into())
    }

    pub fn env_var(&self) -> &str {
        &self.0
    }

    /// 解析出密码
    pub fn resolve(&self) -> AppResult<String> {
        std::env::var(&self.0).map_err(|_| {
            ConfigError::EnvVarNotFound {
                var_name: self.0.clone(),
            }
            .into()
        })
    }
}

/// 账号配置（来自环境变量）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub email: String,
    pub credential_ref: CredentialRef,
}

/// 账号身份
#[derive(Debug, Clone)]
pub struct AccountIdentity {
    pub email: String,
    pub credential_ref: CredentialRef,
    /// Cookie 存储键
    pub cookie_key: String,
    pub state: AccountState,
    pub cooldown_until: Option<Instant>,
    /// 连续硬失败次数
    pub consecutive_failures: u32,
}

impl AccountIdentity {
    pub fn from_config(config: &AccountConfig) -> Self {
        Self {
            email: config.email.clone(),
            credential_ref: config.credential_ref.clone(),
            cookie_key: cookie_key_for(&config.email),
            state: AccountState::Idle,
            cooldown_until: None,
            consecutive_failures: 0,
        }
    }
}

/// cookie 收集 / 校验的单账号结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieReport {
    pub email: String,
    pub status: CookieStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieStatus {
    /// 登录成功，cookie 已写入存储
    Saved,
    Failed(String),
    /// 保存的 cookie 仍被站点接受
    Valid,
    Invalid(String),
    Missing,
}

impl CookieStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, CookieStatus::Saved | CookieStatus::Valid)
    }
}

impl fmt::Display for CookieStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CookieStatus::Saved => write!(f, "✓ 已保存"),
            CookieStatus::Failed(reason) => write!(f, "✗ 失败: {}", reason),
            CookieStatus::Valid => write!(f, "✓ 有效"),
            CookieStatus::Invalid(reason) => write!(f, "✗ 无效: {}", reason),
            CookieStatus::Missing => write!(f, "- 未保存 cookie"),
        }
    }
}

/// 把邮箱转换为文件系统安全的 cookie 键
pub fn cookie_key_for(email: &str) -> String {
    email.replace('@', "_at_").replace('.', "_")
}

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::error::ConfigError;
use crate::models::account::{AccountConfig, CredentialRef};

/// 命令行参数（覆盖环境变量中的同名配置）
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "alumni-harvester", about = "批量抓取校友主页数据和 PDF 快照")]
pub struct CliArgs {
    /// 本次最多处理的目标数
    #[arg(long)]
    pub max_profiles: Option<usize>,
    /// 执行完整流程但不写入仓库和对象存储
    #[arg(long)]
    pub dry_run: bool,
    /// 工作清单 TOML 文件
    #[arg(long)]
    pub worklist: Option<PathBuf>,
    /// 运行汇总 JSON 输出路径
    #[arg(long)]
    pub summary: Option<PathBuf>,
    /// 输出 debug 日志
    #[arg(long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// 子命令；不带子命令时执行批量抓取
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// 用可见浏览器登录并保存 cookie，遇到验证挑战时等待人工完成
    CollectCookies {
        /// 只处理这个账号，默认处理所有配置的账号
        #[arg(long)]
        email: Option<String>,
        /// 只检查已保存的 cookie 是否仍然有效
        #[arg(long)]
        validate: bool,
    },
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- 运行参数 ---
    /// 本次最多处理的目标数
    pub max_profiles: usize,
    /// 只跑流程，不落库
    pub dry_run: bool,
    /// worker 上限，0 表示与账号数相同
    pub max_workers: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,

    // --- 文件路径 ---
    pub worklist_file: PathBuf,
    pub retry_worklist_file: PathBuf,
    pub summary_file: PathBuf,
    pub outcome_log_file: PathBuf,
    pub cookies_dir: PathBuf,
    pub output_dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub browser_profile_dir: PathBuf,

    // --- 浏览器 ---
    pub chrome_executable: Option<String>,
    pub headless: bool,
    pub site_base_url: String,
    pub login_path: String,
    pub session_check_path: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    /// 导航完成后等待页面渲染的时间
    pub page_settle_ms: u64,
    /// 单次浏览器操作的硬超时
    pub fetch_timeout_secs: u64,
    /// 凭据登录最多尝试次数
    pub login_attempts: u32,
    /// 收集 cookie 时等待人工完成验证的时间
    pub manual_verification_secs: u64,

    // --- 限速 / 退避 ---
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub min_request_spacing_secs: u64,
    pub request_jitter_secs: u64,

    // --- 账号池 ---
    pub hard_failure_limit: u32,
    pub collaborator_failure_limit: u32,
    /// 连续多少次认证超时后停用账号
    pub auth_timeout_limit: u32,
    pub profiles_per_session: u32,
    pub session_break_minutes: u64,

    // --- 页面分类关键字 ---
    pub not_found_markers: Vec<String>,
    pub soft_block_markers: Vec<String>,
    pub hard_block_markers: Vec<String>,

    // --- 账号 ---
    pub accounts: Vec<AccountConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_profiles: 100,
            dry_run: false,
            max_workers: 0,
            verbose_logging: false,
            worklist_file: PathBuf::from("worklist.toml"),
            retry_worklist_file: PathBuf::from("retry_worklist.toml"),
            summary_file: PathBuf::from("run_summary.json"),
            outcome_log_file: PathBuf::from("logs/outcomes.jsonl"),
            cookies_dir: PathBuf::from("cookies"),
            output_dir: PathBuf::from("output"),
            pdf_dir: PathBuf::from("pdfs"),
            browser_profile_dir: PathBuf::from("browser_profiles"),
            chrome_executable: None,
            headless: true,
            site_base_url: "https://www.linkedin.com".to_string(),
            login_path: "/login".to_string(),
            session_check_path: "/feed/".to_string(),
            username_selector: "input#username".to_string(),
            password_selector: "input#password".to_string(),
            submit_selector: r#"button[type="submit"]"#.to_string(),
            page_settle_ms: 3000,
            fetch_timeout_secs: 60,
            login_attempts: 2,
            manual_verification_secs: 300,
            backoff_base_secs: 30,
            backoff_max_secs: 30 * 60,
            min_request_spacing_secs: 5,
            request_jitter_secs: 5,
            hard_failure_limit: 1,
            collaborator_failure_limit: 3,
            auth_timeout_limit: 3,
            profiles_per_session: 50,
            session_break_minutes: 30,
            not_found_markers: to_strings(&["page not found", "profile unavailable", "/404"]),
            soft_block_markers: to_strings(&[
                "/checkpoint",
                "security verification",
                "captcha",
                "too many requests",
                "unusual activity",
            ]),
            hard_block_markers: to_strings(&[
                "/login",
                "/authwall",
                "/uas/login",
                "account restricted",
            ]),
            accounts: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_profiles: env_parse("MAX_PROFILES", default.max_profiles),
            dry_run: env_parse("DRY_RUN", default.dry_run),
            max_workers: env_parse("MAX_WORKERS", default.max_workers),
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging),
            worklist_file: env_path("WORKLIST_FILE", default.worklist_file),
            retry_worklist_file: env_path("RETRY_WORKLIST_FILE", default.retry_worklist_file),
            summary_file: env_path("SUMMARY_FILE", default.summary_file),
            outcome_log_file: env_path("OUTCOME_LOG_FILE", default.outcome_log_file),
            cookies_dir: env_path("COOKIES_DIR", default.cookies_dir),
            output_dir: env_path("OUTPUT_DIR", default.output_dir),
            pdf_dir: env_path("PDF_DIR", default.pdf_dir),
            browser_profile_dir: env_path("BROWSER_PROFILE_DIR", default.browser_profile_dir),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(default.chrome_executable),
            headless: env_parse("BROWSER_HEADLESS", default.headless),
            site_base_url: std::env::var("SITE_BASE_URL").unwrap_or(default.site_base_url),
            login_path: std::env::var("LOGIN_PATH").unwrap_or(default.login_path),
            session_check_path: std::env::var("SESSION_CHECK_PATH").unwrap_or(default.session_check_path),
            username_selector: std::env::var("USERNAME_SELECTOR").unwrap_or(default.username_selector),
            password_selector: std::env::var("PASSWORD_SELECTOR").unwrap_or(default.password_selector),
            submit_selector: std::env::var("SUBMIT_SELECTOR").unwrap_or(default.submit_selector),
            page_settle_ms: env_parse("PAGE_SETTLE_MS", default.page_settle_ms),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", default.fetch_timeout_secs),
            login_attempts: env_parse("LOGIN_ATTEMPTS", default.login_attempts),
            manual_verification_secs: env_parse("MANUAL_VERIFICATION_SECS", default.manual_verification_secs),
            backoff_base_secs: env_parse("BACKOFF_BASE_SECS", default.backoff_base_secs),
            backoff_max_secs: env_parse("BACKOFF_MAX_SECS", default.backoff_max_secs),
            min_request_spacing_secs: env_parse("RATE_LIMIT_DELAY", default.min_request_spacing_secs),
            request_jitter_secs: env_parse("REQUEST_JITTER_SECS", default.request_jitter_secs),
            hard_failure_limit: env_parse("HARD_FAILURE_LIMIT", default.hard_failure_limit),
            collaborator_failure_limit: env_parse("COLLABORATOR_FAILURE_LIMIT", default.collaborator_failure_limit),
            auth_timeout_limit: env_parse("AUTH_TIMEOUT_LIMIT", default.auth_timeout_limit),
            profiles_per_session: env_parse("MAX_PROFILES_PER_SESSION", default.profiles_per_session),
            session_break_minutes: env_parse("SESSION_BREAK_MINUTES", default.session_break_minutes),
            not_found_markers: env_list("NOT_FOUND_MARKERS", default.not_found_markers),
            soft_block_markers: env_list("SOFT_BLOCK_MARKERS", default.soft_block_markers),
            hard_block_markers: env_list("HARD_BLOCK_MARKERS", default.hard_block_markers),
            accounts: load_accounts_from_env(),
        }
    }

    /// 用命令行参数覆盖
    pub fn with_cli(mut self, args: &CliArgs) -> Self {
        if let Some(max) = args.max_profiles {
            self.max_profiles = max;
        }
        if args.dry_run {
            self.dry_run = true;
        }
        if let Some(path) = &args.worklist {
            self.worklist_file = path.clone();
        }
        if let Some(path) = &args.summary {
            self.summary_file = path.clone();
        }
        if args.verbose {
            self.verbose_logging = true;
        }
        self
    }

    /// 检查配置，返回问题列表
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.accounts.is_empty() {
            issues.push("没有配置任何账号 (ACCOUNTS_JSON 或 ACCOUNT_EMAIL_<n>)".to_string());
        }
        if self.max_profiles == 0 {
            issues.push("MAX_PROFILES 为 0，不会处理任何目标".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            issues.push("FETCH_TIMEOUT_SECS 必须大于 0".to_string());
        }
        if self.backoff_max_secs < self.backoff_base_secs {
            issues.push("BACKOFF_MAX_SECS 小于 BACKOFF_BASE_SECS".to_string());
        }
        if self.login_attempts == 0 {
            issues.push("LOGIN_ATTEMPTS 必须大于 0".to_string());
        }

        issues
    }

    pub fn login_url(&self) -> String {
        join_url(&self.site_base_url, &self.login_path)
    }

    pub fn session_check_url(&self) -> String {
        join_url(&self.site_base_url, &self.session_check_path)
    }
}

/// 从 JSON 数组解析账号列表
///
/// 格式：`[{"email": "...", "credential_ref": "ENV_VAR_NAME"}]`
pub fn parse_accounts_json(json: &str) -> Result<Vec<AccountConfig>, serde_json::Error> {
    serde_json::from_str(json)
}

fn load_accounts_from_env() -> Vec<AccountConfig> {
    if let Ok(json) = std::env::var("ACCOUNTS_JSON") {
        match parse_accounts_json(&json) {
            Ok(accounts) => return accounts,
            Err(e) => {
                tracing::warn!("ACCOUNTS_JSON 解析失败，改用 ACCOUNT_EMAIL_<n>: {}", e);
            }
        }
    }

    // 最多支持 9 组单独配置的账号
    (1..10)
        .filter_map(|i| {
            let email = std::env::var(format!("ACCOUNT_EMAIL_{}", i)).ok()?;
            let password_var = format!("ACCOUNT_PASSWORD_{}", i);
            if email.is_empty() || std::env::var(&password_var).is_err() {
                return None;
            }
            Some(AccountConfig {
                email,
                credential_ref: CredentialRef::new(password_var),
            })
        })
        .collect()
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            let err = ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value: raw.clone(),
                expected_type: std::any::type_name::<T>().to_string(),
            };
            tracing::warn!("{}，使用默认值", err);
            default
        }
    }
}

fn env_path(name: &str, default: PathBuf) -> PathBuf {
    std::env::var(name).map(PathBuf::from).unwrap_or(default)
}

fn env_list(name: &str, default: Vec<String>) -> Vec<String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => default,
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_json_array() {
        let accounts = parse_accounts_json(
            r#"[{"email":"a@x.io","credential_ref":"PW_A"},{"email":"b@x.io","credential_ref":"PW_B"}]"#,
        )
        .unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[1].credential_ref.env_var(), "PW_B");
    }

    #[test]
    fn cli_overrides_env_values() {
        let args = CliArgs {
            max_profiles: Some(3),
            dry_run: true,
            worklist: Some(PathBuf::from("w.toml")),
            ..Default::default()
        };
        let config = Config::default().with_cli(&args);
        assert_eq!(config.max_profiles, 3);
        assert!(config.dry_run);
        assert_eq!(config.worklist_file, PathBuf::from("w.toml"));
    }

    #[test]
    fn collect_cookies_subcommand_parses() {
        let args = CliArgs::try_parse_from([
            "alumni-harvester",
            "collect-cookies",
            "--email",
            "a@site.test",
        ])
        .unwrap();
        match args.command {
            Some(Command::CollectCookies { email, validate }) => {
                assert_eq!(email.as_deref(), Some("a@site.test"));
                assert!(!validate);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let args = CliArgs::try_parse_from(["alumni-harvester", "--dry-run"]).unwrap();
        assert!(args.command.is_none());
        assert!(args.dry_run);
    }

    #[test]
    fn validate_reports_missing_accounts() {
        let issues = Config::default().validate();
        assert!(issues.iter().any(|i| i.contains("账号")));
    }

    #[test]
    fn urls_join_without_double_slash() {
        let config = Config::default();
        assert_eq!(config.login_url(), "https://www.linkedin.com/login");
        assert_eq!(config.session_check_url(), "https://www.linkedin.com/feed/");
    }
}

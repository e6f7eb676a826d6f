#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alumni_harvester::browser::BrowserBackend;
use alumni_harvester::clients::{AlumniRepository, PdfStorage};
use alumni_harvester::config::Config;
use alumni_harvester::error::{AppResult, StorageError};
use alumni_harvester::infrastructure::{CookieSet, CookieStore};
use alumni_harvester::models::{
    AccountConfig, AccountIdentity, CanonicalProfileRecord, CredentialRef, EducationEntry,
    JobEntry, ProfilePage, RawListItem, ScrapeTarget,
};
use alumni_harvester::services::KeywordClassifier;
use alumni_harvester::BatchOrchestrator;
use async_trait::async_trait;

pub const SITE: &str = "https://site.test";
pub const PASSWORD_VAR: &str = "HARVESTER_TEST_ACCOUNT_PASSWORD";

pub fn email(i: usize) -> String {
    format!("acc{}@site.test", i)
}

pub fn config(accounts: usize) -> Config {
    std::env::set_var(PASSWORD_VAR, "correct-horse");
    Config {
        site_base_url: SITE.to_string(),
        min_request_spacing_secs: 0,
        request_jitter_secs: 0,
        backoff_base_secs: 30,
        backoff_max_secs: 600,
        fetch_timeout_secs: 60,
        accounts: (1..=accounts)
            .map(|i| AccountConfig {
                email: email(i),
                credential_ref: CredentialRef::new(PASSWORD_VAR),
            })
            .collect(),
        ..Config::default()
    }
}

/// 目标 i：校友 ID 为 "i"，主页 ID 为 "t<i>"
pub fn targets(n: usize) -> Vec<ScrapeTarget> {
    (1..=n)
        .map(|i| ScrapeTarget::new(i.to_string(), format!("t{}", i)))
        .collect()
}

pub struct MockSession {
    account: String,
}

/// 脚本化的浏览器后端
///
/// - 每个账号的抓取延迟可单独设置（配合暂停的 tokio 时钟得到确定的调度顺序）
/// - `soft_block` 中的主页返回验证挑战页
/// - `hard_block_accounts` 中的账号每次抓取都被踢回登录页
/// - `hang_login` / `hang_fetch` 让登录页或主页永远不返回
/// - `stale_cookies` 时保存的 cookie 被踢回登录页；`login_challenge` 时登录落到验证页，
///   之后轮询当前页面视为验证已完成
/// - 记录每个账号同时在抓取的数量，以及启动 / 关闭的浏览器数
#[derive(Default)]
pub struct MockBackend {
    latencies: HashMap<String, Duration>,
    soft_block: HashSet<String>,
    hard_block_accounts: HashSet<String>,
    hang_login: bool,
    hang_fetch: bool,
    stale_cookies: bool,
    login_challenge: bool,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
    opened: Mutex<usize>,
    closed: Mutex<usize>,
    fetches: Mutex<Vec<(String, String)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latency(mut self, account: &str, latency: Duration) -> Self {
        self.latencies.insert(account.to_string(), latency);
        self
    }

    pub fn soft_block(mut self, profile_id: &str) -> Self {
        self.soft_block.insert(profile_id.to_string());
        self
    }

    pub fn hard_block_account(mut self, account: &str) -> Self {
        self.hard_block_accounts.insert(account.to_string());
        self
    }

    pub fn hang_login(mut self) -> Self {
        self.hang_login = true;
        self
    }

    pub fn hang_fetch(mut self) -> Self {
        self.hang_fetch = true;
        self
    }

    pub fn stale_cookies(mut self) -> Self {
        self.stale_cookies = true;
        self
    }

    pub fn login_challenge(mut self) -> Self {
        self.login_challenge = true;
        self
    }

    pub fn max_in_flight(&self, account: &str) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    pub fn opened(&self) -> usize {
        *self.opened.lock().unwrap()
    }

    pub fn closed(&self) -> usize {
        *self.closed.lock().unwrap()
    }

    /// (账号, 主页 URL)，按抓取开始顺序
    pub fn fetches(&self) -> Vec<(String, String)> {
        self.fetches.lock().unwrap().clone()
    }

    fn landing(path: &str, title: &str) -> ProfilePage {
        ProfilePage {
            url: format!("{}{}", SITE, path),
            title: title.to_string(),
            ..Default::default()
        }
    }

    fn profile_page(profile_id: &str) -> ProfilePage {
        ProfilePage {
            url: format!("{}/in/{}", SITE, profile_id),
            title: format!("Person {} | Site", profile_id),
            body_excerpt: "Experience Education".to_string(),
            name: Some(format!("Person {}", profile_id)),
            headline: Some("Engineer".to_string()),
            experience: vec![RawListItem {
                primary: Some("Engineer".to_string()),
                secondary: Some(format!("Company {} · Full-time", profile_id)),
                caption: Some("Jan 2020 - Present · 4 yrs".to_string()),
            }],
            education: vec![RawListItem {
                primary: Some("State University".to_string()),
                secondary: Some("BSc".to_string()),
                caption: Some("2012 - 2016".to_string()),
            }],
            ..Default::default()
        }
    }
}

#[async_trait]
impl BrowserBackend for MockBackend {
    type Session = MockSession;

    async fn open(&self, account: &AccountIdentity) -> AppResult<MockSession> {
        *self.opened.lock().unwrap() += 1;
        Ok(MockSession {
            account: account.email.clone(),
        })
    }

    async fn apply_cookies(&self, _session: &mut MockSession, _cookies: &CookieSet) -> AppResult<()> {
        Ok(())
    }

    async fn check_session(&self, _session: &mut MockSession) -> AppResult<ProfilePage> {
        if self.hang_login {
            std::future::pending::<()>().await;
        }
        if self.stale_cookies {
            return Ok(Self::landing("/login", "Sign in"));
        }
        Ok(Self::landing("/feed/", "Feed"))
    }

    async fn submit_login(
        &self,
        _session: &mut MockSession,
        _email: &str,
        secret: &str,
    ) -> AppResult<ProfilePage> {
        if self.hang_login {
            std::future::pending::<()>().await;
        }
        if self.login_challenge {
            return Ok(Self::landing("/checkpoint/challenge/abc", "Security Verification"));
        }
        if secret == "correct-horse" {
            Ok(Self::landing("/feed/", "Feed"))
        } else {
            Ok(Self::landing("/login", "Sign in"))
        }
    }

    async fn export_cookies(&self, session: &mut MockSession) -> AppResult<CookieSet> {
        Ok(CookieSet::new(vec![serde_json::json!({
            "name": "session",
            "value": session.account,
        })]))
    }

    async fn current_page(&self, _session: &mut MockSession) -> AppResult<ProfilePage> {
        Ok(Self::landing("/feed/", "Feed"))
    }

    async fn load_profile(&self, session: &mut MockSession, url: &str) -> AppResult<ProfilePage> {
        let account = session.account.clone();
        self.fetches
            .lock()
            .unwrap()
            .push((account.clone(), url.to_string()));
        if self.hang_fetch {
            std::future::pending::<()>().await;
        }
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let current = in_flight.entry(account.clone()).or_insert(0);
            *current += 1;
            let mut max = self.max_in_flight.lock().unwrap();
            let seen = max.entry(account.clone()).or_insert(0);
            *seen = (*seen).max(*current);
        }

        let latency = self
            .latencies
            .get(&account)
            .copied()
            .unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(latency).await;

        *self.in_flight.lock().unwrap().get_mut(&account).unwrap() -= 1;

        let profile_id = url.rsplit('/').next().unwrap_or_default();
        if self.hard_block_accounts.contains(&account) {
            return Ok(Self::landing("/login?session_redirect=x", "Sign in"));
        }
        if self.soft_block.contains(profile_id) {
            return Ok(Self::landing("/checkpoint/challenge/abc", "Security Verification"));
        }
        if profile_id.starts_with("missing") {
            return Ok(Self::landing(&format!("/in/{}", profile_id), "Page not found"));
        }
        Ok(Self::profile_page(profile_id))
    }

    async fn export_pdf(&self, _session: &mut MockSession, _url: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(Some(b"%PDF-1.4 mock".to_vec()))
    }

    async fn close(&self, _session: MockSession) {
        *self.closed.lock().unwrap() += 1;
    }
}

/// 内存 cookie 存储
#[derive(Default)]
pub struct MemoryCookieStore {
    sets: Mutex<HashMap<String, CookieSet>>,
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn load(&self, key: &str) -> AppResult<Option<CookieSet>> {
        Ok(self.sets.lock().unwrap().get(key).cloned())
    }

    async fn save(&self, key: &str, cookies: &CookieSet) -> AppResult<()> {
        self.sets
            .lock()
            .unwrap()
            .insert(key.to_string(), cookies.clone());
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> AppResult<()> {
        self.sets.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> AppResult<Vec<String>> {
        let mut keys: Vec<String> = self.sets.lock().unwrap().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// 记录调用的仓库；`failing` 时每次写入都被拒绝
#[derive(Default)]
pub struct RecordingRepository {
    pub failing: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingRepository {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// 被 upsert 过的校友 ID（排序后）
    pub fn upserted(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .calls()
            .into_iter()
            .filter(|(op, _)| op == "upsert_alumni")
            .map(|(_, id)| id)
            .collect();
        ids.sort();
        ids
    }

    fn log(&self, op: &str, alumni_id: &str) -> AppResult<()> {
        if self.failing {
            return Err(StorageError::Rejected {
                collaborator: "repository".to_string(),
                message: format!("{} rejected for {}", op, alumni_id),
            }
            .into());
        }
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), alumni_id.to_string()));
        Ok(())
    }
}

#[async_trait]
impl AlumniRepository for RecordingRepository {
    async fn upsert_alumni(&self, alumni_id: &str, _record: &CanonicalProfileRecord) -> AppResult<()> {
        self.log("upsert_alumni", alumni_id)
    }

    async fn replace_job_history(&self, alumni_id: &str, _entries: &[JobEntry]) -> AppResult<()> {
        self.log("replace_job_history", alumni_id)
    }

    async fn replace_education_history(
        &self,
        alumni_id: &str,
        _entries: &[EducationEntry],
    ) -> AppResult<()> {
        self.log("replace_education_history", alumni_id)
    }
}

#[derive(Default)]
pub struct RecordingStorage {
    stored: Mutex<Vec<String>>,
}

impl RecordingStorage {
    pub fn stored(&self) -> Vec<String> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl PdfStorage for RecordingStorage {
    async fn store_pdf(&self, alumni_id: &str, _bytes: &[u8]) -> AppResult<String> {
        self.stored.lock().unwrap().push(alumni_id.to_string());
        Ok(format!("mem://{}.pdf", alumni_id))
    }
}

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub repository: Arc<RecordingRepository>,
    pub storage: Arc<RecordingStorage>,
    pub orchestrator: BatchOrchestrator<MockBackend>,
}

pub fn harness(config: &Config, backend: MockBackend, repository: RecordingRepository) -> Harness {
    let backend = Arc::new(backend);
    let repository = Arc::new(repository);
    let storage = Arc::new(RecordingStorage::default());
    let orchestrator = BatchOrchestrator::new(
        config,
        backend.clone(),
        Arc::new(MemoryCookieStore::default()),
        Arc::new(KeywordClassifier::from_config(config)),
        repository.clone(),
        storage.clone(),
    );
    Harness {
        backend,
        repository,
        storage,
        orchestrator,
    }
}

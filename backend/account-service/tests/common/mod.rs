//! In-memory collaborators and app wiring for the HTTP tests
#![allow(dead_code)]

use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    test, web, App,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use account_service::cache::{CacheError, SessionCache};
use account_service::config::{JwtConfig, PasswordConfig, RateLimitConfig};
use account_service::db::{AccountStore, RetryableTransaction, StoreError};
use account_service::middleware::RateGate;
use account_service::models::{Account, NewAccount, NewNotification};
use account_service::security::{PasswordHasher, TokenService};
use account_service::services::{
    AccountService, AccountServiceDeps, MailTemplates, Mailer, ObjectStore, OutgoingMail,
    TaskExecutor, Telemetry, TelemetryEvent, UploadError, UploadPolicy, UploadRendezvous,
};
use account_service::{startup, AppState};
use resilience::RetryConfig;

pub const DEFAULT_AVATAR: &str = "https://cdn.test/defaults/avatar.png";
pub const MAX_AVATAR_BYTES: usize = 1024;
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<i64, Account>,
    next_id: i64,
    next_post_id: i64,
    /// post id -> author
    posts: BTreeMap<i64, i64>,
    /// (user, post)
    likes: Vec<(i64, i64)>,
    comments: Vec<(i64, i64)>,
    saved_posts: Vec<(i64, i64)>,
    stories: Vec<i64>,
    highlights: Vec<i64>,
    /// (follower, following)
    follows: Vec<(i64, i64)>,
    notifications: Vec<NewNotification>,
}

/// Account store over in-memory tables that mirror the SQL schema
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    /// Backend failures to inject before calls start succeeding
    failures: AtomicU32,
    /// Make `create` hang, as a backend that stopped answering would
    stall_creates: AtomicBool,
}

impl MemoryStore {
    /// Storage calls made so far, health pings excluded
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, times: u32) {
        self.failures.store(times, Ordering::SeqCst);
    }

    pub fn stall_creates(&self) {
        self.stall_creates.store(true, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("connection reset by peer".into()));
        }
        Ok(self.tables.lock().unwrap())
    }

    pub fn account_count(&self) -> usize {
        self.tables.lock().unwrap().accounts.len()
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        self.tables.lock().unwrap().accounts.get(&id).cloned()
    }

    pub fn account_by_email(&self, email: &str) -> Option<Account> {
        self.tables
            .lock()
            .unwrap()
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned()
    }

    pub fn notifications(&self) -> Vec<NewNotification> {
        self.tables.lock().unwrap().notifications.clone()
    }

    pub fn add_post(&self, author: i64) -> i64 {
        let mut t = self.tables.lock().unwrap();
        t.next_post_id += 1;
        let id = t.next_post_id;
        t.posts.insert(id, author);
        if let Some(a) = t.accounts.get_mut(&author) {
            a.post_count += 1;
        }
        id
    }

    pub fn like(&self, user: i64, post: i64) {
        self.tables.lock().unwrap().likes.push((user, post));
    }

    pub fn comment(&self, user: i64, post: i64) {
        self.tables.lock().unwrap().comments.push((user, post));
    }

    pub fn save_post(&self, user: i64, post: i64) {
        self.tables.lock().unwrap().saved_posts.push((user, post));
    }

    pub fn add_story(&self, user: i64) {
        self.tables.lock().unwrap().stories.push(user);
    }

    pub fn add_highlight(&self, user: i64) {
        self.tables.lock().unwrap().highlights.push(user);
    }

    pub fn follow(&self, follower: i64, following: i64) {
        let mut t = self.tables.lock().unwrap();
        t.follows.push((follower, following));
        if let Some(a) = t.accounts.get_mut(&follower) {
            a.following_count += 1;
        }
        if let Some(a) = t.accounts.get_mut(&following) {
            a.follower_count += 1;
        }
    }

    /// Rows in owned tables that still reference `id`, directly or through
    /// one of its posts
    pub fn residual_rows(&self, id: i64) -> usize {
        let t = self.tables.lock().unwrap();
        let own_posts: HashSet<i64> = t
            .posts
            .iter()
            .filter(|(_, author)| **author == id)
            .map(|(post, _)| *post)
            .collect();
        let touches = |(user, post): &(i64, i64)| *user == id || own_posts.contains(post);

        own_posts.len()
            + t.likes.iter().filter(|r| touches(*r)).count()
            + t.comments.iter().filter(|r| touches(*r)).count()
            + t.saved_posts.iter().filter(|r| touches(*r)).count()
            + t.stories.iter().filter(|u| **u == id).count()
            + t.highlights.iter().filter(|u| **u == id).count()
            + t.follows
                .iter()
                .filter(|(a, b)| *a == id || *b == id)
                .count()
            + usize::from(t.accounts.contains_key(&id))
    }
}

fn unique_conflict(t: &Tables, except: Option<i64>, email: &str, username: &str, phone: &str)
    -> Option<&'static str>
{
    let others = t.accounts.values().filter(|a| Some(a.id) != except);
    for a in others {
        if a.email == email {
            return Some("email");
        }
        if a.username == username {
            return Some("username");
        }
        if a.phone == phone {
            return Some("phone");
        }
    }
    None
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let t = self.enter()?;
        t.accounts
            .values()
            .find(|a| a.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> Result<Account, StoreError> {
        let t = self.enter()?;
        t.accounts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn create(&self, new: &NewAccount) -> Result<Account, StoreError> {
        if self.stall_creates.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let mut t = self.enter()?;
        if let Some(field) = unique_conflict(&t, None, &new.email, &new.username, &new.phone) {
            return Err(StoreError::Conflict(field));
        }

        t.next_id += 1;
        let now = Utc::now();
        let account = Account {
            id: t.next_id,
            username: new.username.clone(),
            name: new.name.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            password_digest: new.password_digest.clone(),
            bio: new.bio.clone(),
            website: new.website.clone(),
            avatar: new.avatar.clone(),
            language: new.language.clone(),
            privacy: new.privacy,
            is_verified: false,
            email_verified: false,
            token: new.token.clone(),
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            created_at: now,
            updated_at: now,
        };
        t.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn verify_email(&self, token: &str, next_token: &str) -> Result<Account, StoreError> {
        let mut t = self.enter()?;
        let account = t
            .accounts
            .values_mut()
            .find(|a| a.token == token)
            .ok_or(StoreError::NotFound)?;
        account.email_verified = true;
        account.token = next_token.to_string();
        Ok(account.clone())
    }

    async fn rotate_token_by_email(
        &self,
        email: &str,
        next_token: &str,
    ) -> Result<Account, StoreError> {
        let mut t = self.enter()?;
        let account = t
            .accounts
            .values_mut()
            .find(|a| a.email == email)
            .ok_or(StoreError::NotFound)?;
        account.token = next_token.to_string();
        Ok(account.clone())
    }

    async fn consume_token(
        &self,
        token: &str,
        next_token: &str,
        password_digest: Option<&str>,
    ) -> Result<Account, StoreError> {
        let mut t = self.enter()?;
        let account = t
            .accounts
            .values_mut()
            .find(|a| a.token == token)
            .ok_or(StoreError::NotFound)?;
        account.token = next_token.to_string();
        if let Some(digest) = password_digest {
            account.password_digest = digest.to_string();
        }
        Ok(account.clone())
    }

    async fn update(&self, account: &Account) -> Result<Account, StoreError> {
        let mut t = self.enter()?;
        if !t.accounts.contains_key(&account.id) {
            return Err(StoreError::NotFound);
        }
        if let Some(field) = unique_conflict(
            &t,
            Some(account.id),
            &account.email,
            &account.username,
            &account.phone,
        ) {
            return Err(StoreError::Conflict(field));
        }

        let mut stored = account.clone();
        stored.updated_at = Utc::now();
        t.accounts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_with_cascade(
        &self,
        id: i64,
        notice: &NewNotification,
    ) -> Result<(), StoreError> {
        let mut t = self.enter()?;
        if !t.accounts.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        t.notifications.push(notice.clone());

        let edges = t.follows.clone();
        for (follower, following) in edges {
            if follower == id {
                if let Some(a) = t.accounts.get_mut(&following) {
                    a.follower_count -= 1;
                }
            } else if following == id {
                if let Some(a) = t.accounts.get_mut(&follower) {
                    a.following_count -= 1;
                }
            }
        }

        let own_posts: HashSet<i64> = t
            .posts
            .iter()
            .filter(|(_, author)| **author == id)
            .map(|(post, _)| *post)
            .collect();
        let keep = |(user, post): &(i64, i64)| *user != id && !own_posts.contains(post);
        t.likes.retain(keep);
        t.comments.retain(keep);
        t.saved_posts.retain(keep);
        t.stories.retain(|u| *u != id);
        t.highlights.retain(|u| *u != id);
        t.posts.retain(|_, author| *author != id);
        t.follows.retain(|(a, b)| *a != id && *b != id);
        t.accounts.remove(&id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session cache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
    indexes: Mutex<HashMap<String, HashSet<String>>>,
}

impl MemoryCache {
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _: Duration) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn add_to_index(&self, index: &str, member: &str, _: Duration) -> Result<(), CacheError> {
        self.indexes
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn purge_index(&self, index: &str) -> Result<usize, CacheError> {
        let members = self.indexes.lock().unwrap().remove(index).unwrap_or_default();
        let mut entries = self.entries.lock().unwrap();
        for member in &members {
            entries.remove(member);
        }
        Ok(members.len())
    }
}

// ---------------------------------------------------------------------------
// Object storage, telemetry, mail
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingObjectStore {
    pub puts: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
}

impl RecordingObjectStore {
    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn put(&self, key: &str, _: &str, _: Bytes) -> Result<String, UploadError> {
        self.puts.lock().unwrap().push(key.to_string());
        Ok(format!("https://cdn.test/{}", key))
    }

    async fn delete(&self, url: &str) -> Result<(), UploadError> {
        self.deletes.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTelemetry(Mutex<Vec<TelemetryEvent>>);

impl RecordingTelemetry {
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn events_for(&self, event: &str) -> Vec<TelemetryEvent> {
        self.events().into_iter().filter(|e| e.event == event).collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.0.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingMailer(Mutex<Vec<OutgoingMail>>);

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.0.lock().unwrap().clone()
    }

    /// Token from the newest link of the given kind (`verify` or
    /// `reset-password`) mailed to `to`
    pub fn token_from_link(&self, to: &str, kind: &str) -> Option<String> {
        let marker = format!("/{}/", kind);
        self.sent()
            .into_iter()
            .rev()
            .filter(|m| m.to == to)
            .find_map(|m| {
                let start = m.body.find(&marker)? + marker.len();
                let token: String = m.body[start..]
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect();
                Some(token)
            })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(mail);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub objects: Arc<RecordingObjectStore>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub mailer: Arc<RecordingMailer>,
    pub tokens: Arc<TokenService>,
    pub state: web::Data<AppState>,
    pub gate: RateGate,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(10_000, Duration::from_secs(30))
    }

    /// Context whose rate gate allows `burst` requests and effectively never
    /// refills during a test
    pub fn with_rate_limit(burst: u32) -> Self {
        Self::build(burst, Duration::from_secs(30))
    }

    pub fn with_register_deadline(deadline: Duration) -> Self {
        Self::build(10_000, deadline)
    }

    fn build(burst: u32, register_deadline: Duration) -> Self {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(MemoryCache::default());
        let objects = Arc::new(RecordingObjectStore::default());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let mailer = Arc::new(RecordingMailer::default());

        let tokens = Arc::new(TokenService::new(
            &JwtConfig {
                secret: "integration-test-secret".to_string(),
                token_ttl_secs: 86400,
                cache_ttl_secs: 86400,
            },
            cache.clone(),
        ));
        let passwords = PasswordHasher::new(&PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let uploads = UploadRendezvous::new(
            objects.clone(),
            UploadPolicy {
                max_bytes: MAX_AVATAR_BYTES,
                allowed_types: vec!["image/png".into(), "image/jpeg".into()],
            },
            Duration::from_secs(5),
            DEFAULT_AVATAR,
        );
        let (tasks, _reporter) = TaskExecutor::new();

        let accounts = AccountService::new(AccountServiceDeps {
            store: store.clone(),
            transactions: RetryableTransaction::new(
                RetryConfig::linear(3, Duration::from_millis(5)),
                telemetry.clone(),
            ),
            tokens: tokens.clone(),
            passwords,
            uploads,
            mailer: mailer.clone(),
            templates: MailTemplates::new("https://app.test"),
            tasks,
            register_deadline,
        });

        let state = web::Data::new(AppState {
            accounts: Arc::new(accounts),
            tokens: tokens.clone(),
            store: store.clone(),
            max_avatar_bytes: MAX_AVATAR_BYTES * 4,
        });
        let gate = RateGate::new(&RateLimitConfig {
            refill_interval_ms: 3_600_000,
            burst,
        })
        .unwrap();

        Self {
            store,
            cache,
            objects,
            telemetry,
            mailer,
            tokens,
            state,
            gate,
        }
    }

    pub async fn app(
        &self,
    ) -> impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    > {
        let state = self.state.clone();
        let gate = self.gate.clone();
        test::init_service(App::new().configure(move |cfg| startup::routes(cfg, state, gate)))
            .await
    }
}

/// Poll until `check` holds, for detached background work
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

pub const BOUNDARY: &str = "----account-service-test-boundary";

pub struct FilePart<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

/// multipart/form-data body and its content type header value
pub fn multipart(fields: &[(&str, &str)], avatar: Option<FilePart<'_>>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some(file) = avatar {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"avatar\"; filename=\"{}\"\r\n",
                file.file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

pub fn registration_fields<'a>(email: &'a str, username: &'a str, phone: &'a str)
    -> Vec<(&'a str, &'a str)>
{
    vec![
        ("username", username),
        ("name", "Test User"),
        ("email", email),
        ("password", "password123"),
        ("bio", "hello"),
        ("phone", phone),
        ("language", "en"),
        ("privacy", "false"),
    ]
}

pub fn register_request(fields: &[(&str, &str)], avatar: Option<FilePart<'_>>) -> test::TestRequest {
    let (content_type, body) = multipart(fields, avatar);
    test::TestRequest::post()
        .uri("/api/v1/auth/register")
        .insert_header(("content-type", content_type))
        .set_payload(body)
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

pub fn edit_request(id: i64, token: &str, fields: &[(&str, &str)], avatar: Option<FilePart<'_>>)
    -> test::TestRequest
{
    let (content_type, body) = multipart(fields, avatar);
    test::TestRequest::put()
        .uri(&format!("/api/v1/user/{}", id))
        .insert_header(bearer(token))
        .insert_header(("content-type", content_type))
        .set_payload(body)
}

pub fn delete_request(id: i64, token: &str) -> test::TestRequest {
    test::TestRequest::delete()
        .uri(&format!("/api/v1/user/{}", id))
        .insert_header(bearer(token))
}

/// Register and verify an account over HTTP; returns its id and the session
/// token handed out by verification
pub async fn signup<S, B>(
    ctx: &TestContext,
    app: &S,
    email: &str,
    username: &str,
    phone: &str,
) -> (i64, String)
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let fields = registration_fields(email, username, phone);
    let resp = test::call_service(app, register_request(&fields, None).to_request()).await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::CREATED);

    let account = ctx.store.account_by_email(email).unwrap();
    let resp = test::call_service(
        app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/auth/verify/{}", account.token))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), actix_web::http::StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();
    (account.id, token)
}

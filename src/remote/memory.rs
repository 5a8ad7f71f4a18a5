//! In-process reference backend.
//!
//! Keeps collections as row lists and behaves like a hosted table store:
//! data calls require a session, upserts match on conflict columns, and
//! `id` is unique. Tests can take it offline, inject failures, add latency
//! and count calls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::error::{AuthError, RemoteError, RemoteResult};
use crate::remote::api::RemoteApi;
use crate::remote::types::{AuthChange, AuthEvent, AuthSession, Row, Selector};

const SESSION_LIFETIME_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    password: String,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct RemoteState {
    tables: BTreeMap<String, Vec<Row>>,
    accounts: BTreeMap<String, Account>,
    session: Option<AuthSession>,
}

pub struct InMemoryRemote {
    state: Mutex<RemoteState>,
    online: AtomicBool,
    latency_ms: AtomicU64,
    failures: Mutex<VecDeque<RemoteError>>,
    calls: Mutex<HashMap<&'static str, u64>>,
    auth_tx: broadcast::Sender<AuthChange>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (auth_tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(RemoteState::default()),
            online: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(HashMap::new()),
            auth_tx,
            clock,
        }
    }

    // ================================
    // Test controls
    // ================================

    pub fn set_online(&self, online: bool) {
        log::debug!("[REMOTE] memory backend online = {}", online);
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// The next data call fails with `err`. Failures are consumed in order.
    pub fn inject_failure(&self, err: RemoteError) {
        self.failures.lock().push_back(err);
    }

    pub fn calls(&self, op: &str) -> u64 {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn rows(&self, collection: &str) -> Vec<Row> {
        self.state.lock().tables.get(collection).cloned().unwrap_or_default()
    }

    pub fn seed(&self, collection: &str, row: Row) {
        self.state
            .lock()
            .tables
            .entry(collection.to_string())
            .or_default()
            .push(row);
    }

    /// Creates an account without signing in. Returns its user id.
    pub fn register(&self, email: &str, password: &str) -> String {
        let user_id = uuid::Uuid::new_v4().to_string();
        self.state.lock().accounts.insert(
            email.to_string(),
            Account {
                user_id: user_id.clone(),
                password: password.to_string(),
                metadata: BTreeMap::new(),
            },
        );
        user_id
    }

    /// Drops the session as if the token could not be refreshed.
    pub fn expire_session(&self) {
        let dropped = self.state.lock().session.take();
        if dropped.is_some() {
            self.notify(AuthEvent::SignedOut, None);
        }
    }

    // ================================
    // Internals
    // ================================

    fn notify(&self, event: AuthEvent, session: Option<AuthSession>) {
        // no receivers is fine
        let _ = self.auth_tx.send(AuthChange { event, session });
    }

    async fn enter(&self, op: &'static str) -> RemoteResult<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::NetworkUnavailable("memory backend offline".into()));
        }
        if let Some(err) = self.failures.lock().pop_front() {
            log::debug!("[REMOTE] injected failure on {}: {}", op, err);
            return Err(err);
        }
        if self.state.lock().session.is_none() {
            return Err(RemoteError::NotAuthenticated);
        }
        Ok(())
    }

    fn open_session(&self, state: &mut RemoteState, email: &str, account: &Account) -> AuthSession {
        let session = AuthSession {
            user_id: account.user_id.clone(),
            email: email.to_string(),
            access_token: uuid::Uuid::new_v4().to_string(),
            expires_at: self.clock.now() + SESSION_LIFETIME_MS,
            metadata: account.metadata.clone(),
        };
        state.session = Some(session.clone());
        session
    }

    fn conflict_selector(row: &Row, conflict: &[&str]) -> RemoteResult<Selector> {
        conflict.iter().try_fold(Selector::new(), |sel, col| match row.get(*col) {
            Some(v) if !v.is_null() => Ok(sel.eq(col, v.clone())),
            _ => Err(RemoteError::SchemaMismatch(format!("upsert row missing conflict column `{col}`"))),
        })
    }

    fn upsert_into(table: &mut Vec<Row>, row: Row, conflict: &[&str]) -> RemoteResult<Row> {
        let selector = Self::conflict_selector(&row, conflict)?;
        match table.iter_mut().find(|r| selector.matches(r)) {
            Some(existing) => {
                existing.extend(row);
                Ok(existing.clone())
            }
            None => {
                table.push(row.clone());
                Ok(row)
            }
        }
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<AuthSession, AuthError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable("memory backend offline".into()));
        }
        let session = {
            let mut state = self.state.lock();
            if state.accounts.contains_key(email) {
                return Err(AuthError::UserExists(email.to_string()));
            }
            let account = Account {
                user_id: uuid::Uuid::new_v4().to_string(),
                password: password.to_string(),
                metadata,
            };
            state.accounts.insert(email.to_string(), account.clone());
            self.open_session(&mut state, email, &account)
        };
        log::info!("[REMOTE] signed up {} as {}", email, session.user_id);
        self.notify(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable("memory backend offline".into()));
        }
        let session = {
            let mut state = self.state.lock();
            let account = match state.accounts.get(email) {
                Some(a) if a.password == password => a.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            };
            self.open_session(&mut state, email, &account)
        };
        log::info!("[REMOTE] signed in {}", email);
        self.notify(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let dropped = self.state.lock().session.take();
        if dropped.is_some() {
            self.notify(AuthEvent::SignedOut, None);
        }
        Ok(())
    }

    async fn current_session(&self) -> Option<AuthSession> {
        self.state.lock().session.clone()
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthChange> {
        self.auth_tx.subscribe()
    }

    async fn fetch_one(&self, collection: &str, selector: &Selector) -> RemoteResult<Option<Row>> {
        self.enter("fetch_one").await?;
        let state = self.state.lock();
        Ok(state
            .tables
            .get(collection)
            .and_then(|t| t.iter().find(|r| selector.matches(r)).cloned()))
    }

    async fn fetch_many(&self, collection: &str, selector: &Selector) -> RemoteResult<Vec<Row>> {
        self.enter("fetch_many").await?;
        let state = self.state.lock();
        Ok(state
            .tables
            .get(collection)
            .map(|t| t.iter().filter(|r| selector.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert(&self, collection: &str, row: Row, conflict: &[&str]) -> RemoteResult<Row> {
        self.enter("upsert").await?;
        let mut state = self.state.lock();
        let table = state.tables.entry(collection.to_string()).or_default();
        Self::upsert_into(table, row, conflict)
    }

    async fn upsert_many(&self, collection: &str, rows: Vec<Row>, conflict: &[&str]) -> RemoteResult<Vec<Row>> {
        self.enter("upsert_many").await?;
        for row in &rows {
            Self::conflict_selector(row, conflict)?;
        }
        let mut state = self.state.lock();
        let table = state.tables.entry(collection.to_string()).or_default();
        rows.into_iter()
            .map(|row| Self::upsert_into(table, row, conflict))
            .collect()
    }

    async fn insert_many(&self, collection: &str, rows: Vec<Row>) -> RemoteResult<Vec<Row>> {
        self.enter("insert_many").await?;
        let mut state = self.state.lock();
        let table = state.tables.entry(collection.to_string()).or_default();

        let mut seen: Vec<&Value> = table.iter().filter_map(|r| r.get("id")).collect();
        for row in &rows {
            if let Some(id) = row.get("id") {
                if seen.contains(&id) {
                    return Err(RemoteError::Conflict(format!("{collection}: duplicate id {id}")));
                }
                seen.push(id);
            }
        }
        table.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn update(&self, collection: &str, selector: &Selector, patch: Row) -> RemoteResult<Row> {
        self.enter("update").await?;
        let mut state = self.state.lock();
        let row = state
            .tables
            .get_mut(collection)
            .and_then(|t| t.iter_mut().find(|r| selector.matches(r)))
            .ok_or_else(|| RemoteError::NotFound(format!("{collection}: no row matches")))?;
        row.extend(patch);
        Ok(row.clone())
    }

    async fn delete(&self, collection: &str, selector: &Selector) -> RemoteResult<()> {
        self.enter("delete").await?;
        let mut state = self.state.lock();
        let table = state
            .tables
            .get_mut(collection)
            .ok_or_else(|| RemoteError::NotFound(collection.to_string()))?;
        let before = table.len();
        table.retain(|r| !selector.matches(r));
        if table.len() == before {
            return Err(RemoteError::NotFound(format!("{collection}: no row matches")));
        }
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::clock::{Clock, MS_PER_DAY};
use crate::config::CoreConfig;
use crate::domain::{PersistedSession, UserIdentity, UserProfile};
use crate::error::{AuthError, RemoteResult, StorageResult};
use crate::persistence::LocalRepository;
use crate::remote::{rows, tables, with_deadline, AuthChange, AuthEvent, AuthSession, RemoteApi, Selector};
use crate::session::events::{CoreEvent, EventBus};
use crate::sync::SyncEngine;

const DISPLAY_NAME_KEY: &str = "display_name";

struct SessionInner {
    repo: LocalRepository,
    remote: Arc<dyn RemoteApi>,
    sync: SyncEngine,
    bus: EventBus,
    config: CoreConfig,

    identity: Mutex<Option<UserIdentity>>,
    online: AtomicBool,
    /// Serializes identity transitions (explicit calls and auth broadcasts).
    transition: tokio::sync::Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the active identity.
///
/// Exactly one identity is active. Sign-in folds guest data into the account
/// (once) and syncs; sign-out and lost remote sessions fall back to a guest.
/// Authenticated data is kept locally after sign-out.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        repo: LocalRepository,
        remote: Arc<dyn RemoteApi>,
        sync: SyncEngine,
        bus: EventBus,
        config: CoreConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                repo,
                remote,
                sync,
                bus,
                config,
                identity: Mutex::new(None),
                online: AtomicBool::new(true),
                transition: tokio::sync::Mutex::new(()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// The active identity, `None` before `start`.
    pub fn current(&self) -> Option<UserIdentity> {
        self.inner.identity.lock().clone()
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    fn now(&self) -> u64 {
        self.inner.repo.clock().now()
    }

    // ================================
    // Startup
    // ================================

    /// Restores the persisted identity, or mints a guest. Expired guests get
    /// a new id (their data stays on disk); an authenticated identity without
    /// a live remote session falls back to a guest. Emits `userReady`.
    pub async fn start(&self) -> UserIdentity {
        let _transition = self.inner.transition.lock().await;
        let repo = &self.inner.repo;
        let now = self.now();

        let identity = match repo.load_session() {
            None => {
                log::info!("[SESSION] no persisted session, starting as guest");
                UserIdentity::guest(repo.get_or_create_guest_id(), now)
            }
            Some(PersistedSession { identity, timestamp }) if identity.is_guest() => {
                let idle = now.saturating_sub(timestamp);
                if idle > self.inner.config.guest_ttl_ms() {
                    log::info!(
                        "[SESSION] guest {} idle for {} days, minting a new guest",
                        identity.identity_key(),
                        idle / MS_PER_DAY
                    );
                    UserIdentity::guest(repo.rotate_guest_id(), now)
                } else {
                    identity
                }
            }
            Some(PersistedSession { identity, .. }) => {
                let live = self.inner.remote.current_session().await;
                match live {
                    Some(session) if Some(session.user_id.as_str()) == identity.user_id() => identity,
                    _ => {
                        log::info!(
                            "[SESSION] no remote session for {}, reverting to guest",
                            identity.identity_key()
                        );
                        UserIdentity::guest(repo.get_or_create_guest_id(), now)
                    }
                }
            }
        };

        self.activate(&identity);
        self.spawn_listener();
        self.inner.bus.emit(CoreEvent::UserReady {
            identity: identity.clone(),
            mode: identity.mode(),
        });

        if !identity.is_guest() {
            self.inner.sync.start_auto_sync(self.inner.config.auto_sync_interval());
            let sync = self.inner.sync.clone();
            let restored = identity.clone();
            tokio::spawn(async move {
                if let Err(e) = sync.sync_all(&restored).await {
                    log::warn!("[SESSION] startup sync failed: {}", e);
                }
            });
        }
        identity
    }

    /// Stops background work started by `start`.
    pub fn stop(&self) {
        if let Some(handle) = self.inner.listener.lock().take() {
            handle.abort();
        }
        self.inner.sync.stop_auto_sync();
    }

    fn activate(&self, identity: &UserIdentity) {
        *self.inner.identity.lock() = Some(identity.clone());
        self.inner.sync.switch_identity(identity);
        if let Err(e) = self.persist(identity) {
            log::warn!("[SESSION] could not persist session: {}", e);
        }
    }

    fn persist(&self, identity: &UserIdentity) -> StorageResult<()> {
        self.inner.repo.save_session(&PersistedSession {
            identity: identity.clone(),
            timestamp: self.now(),
        })
    }

    /// Records activity so the guest expiry window restarts.
    pub fn touch(&self) {
        if let Some(identity) = self.current() {
            if let Err(e) = self.persist(&identity) {
                log::warn!("[SESSION] could not refresh session timestamp: {}", e);
            }
        }
    }

    // ================================
    // Auth
    // ================================

    /// Creates a remote account and makes it the active identity. The guest
    /// that was playing is imported into it first.
    ///
    /// # Arguments
    /// * `email` - Account login.
    /// * `password` - Checked by the backend only, never stored.
    /// * `display_name` - Saved in the account metadata.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<UserIdentity, AuthError> {
        let mut metadata = BTreeMap::new();
        metadata.insert(DISPLAY_NAME_KEY.to_string(), display_name.to_string());
        let session = self.inner.remote.sign_up(email, password, metadata).await?;
        Ok(self.handle_signed_in(session).await)
    }

    /// Signs in to an existing account and makes it the active identity,
    /// importing the current guest once and syncing.
    ///
    /// # Arguments
    /// * `email` - Account login.
    /// * `password` - Checked by the backend only, never stored.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let session = self.inner.remote.sign_in(email, password).await?;
        Ok(self.handle_signed_in(session).await)
    }

    /// Signs out remotely and switches to the guest identity. Local data of
    /// the account is kept for the next sign-in.
    pub async fn sign_out(&self) -> Result<UserIdentity, AuthError> {
        self.inner.remote.sign_out().await?;
        Ok(self.revert_to_guest().await)
    }

    /// Wipes the active identity's local data and the persisted session,
    /// then continues as a brand new guest.
    pub async fn clear_session(&self) -> StorageResult<UserIdentity> {
        let _transition = self.inner.transition.lock().await;
        let previous = self.current();
        if let Some(identity) = &previous {
            self.inner.repo.clear_namespace(identity)?;
            if !identity.is_guest() {
                if let Err(e) = self.inner.remote.sign_out().await {
                    log::warn!("[SESSION] remote sign-out during clear failed: {}", e);
                }
            }
        }
        self.inner.repo.delete_session()?;

        let guest = UserIdentity::guest(self.inner.repo.rotate_guest_id(), self.now());
        self.activate(&guest);
        if let Some(previous) = previous.filter(|p| !p.is_guest()) {
            self.inner.bus.emit(CoreEvent::UserSignedOut {
                previous_identity: previous,
            });
        }
        self.inner.bus.emit(CoreEvent::UserSwitched {
            identity: guest.clone(),
        });
        log::info!("[SESSION] session cleared, now {}", guest.identity_key());
        Ok(guest)
    }

    async fn handle_signed_in(&self, session: AuthSession) -> UserIdentity {
        let _transition = self.inner.transition.lock().await;
        let previous = self.current();
        if let Some(current) = previous.as_ref().filter(|c| c.user_id() == Some(session.user_id.as_str())) {
            log::debug!("[SESSION] {} already active", current.identity_key());
            return current.clone();
        }

        let profile = self.fetch_or_create_profile(&session).await;
        let identity = profile.to_identity();
        log::info!("[SESSION] signed in as {}", identity.identity_key());
        self.activate(&identity);

        if let Some(guest) = previous.as_ref().filter(|p| p.is_guest()) {
            if let Err(e) = self.inner.sync.import_guest_to_user(guest, &identity) {
                log::warn!("[SESSION] guest import failed: {}", e);
            }
        }

        self.inner.bus.emit(CoreEvent::UserAuthenticated {
            identity: identity.clone(),
            profile,
        });
        self.inner.bus.emit(CoreEvent::UserSwitched {
            identity: identity.clone(),
        });

        self.inner.sync.start_auto_sync(self.inner.config.auto_sync_interval());
        if let Err(e) = self.inner.sync.sync_all(&identity).await {
            log::warn!("[SESSION] first sync after sign-in failed: {}", e);
        }
        identity
    }

    /// Switches to the guest identity unless one is already active.
    async fn revert_to_guest(&self) -> UserIdentity {
        let _transition = self.inner.transition.lock().await;
        let previous = self.current();
        if let Some(current) = previous.as_ref().filter(|c| c.is_guest()) {
            return current.clone();
        }

        let guest = UserIdentity::guest(self.inner.repo.get_or_create_guest_id(), self.now());
        log::info!("[SESSION] signed out, continuing as {}", guest.identity_key());
        self.activate(&guest);
        if let Some(previous) = previous {
            self.inner.bus.emit(CoreEvent::UserSignedOut {
                previous_identity: previous,
            });
        }
        self.inner.bus.emit(CoreEvent::UserSwitched {
            identity: guest.clone(),
        });
        guest
    }

    async fn fetch_or_create_profile(&self, session: &AuthSession) -> UserProfile {
        match self.load_or_create_profile(session).await {
            Ok(profile) => profile,
            Err(e) => {
                log::warn!("[SESSION] profile unavailable ({}), using session data", e);
                profile_from_session(session, self.now())
            }
        }
    }

    async fn load_or_create_profile(&self, session: &AuthSession) -> RemoteResult<UserProfile> {
        let remote = &self.inner.remote;
        let deadline = self.inner.config.remote_deadline();
        let selector = Selector::new().eq("user_id", session.user_id.as_str());

        let existing = with_deadline(deadline, "fetch_one", remote.fetch_one(tables::USER_PROFILES, &selector)).await?;
        if let Some(row) = existing {
            return rows::profile_from_row(&row);
        }

        let profile = profile_from_session(session, self.now());
        log::info!("[SESSION] creating profile for {}", profile.user_id);
        let stored = with_deadline(
            deadline,
            "upsert",
            remote.upsert(tables::USER_PROFILES, rows::profile_to_row(&profile), &["user_id"]),
        )
        .await?;
        rows::profile_from_row(&stored)
    }

    // ================================
    // Connectivity
    // ================================

    /// Connectivity change from the host. Coming back online replays the queue.
    pub async fn set_online(&self, online: bool) {
        let was = self.inner.online.swap(online, Ordering::SeqCst);
        if was != online {
            log::info!("[SESSION] network {}", if online { "online" } else { "offline" });
            self.inner.bus.emit(CoreEvent::NetworkStatusChanged { online });
        }
        self.inner.sync.set_online(online).await;
    }

    // ================================
    // Background listener
    // ================================

    fn spawn_listener(&self) {
        let mut auth = self.inner.remote.on_auth_change();
        let mut lost = self.inner.sync.auth_lost();
        let this = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = auth.recv() => match change {
                        Ok(change) => this.on_auth_change(change).await,
                        Err(RecvError::Lagged(n)) => log::warn!("[SESSION] missed {} auth events", n),
                        Err(RecvError::Closed) => break,
                    },
                    identity = lost.recv() => match identity {
                        Ok(identity) => this.on_auth_lost(identity).await,
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            log::debug!("[SESSION] auth listener finished");
        });

        if let Some(old) = self.inner.listener.lock().replace(handle) {
            old.abort();
        }
    }

    async fn on_auth_change(&self, change: AuthChange) {
        log::debug!("[SESSION] auth change {:?}", change.event);
        match (change.event, change.session) {
            (AuthEvent::SignedIn, Some(session)) => {
                self.handle_signed_in(session).await;
            }
            (AuthEvent::SignedOut, _) => {
                self.revert_to_guest().await;
            }
            (AuthEvent::TokenRefreshed, _) => self.touch(),
            (AuthEvent::SignedIn, None) => log::warn!("[SESSION] sign-in event without a session"),
        }
    }

    /// The sync engine saw `NotAuthenticated`. Falls back to guest if the
    /// adapter confirms there is no session.
    async fn on_auth_lost(&self, identity: UserIdentity) {
        if self.current().as_ref() != Some(&identity) {
            return;
        }
        if self.inner.remote.current_session().await.is_none() {
            self.revert_to_guest().await;
        } else {
            log::warn!("[SESSION] remote refused {} but session is live", identity.identity_key());
        }
    }
}

fn profile_from_session(session: &AuthSession, now: u64) -> UserProfile {
    UserProfile {
        user_id: session.user_id.clone(),
        email: session.email.clone(),
        display_name: session.metadata.get(DISPLAY_NAME_KEY).cloned().unwrap_or_default(),
        avatar: None,
        age_group: None,
        created_at: now,
        updated_at: now,
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{AuthError, RemoteError, RemoteResult};
use crate::remote::api::RemoteApi;
use crate::remote::types::{AuthChange, AuthSession, Row, Selector};

/// Adapter for builds without a backend. Nobody is ever signed in, so the
/// sync engine stays disabled and the rest of the core runs locally.
pub struct NoBackend {
    auth_tx: broadcast::Sender<AuthChange>,
}

impl Default for NoBackend {
    fn default() -> Self {
        let (auth_tx, _) = broadcast::channel(1);
        Self { auth_tx }
    }
}

impl NoBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn no_backend() -> AuthError {
    AuthError::Unavailable("no backend configured".into())
}

#[async_trait]
impl RemoteApi for NoBackend {
    async fn sign_up(&self, _: &str, _: &str, _: BTreeMap<String, String>) -> Result<AuthSession, AuthError> {
        Err(no_backend())
    }

    async fn sign_in(&self, _: &str, _: &str) -> Result<AuthSession, AuthError> {
        Err(no_backend())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn current_session(&self) -> Option<AuthSession> {
        None
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthChange> {
        self.auth_tx.subscribe()
    }

    async fn fetch_one(&self, _: &str, _: &Selector) -> RemoteResult<Option<Row>> {
        Err(RemoteError::NotAuthenticated)
    }

    async fn fetch_many(&self, _: &str, _: &Selector) -> RemoteResult<Vec<Row>> {
        Err(RemoteError::NotAuthenticated)
    }

    async fn upsert(&self, _: &str, _: Row, _: &[&str]) -> RemoteResult<Row> {
        Err(RemoteError::NotAuthenticated)
    }

    async fn upsert_many(&self, _: &str, _: Vec<Row>, _: &[&str]) -> RemoteResult<Vec<Row>> {
        Err(RemoteError::NotAuthenticated)
    }

    async fn insert_many(&self, _: &str, _: Vec<Row>) -> RemoteResult<Vec<Row>> {
        Err(RemoteError::NotAuthenticated)
    }

    async fn update(&self, _: &str, _: &Selector, _: Row) -> RemoteResult<Row> {
        Err(RemoteError::NotAuthenticated)
    }

    async fn delete(&self, _: &str, _: &Selector) -> RemoteResult<()> {
        Err(RemoteError::NotAuthenticated)
    }
}

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{AuthError, RemoteError, RemoteResult};
use crate::remote::types::{AuthChange, AuthSession, Row, Selector};

/// Minimal backend interface used by the sync engine and session manager.
///
/// Every call is keyed by logical collection name (`remote::types::tables`).
/// Implementations map those to whatever the backend stores.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<AuthSession, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    /// The live session, or `None` if signed out or expired.
    async fn current_session(&self) -> Option<AuthSession>;

    /// New receiver on the auth-change channel.
    fn on_auth_change(&self) -> broadcast::Receiver<AuthChange>;

    async fn fetch_one(&self, collection: &str, selector: &Selector) -> RemoteResult<Option<Row>>;

    async fn fetch_many(&self, collection: &str, selector: &Selector) -> RemoteResult<Vec<Row>>;

    /// Inserts, or replaces the row matching `conflict` columns. Returns the stored row.
    async fn upsert(&self, collection: &str, row: Row, conflict: &[&str]) -> RemoteResult<Row>;

    async fn upsert_many(&self, collection: &str, rows: Vec<Row>, conflict: &[&str]) -> RemoteResult<Vec<Row>>;

    async fn insert_many(&self, collection: &str, rows: Vec<Row>) -> RemoteResult<Vec<Row>>;

    /// Patches the single row matching `selector`.
    async fn update(&self, collection: &str, selector: &Selector, patch: Row) -> RemoteResult<Row>;

    async fn delete(&self, collection: &str, selector: &Selector) -> RemoteResult<()>;
}

/// Runs a remote call under `deadline`. Expiry reads as `NetworkUnavailable`.
pub async fn with_deadline<T, F>(deadline: Duration, op: &str, fut: F) -> RemoteResult<T>
where
    F: Future<Output = RemoteResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("[REMOTE] {} exceeded deadline of {:?}", op, deadline);
            Err(RemoteError::NetworkUnavailable(format!("{op} timed out after {deadline:?}")))
        }
    }
}

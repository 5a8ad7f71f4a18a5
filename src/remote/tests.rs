use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;

use crate::error::{AuthError, RemoteError};
use crate::remote::{tables, with_deadline, AuthEvent, InMemoryRemote, NoBackend, RemoteApi, Row, Selector};

// =========================================================================
// Helpers
// =========================================================================

fn row(v: serde_json::Value) -> Row {
    v.as_object().cloned().unwrap()
}

async fn signed_in() -> (InMemoryRemote, String) {
    let remote = InMemoryRemote::new();
    remote.register("kid@example.com", "pw");
    let session = remote.sign_in("kid@example.com", "pw").await.unwrap();
    (remote, session.user_id)
}

// =========================================================================
// Auth
// =========================================================================

#[tokio::test]
async fn data_calls_require_a_session() {
    let remote = InMemoryRemote::new();
    let err = remote
        .fetch_one(tables::USER_PROGRESS, &Selector::new())
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::NotAuthenticated);
}

#[tokio::test]
async fn sign_in_broadcasts_and_rejects_bad_password() {
    let remote = InMemoryRemote::new();
    let mut rx = remote.on_auth_change();
    remote.register("kid@example.com", "pw");

    assert_eq!(
        remote.sign_in("kid@example.com", "nope").await.unwrap_err(),
        AuthError::InvalidCredentials
    );

    let session = remote.sign_in("kid@example.com", "pw").await.unwrap();
    let change = rx.recv().await.unwrap();
    assert_eq!(change.event, AuthEvent::SignedIn);
    assert_eq!(change.session.unwrap().user_id, session.user_id);

    remote.expire_session();
    assert_eq!(rx.recv().await.unwrap().event, AuthEvent::SignedOut);
    assert!(remote.current_session().await.is_none());
}

#[tokio::test]
async fn sign_up_twice_is_user_exists() {
    let remote = InMemoryRemote::new();
    remote
        .sign_up("a@example.com", "pw", BTreeMap::new())
        .await
        .unwrap();
    assert!(matches!(
        remote.sign_up("a@example.com", "pw", BTreeMap::new()).await,
        Err(AuthError::UserExists(_))
    ));
}

// =========================================================================
// Tables
// =========================================================================

#[tokio::test]
async fn upsert_replaces_on_conflict_columns() {
    let (remote, uid) = signed_in().await;
    let conflict = ["user_id", "achievement_id"];

    remote
        .upsert(tables::ACHIEVEMENTS, row(json!({"user_id": uid, "achievement_id": "a", "progress": 10})), &conflict)
        .await
        .unwrap();
    remote
        .upsert(tables::ACHIEVEMENTS, row(json!({"user_id": uid, "achievement_id": "a", "progress": 60})), &conflict)
        .await
        .unwrap();
    remote
        .upsert(tables::ACHIEVEMENTS, row(json!({"user_id": uid, "achievement_id": "b", "progress": 5})), &conflict)
        .await
        .unwrap();

    let rows = remote.rows(tables::ACHIEVEMENTS);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["progress"], 60);
}

#[tokio::test]
async fn upsert_without_conflict_column_is_schema_mismatch() {
    let (remote, _) = signed_in().await;
    let err = remote
        .upsert(tables::USER_PROGRESS, row(json!({"level": 1})), &["user_id"])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::SchemaMismatch(_)));
}

#[tokio::test]
async fn insert_many_rejects_duplicate_ids_atomically() {
    let (remote, _) = signed_in().await;
    remote
        .insert_many(tables::GAME_SESSIONS, vec![row(json!({"id": "s1"}))])
        .await
        .unwrap();
    let err = remote
        .insert_many(tables::GAME_SESSIONS, vec![row(json!({"id": "s2"})), row(json!({"id": "s1"}))])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Conflict(_)));
    assert_eq!(remote.rows(tables::GAME_SESSIONS).len(), 1);
}

#[tokio::test]
async fn update_and_delete_report_not_found() {
    let (remote, _) = signed_in().await;
    let sel = Selector::new().eq("id", "missing");
    assert!(matches!(
        remote.update(tables::GAME_SESSIONS, &sel, Row::new()).await,
        Err(RemoteError::NotFound(_))
    ));
    assert!(matches!(
        remote.delete(tables::GAME_SESSIONS, &sel).await,
        Err(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn offline_and_injected_failures() {
    let (remote, _) = signed_in().await;
    remote.set_online(false);
    assert!(matches!(
        remote.fetch_many(tables::ACHIEVEMENTS, &Selector::new()).await,
        Err(RemoteError::NetworkUnavailable(_))
    ));

    remote.set_online(true);
    remote.inject_failure(RemoteError::ServerError("boom".into()));
    assert!(remote.fetch_many(tables::ACHIEVEMENTS, &Selector::new()).await.is_err());
    assert!(remote.fetch_many(tables::ACHIEVEMENTS, &Selector::new()).await.is_ok());
    assert_eq!(remote.calls("fetch_many"), 3);
}

#[tokio::test(start_paused = true)]
async fn deadline_maps_to_network_unavailable() {
    let (remote, _) = signed_in().await;
    remote.set_latency(Duration::from_secs(20));

    let err = with_deadline(
        Duration::from_secs(15),
        "fetch_one",
        remote.fetch_one(tables::USER_PROGRESS, &Selector::new()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RemoteError::NetworkUnavailable(_)));
}

#[tokio::test]
async fn no_backend_is_never_authenticated() {
    let remote = NoBackend::new();
    assert!(remote.current_session().await.is_none());
    assert!(remote.sign_in("a", "b").await.is_err());
    assert_eq!(
        remote.insert_many(tables::GAME_SESSIONS, vec![]).await.unwrap_err(),
        RemoteError::NotAuthenticated
    );
}

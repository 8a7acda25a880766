use super::*;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> XrpcClient {
    XrpcClient::new(Duration::from_secs(5)).unwrap()
}

fn memory_manager(session: Session) -> (CredentialManager, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::with_session(session));
    (CredentialManager::new(client(), store.clone()), store)
}

async fn mount_create_session(server: &MockServer, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

// ============================================================================
// Stores
// ============================================================================

#[test]
fn test_memory_store_round_trip() {
    let store = MemorySessionStore::new();
    assert_eq!(store.load().unwrap(), Session::default());

    let session = Session::new("tok1", "ref1", "did:plc:abc");
    store.save(&session).unwrap();
    assert_eq!(store.load().unwrap(), session);

    store.clear().unwrap();
    assert_eq!(store.load().unwrap(), Session::default());
    assert_eq!(store.backend_name(), "memory");
}

#[test]
fn test_file_store_missing_file_loads_empty() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileSessionStore::new(temp_dir.path().join("session.toml"));

    assert_eq!(store.load().unwrap(), Session::default());
}

#[test]
fn test_file_store_save_load_clear() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("nested").join("session.toml");
    let store = FileSessionStore::new(file.clone());

    let session = Session::new("tok1", "ref1", "did:plc:abc");
    store.save(&session).unwrap();
    assert!(file.exists());
    assert_eq!(store.load().unwrap(), session);

    store.clear().unwrap();
    assert!(!file.exists());
    assert_eq!(store.load().unwrap(), Session::default());

    // Clearing twice is fine
    store.clear().unwrap();
}

#[cfg(unix)]
#[test]
fn test_file_store_permissions_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("session.toml");
    let store = FileSessionStore::new(file.clone());
    store.save(&Session::new("tok1", "ref1", "did:plc:abc")).unwrap();

    let mode = std::fs::metadata(&file).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[cfg(unix)]
#[test]
fn test_file_store_refuses_symlink() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("elsewhere.toml");
    std::fs::write(&target, "access_token = \"x\"\n").unwrap();
    let link = temp_dir.path().join("session.toml");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let store = FileSessionStore::new(link);
    let err = store.load().unwrap_err();
    assert!(matches!(
        err,
        crate::SkypostError::Store(StoreError::Symlink(_))
    ));
    assert!(store.save(&Session::default()).is_err());
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "identifier": "alice.bsky.social",
            "password": "app-pw"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessJwt": "tok1",
            "refreshJwt": "ref1",
            "did": "did:plc:abc",
            "handle": "alice.bsky.social"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = memory_manager(Session::default());
    let session = manager
        .connect(AccountCredentials::new(
            server.uri(),
            "alice.bsky.social",
            "app-pw".to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(session, Session::new("tok1", "ref1", "did:plc:abc"));
    assert_eq!(store.load().unwrap(), session);
    assert_eq!(
        manager.status().unwrap(),
        ConnectionStatus::Connected {
            actor_id: "did:plc:abc".to_string()
        }
    );
}

#[tokio::test]
async fn test_login_with_trailing_slash_domain() {
    let server = MockServer::start().await;
    mount_create_session(
        &server,
        200,
        json!({"accessJwt": "tok1", "refreshJwt": "ref1", "did": "did:plc:abc"}),
    )
    .await;

    let (manager, _store) = memory_manager(Session::default());
    let domain = format!("{}/", server.uri());
    let session = manager
        .login(&domain, "alice", &SecretString::from("pw".to_string()))
        .await
        .unwrap();

    assert_eq!(session.actor_id, "did:plc:abc");
}

#[tokio::test]
async fn test_failed_login_clears_session_and_never_stores_password() {
    let server = MockServer::start().await;
    mount_create_session(
        &server,
        400,
        json!({"error": "AuthenticationRequired", "message": "Invalid identifier or password"}),
    )
    .await;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("session.toml");
    let store = Arc::new(FileSessionStore::new(file.clone()));
    store.save(&Session::new("old-tok", "old-ref", "did:plc:old")).unwrap();

    let manager = CredentialManager::new(client(), store.clone());
    let err = manager
        .connect(AccountCredentials::new(
            server.uri(),
            "alice.bsky.social",
            "super-secret-app-pw".to_string(),
        ))
        .await
        .unwrap_err();

    match err {
        crate::SkypostError::Auth(AuthError::Rejected { status, body, .. }) => {
            assert_eq!(status, 400);
            assert!(body.contains("AuthenticationRequired"));
        }
        other => panic!("Expected rejected login, got {:?}", other),
    }

    assert_eq!(store.load().unwrap(), Session::default());
    assert!(!manager.status().unwrap().is_connected());

    // Nothing on disk may carry the password
    if file.exists() {
        let content = std::fs::read_to_string(&file).unwrap();
        assert!(!content.contains("super-secret-app-pw"));
    }
    for entry in std::fs::read_dir(temp_dir.path()).unwrap() {
        let content = std::fs::read(entry.unwrap().path()).unwrap_or_default();
        assert!(!String::from_utf8_lossy(&content).contains("super-secret-app-pw"));
    }
}

#[tokio::test]
async fn test_login_missing_did_is_malformed() {
    let server = MockServer::start().await;
    mount_create_session(&server, 200, json!({"accessJwt": "tok1", "refreshJwt": "ref1"})).await;

    let (manager, store) = memory_manager(Session::new("a", "b", "c"));
    let err = manager
        .connect(AccountCredentials::new(server.uri(), "alice", "pw".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        crate::SkypostError::Auth(AuthError::MalformedResponse { .. })
    ));
    assert_eq!(store.load().unwrap(), Session::default());
}

#[tokio::test]
async fn test_login_empty_access_token_is_malformed() {
    let server = MockServer::start().await;
    mount_create_session(
        &server,
        200,
        json!({"accessJwt": "", "refreshJwt": "ref1", "did": "did:plc:abc"}),
    )
    .await;

    let (manager, _store) = memory_manager(Session::default());
    let err = manager
        .login(&server.uri(), "alice", &SecretString::from("pw".to_string()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AuthError::MalformedResponse {
            endpoint: CREATE_SESSION,
            reason: "missing accessJwt".to_string()
        }
    );
}

#[tokio::test]
async fn test_login_non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.createSession"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
        .mount(&server)
        .await;

    let (manager, _store) = memory_manager(Session::default());
    let err = manager
        .login(&server.uri(), "alice", &SecretString::from("pw".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_login_requires_password_without_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, _store) = memory_manager(Session::default());
    let err = manager
        .login(&server.uri(), "alice", &SecretString::from(String::new()))
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::MissingCredentials("password".to_string()));
}

#[tokio::test]
async fn test_login_transport_failure_clears_session() {
    let (manager, store) = memory_manager(Session::new("tok", "ref", "did:plc:abc"));

    let err = manager
        .connect(AccountCredentials::new(
            "http://127.0.0.1:9",
            "alice",
            "pw".to_string(),
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        crate::SkypostError::Auth(AuthError::Transport(_))
    ));
    assert_eq!(store.load().unwrap(), Session::default());
}

// ============================================================================
// Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_overwrites_tokens_and_keeps_did() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.refreshSession"))
        .and(header("authorization", "Bearer ref1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessJwt": "tok2",
            "refreshJwt": "ref2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = memory_manager(Session::new("tok1", "ref1", "did:plc:abc"));
    let session = manager.refresh_stored(&server.uri()).await.unwrap();

    assert_eq!(session, Session::new("tok2", "ref2", "did:plc:abc"));
    assert_eq!(store.load().unwrap(), session);
}

#[tokio::test]
async fn test_failed_refresh_clears_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.refreshSession"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "ExpiredToken",
            "message": "Token has expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store) = memory_manager(Session::new("tok1", "ref1", "did:plc:abc"));
    let err = manager.refresh_stored(&server.uri()).await.unwrap_err();

    match err {
        crate::SkypostError::Auth(AuthError::Rejected { status, body, .. }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "ExpiredToken: Token has expired");
        }
        other => panic!("Expected rejected refresh, got {:?}", other),
    }

    let stored = store.load().unwrap();
    assert!(stored.access_token.is_empty());
    assert!(stored.refresh_token.is_empty());
    assert_eq!(manager.status().unwrap(), ConnectionStatus::NotConnected);
}

/// Store whose `clear` always fails, like a read-only session directory
struct StickyStore {
    session: Mutex<Session>,
}

impl SessionStore for StickyStore {
    fn load(&self) -> Result<Session> {
        Ok(self.session.lock().unwrap().clone())
    }

    fn save(&self, session: &Session) -> Result<()> {
        *self.session.lock().unwrap() = session.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ))
        .into())
    }

    fn backend_name(&self) -> &str {
        "sticky"
    }
}

#[tokio::test]
async fn test_failed_refresh_reports_clear_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/xrpc/com.atproto.server.refreshSession"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "ExpiredToken",
            "message": "Token has expired"
        })))
        .mount(&server)
        .await;
    mount_create_session(&server, 401, json!({"error": "AuthenticationRequired"})).await;

    let store = Arc::new(StickyStore {
        session: Mutex::new(Session::new("tok1", "ref1", "did:plc:abc")),
    });
    let manager = CredentialManager::new(client(), store);

    let err = manager.refresh_stored(&server.uri()).await.unwrap_err();
    assert!(
        matches!(err, crate::SkypostError::Store(StoreError::Io(_))),
        "Expected the clear failure, got {:?}",
        err
    );

    let credentials = AccountCredentials::new(server.uri(), "alice", "app-pw".to_string());
    let err = manager.connect(credentials).await.unwrap_err();
    assert!(matches!(err, crate::SkypostError::Store(StoreError::Io(_))));
}

#[tokio::test]
async fn test_refresh_without_stored_token_makes_no_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, _store) = memory_manager(Session::default());
    let err = manager.refresh_stored(&server.uri()).await.unwrap_err();

    assert!(matches!(
        err,
        crate::SkypostError::Auth(AuthError::MissingCredentials(_))
    ));
}

// ============================================================================
// Status
// ============================================================================

#[test]
fn test_status_display() {
    assert_eq!(ConnectionStatus::NotConnected.to_string(), "not connected");
    assert_eq!(
        ConnectionStatus::Connected {
            actor_id: "did:plc:abc".to_string()
        }
        .to_string(),
        "connected as did:plc:abc"
    );
}

#[test]
fn test_logout_clears_store() {
    let (manager, store) = memory_manager(Session::new("tok1", "ref1", "did:plc:abc"));
    assert!(manager.status().unwrap().is_connected());

    manager.logout().unwrap();
    assert_eq!(store.load().unwrap(), Session::default());
}

#[test]
fn test_account_credentials_debug_hides_password() {
    let credentials = AccountCredentials::new("https://bsky.social", "alice", "hunter2".to_string());
    let debug = format!("{:?}", credentials);
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("alice"));
}

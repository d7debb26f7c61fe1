use super::*;
use crate::models::{Session, User};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tempfile::TempDir;

fn token_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}

fn session_with_token(token: &str) -> Session {
    Session {
        user: User {
            id: "u1".to_string(),
            username: "ada".to_string(),
            email: Some("ada@example.com".to_string()),
            created_at: None,
        },
        access_token: token.to_string(),
        token_type: "bearer".to_string(),
    }
}

#[test]
fn test_token_needs_three_segments() {
    assert_eq!(validate_token("abc", 0), Err(TokenError::Segments(1)));
    assert_eq!(validate_token("a.b", 0), Err(TokenError::Segments(2)));
    assert_eq!(validate_token("a.b.c.d", 0), Err(TokenError::Segments(4)));
}

#[test]
fn test_token_expiry() {
    let token = token_with_exp(1_000);
    assert_eq!(validate_token(&token, 999), Ok(()));
    assert_eq!(validate_token(&token, 1_001), Err(TokenError::Expired(1_000)));
    assert_eq!(validate_token("a.!!!.c", 0), Err(TokenError::Payload));
}

#[test]
fn test_expired_token_clears_session() {
    let store = SessionStore::in_memory();
    store
        .set_user(&session_with_token(&token_with_exp(Utc::now().timestamp() - 60)))
        .unwrap();
    assert!(store.get_user().is_some());

    assert!(!store.is_logged_in());
    assert!(store.get_user().is_none());
}

#[test]
fn test_malformed_token_clears_session() {
    let store = SessionStore::in_memory();
    store.set_user(&session_with_token("not-a-jwt")).unwrap();

    assert!(!store.is_logged_in());
    assert!(store.get_user().is_none());
}

#[test]
fn test_valid_token_is_logged_in() {
    let store = SessionStore::in_memory();
    assert!(!store.is_logged_in());

    let token = token_with_exp(Utc::now().timestamp() + 3_600);
    store.set_user(&session_with_token(&token)).unwrap();
    assert!(store.is_logged_in());
    assert_eq!(store.auth_token().as_deref(), Some(token.as_str()));
}

#[test]
fn test_changes_are_broadcast() {
    let store = SessionStore::in_memory();
    let mut rx = store.subscribe();

    let session = session_with_token("a.b.c");
    store.set_user(&session).unwrap();
    store.logout().unwrap();

    assert_eq!(rx.try_recv().unwrap(), SessionEvent::Changed(session));
    assert_eq!(rx.try_recv().unwrap(), SessionEvent::Cleared);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_file_storage_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("session.json");

    let session = session_with_token("a.b.c");
    SessionStore::new(FileStorage::new(&path)).set_user(&session).unwrap();

    let reopened = SessionStore::new(FileStorage::new(&path));
    assert_eq!(reopened.get_user(), Some(session));

    reopened.logout().unwrap();
    assert!(!path.exists());
    // Clearing twice is fine.
    reopened.logout().unwrap();
}

#[test]
fn test_garbage_blob_reads_as_logged_out() {
    let storage = MemoryStorage::default();
    storage.save("{not json").unwrap();
    let store = SessionStore::new(storage);
    assert!(store.get_user().is_none());
    assert!(!store.is_logged_in());
}

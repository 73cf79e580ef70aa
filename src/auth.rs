//! Email/password accounts and sessions.
//!
//! A [`Session`] is passed explicitly into every card-store call. Clients
//! that keep a single signed-in user hold a [`SessionManager`], which
//! publishes every sign-in and sign-out on one watch channel.

use hmac::{Hmac, Mac};
use rusqlite::Connection;
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub email: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of the password keyed by the user's salt.
fn password_mac(salt: &str, password: &str) -> StoreResult<HmacSha256> {
    let mut mac =
        HmacSha256::new_from_slice(salt.as_bytes()).map_err(|_| StoreError::InvalidCredentials)?;
    mac.update(password.as_bytes());
    Ok(mac)
}

fn hash_password(salt: &str, password: &str) -> StoreResult<String> {
    Ok(hex::encode(password_mac(salt, password)?.finalize().into_bytes()))
}

/// Constant-time comparison against the stored hex digest.
fn verify_password(salt: &str, password: &str, password_hash: &str) -> bool {
    let Ok(expected) = hex::decode(password_hash) else {
        return false;
    };
    password_mac(salt, password)
        .map(|mac| mac.verify_slice(&expected).is_ok())
        .unwrap_or(false)
}

fn open_session(conn: &Connection, user_id: i64, email: String) -> StoreResult<Session> {
    let token = Uuid::new_v4().to_string();
    db::insert_session(conn, &token, user_id)?;
    Ok(Session {
        token,
        user_id,
        email,
    })
}

/// Creates an account and signs it in.
pub fn sign_up(conn: &Connection, email: &str, password: &str) -> StoreResult<Session> {
    let email = normalize_email(email);
    if email.is_empty() || password.is_empty() {
        return Err(StoreError::InvalidCredentials);
    }
    let salt = Uuid::new_v4().to_string();
    let user_id = db::insert_user(conn, &email, &hash_password(&salt, password)?, &salt)?;
    info!(user_id, "user signed up");
    open_session(conn, user_id, email)
}

pub fn sign_in(conn: &Connection, email: &str, password: &str) -> StoreResult<Session> {
    let email = normalize_email(email);
    let user = db::find_user_by_email(conn, &email)?.ok_or(StoreError::InvalidCredentials)?;
    if !verify_password(&user.salt, password, &user.password_hash) {
        return Err(StoreError::InvalidCredentials);
    }
    info!(user_id = user.id, "user signed in");
    open_session(conn, user.id, user.email)
}

/// Resolves a bearer token to its active session.
pub fn authenticate(conn: &Connection, token: &str) -> StoreResult<Session> {
    db::find_session(conn, token)?.ok_or(StoreError::Unauthenticated)
}

pub fn sign_out(conn: &Connection, token: &str) -> StoreResult<()> {
    if !db::deactivate_session(conn, token)? {
        return Err(StoreError::Unauthenticated);
    }
    info!("session signed out");
    Ok(())
}

/// Holds the current session for a single-user client.
#[derive(Debug)]
pub struct SessionManager {
    sender: watch::Sender<Option<Session>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Starts from the most recent active session stored in the database.
    pub fn resume(conn: &Connection) -> StoreResult<Self> {
        let manager = Self::new();
        manager.sender.send_replace(db::latest_session(conn)?);
        Ok(manager)
    }

    pub fn current(&self) -> Option<Session> {
        self.sender.borrow().clone()
    }

    /// The current session, or `Unauthenticated` if nobody is signed in.
    pub fn require(&self) -> StoreResult<Session> {
        self.current().ok_or(StoreError::Unauthenticated)
    }

    /// Notified whenever the session changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sender.subscribe()
    }

    pub fn sign_up(&self, conn: &Connection, email: &str, password: &str) -> StoreResult<Session> {
        let session = sign_up(conn, email, password)?;
        self.replace(conn, session.clone())?;
        Ok(session)
    }

    pub fn sign_in(&self, conn: &Connection, email: &str, password: &str) -> StoreResult<Session> {
        let session = sign_in(conn, email, password)?;
        self.replace(conn, session.clone())?;
        Ok(session)
    }

    /// Publishes `session` and ends the one it supersedes, so a later
    /// `resume` cannot fall back to it.
    fn replace(&self, conn: &Connection, session: Session) -> StoreResult<()> {
        if let Some(previous) = self.sender.send_replace(Some(session)) {
            db::deactivate_session(conn, &previous.token)?;
        }
        Ok(())
    }

    pub fn sign_out(&self, conn: &Connection) -> StoreResult<()> {
        let session = self.require()?;
        sign_out(conn, &session.token)?;
        self.sender.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_sign_up_then_sign_in() {
        let conn = test_db();
        let created = sign_up(&conn, " Alice@Example.com ", "hunter2").unwrap();
        assert_eq!(created.email, "alice@example.com");

        let session = sign_in(&conn, "alice@example.com", "hunter2").unwrap();
        assert_eq!(session.user_id, created.user_id);
        assert_ne!(session.token, created.token);
        assert_eq!(authenticate(&conn, &session.token).unwrap(), session);
    }

    #[test]
    fn test_wrong_password_rejected() {
        let conn = test_db();
        sign_up(&conn, "alice@example.com", "hunter2").unwrap();

        let err = sign_in(&conn, "alice@example.com", "wrong").unwrap_err();
        assert!(matches!(err, StoreError::InvalidCredentials));
        let err = sign_in(&conn, "nobody@example.com", "hunter2").unwrap_err();
        assert!(matches!(err, StoreError::InvalidCredentials));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let conn = test_db();
        assert!(matches!(
            sign_up(&conn, "  ", "pw").unwrap_err(),
            StoreError::InvalidCredentials
        ));
        assert!(matches!(
            sign_up(&conn, "a@example.com", "").unwrap_err(),
            StoreError::InvalidCredentials
        ));
    }

    #[test]
    fn test_password_not_stored_in_plain_text() {
        let conn = test_db();
        sign_up(&conn, "alice@example.com", "hunter2").unwrap();
        let user = db::find_user_by_email(&conn, "alice@example.com")
            .unwrap()
            .unwrap();
        assert_ne!(user.password_hash, "hunter2");
        assert_eq!(
            user.password_hash,
            hash_password(&user.salt, "hunter2").unwrap()
        );
        assert!(verify_password(&user.salt, "hunter2", &user.password_hash));
        assert!(!verify_password(&user.salt, "hunter3", &user.password_hash));
        assert!(!verify_password(&user.salt, "hunter2", "not-hex"));
    }

    #[test]
    fn test_sign_out_invalidates_token() {
        let conn = test_db();
        let session = sign_up(&conn, "alice@example.com", "hunter2").unwrap();

        sign_out(&conn, &session.token).unwrap();
        assert!(matches!(
            authenticate(&conn, &session.token).unwrap_err(),
            StoreError::Unauthenticated
        ));
        assert!(matches!(
            sign_out(&conn, &session.token).unwrap_err(),
            StoreError::Unauthenticated
        ));
    }

    #[test]
    fn test_manager_notifies_subscribers() {
        let conn = test_db();
        let manager = SessionManager::new();
        let mut rx = manager.subscribe();
        assert!(manager.current().is_none());
        assert!(matches!(
            manager.require().unwrap_err(),
            StoreError::Unauthenticated
        ));

        let session = manager.sign_up(&conn, "alice@example.com", "hunter2").unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&session));

        manager.sign_out(&conn).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_manager_resumes_latest_session() {
        let conn = test_db();
        let session = sign_up(&conn, "alice@example.com", "hunter2").unwrap();

        let manager = SessionManager::resume(&conn).unwrap();
        assert_eq!(manager.current(), Some(session));
    }

    #[test]
    fn test_sign_out_survives_resume() {
        let conn = test_db();

        SessionManager::resume(&conn)
            .unwrap()
            .sign_up(&conn, "alice@example.com", "hunter2")
            .unwrap();
        let second = SessionManager::resume(&conn)
            .unwrap()
            .sign_in(&conn, "alice@example.com", "hunter2")
            .unwrap();

        let manager = SessionManager::resume(&conn).unwrap();
        assert_eq!(manager.current(), Some(second));
        manager.sign_out(&conn).unwrap();

        assert!(SessionManager::resume(&conn).unwrap().current().is_none());
    }

    #[test]
    fn test_switching_users_ends_previous_session() {
        let conn = test_db();
        let manager = SessionManager::new();
        let alice = manager.sign_up(&conn, "alice@example.com", "hunter2").unwrap();
        manager.sign_up(&conn, "bob@example.com", "swordfish").unwrap();

        assert!(matches!(
            authenticate(&conn, &alice.token).unwrap_err(),
            StoreError::Unauthenticated
        ));

        manager.sign_out(&conn).unwrap();
        assert!(SessionManager::resume(&conn).unwrap().current().is_none());
    }

    #[test]
    fn test_failed_sign_in_keeps_current_session() {
        let conn = test_db();
        let manager = SessionManager::new();
        let alice = manager.sign_up(&conn, "alice@example.com", "hunter2").unwrap();

        assert!(manager.sign_in(&conn, "alice@example.com", "wrong").is_err());
        assert_eq!(manager.current(), Some(alice.clone()));
        assert_eq!(authenticate(&conn, &alice.token).unwrap(), alice);
    }
}

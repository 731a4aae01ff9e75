//! Authentication Module
//!
//! Session state, its durable store, and the sign-in / token-reissue flows
//! that populate it.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::storage::{FileStorage, StorageError};
use crate::sync::{bearer, ApiClient, ApiError};

const SESSION_KEY: &str = "session";

/// Session data persisted on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub member_id: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A blank access token means "not signed in", whatever the member id says
    pub fn is_signed_in(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

/// Durable holder of the current session.
///
/// Cloning yields another handle to the same store. Every write persists the
/// whole session and then publishes it, so readers only ever observe complete
/// sessions in write order.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: FileStorage,
    tx: watch::Sender<Session>,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Open the store, restoring a previously persisted session if present
    pub fn open(storage: FileStorage) -> Self {
        let session = match storage.load::<Session>(SESSION_KEY) {
            Ok(session) => {
                info!("Restored session for member: {}", session.member_id);
                session
            }
            Err(StorageError::NotFound(_)) => Session::default(),
            Err(e) => {
                warn!("Stored session unreadable, starting signed out: {}", e);
                Session::default()
            }
        };

        let (tx, _rx) = watch::channel(session);

        Self {
            inner: Arc::new(Inner {
                storage,
                tx,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Save the access token and member id together.
    ///
    /// Blocks on the session file write; async callers on a busy runtime
    /// may want `spawn_blocking`.
    pub fn save(&self, access_token: &str, member_id: &str) -> Result<(), StorageError> {
        self.update(|session| {
            session.access_token = access_token.to_string();
            session.member_id = member_id.to_string();
        })?;
        info!("Session saved for member: {}", member_id);
        Ok(())
    }

    /// Save the full token set returned by a sign-in exchange
    pub fn save_tokens(
        &self,
        access_token: &str,
        member_id: &str,
        refresh_token: &str,
    ) -> Result<(), StorageError> {
        self.update(|session| {
            session.access_token = access_token.to_string();
            session.member_id = member_id.to_string();
            session.refresh_token = refresh_token.to_string();
        })?;
        info!("Session tokens saved for member: {}", member_id);
        Ok(())
    }

    pub fn save_refresh_token(&self, refresh_token: &str) -> Result<(), StorageError> {
        self.update(|session| session.refresh_token = refresh_token.to_string())
    }

    /// Sign out: persist and publish an empty session
    pub fn clear(&self) -> Result<(), StorageError> {
        self.update(|session| *session = Session::default())?;
        info!("Session cleared");
        Ok(())
    }

    /// Latest session as a single consistent value
    pub fn snapshot(&self) -> Session {
        self.inner.tx.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.tx.borrow().is_signed_in()
    }

    /// Stream of access tokens: the current value first, then one per change
    pub fn read_access_token(&self) -> impl Stream<Item = String> + Send + 'static {
        self.read_field(|session| session.access_token.clone())
    }

    /// Stream of member ids: the current value first, then one per change
    pub fn read_member_id(&self) -> impl Stream<Item = String> + Send + 'static {
        self.read_field(|session| session.member_id.clone())
    }

    pub fn read_refresh_token(&self) -> impl Stream<Item = String> + Send + 'static {
        self.read_field(|session| session.refresh_token.clone())
    }

    fn read_field(
        &self,
        field: fn(&Session) -> String,
    ) -> impl Stream<Item = String> + Send + 'static {
        let rx = self.inner.tx.subscribe();

        stream::unfold((rx, true), move |(mut rx, first)| async move {
            // Ends the stream once the store itself is gone
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let value = {
                let session = rx.borrow_and_update();
                field(&session)
            };
            Some((value, (rx, false)))
        })
    }

    // Synchronous file write under the lock; every writer goes through here
    fn update(&self, apply: impl FnOnce(&mut Session)) -> Result<(), StorageError> {
        let _guard = self
            .inner
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next = self.inner.tx.borrow().clone();
        apply(&mut next);
        next.saved_at = Some(Utc::now());

        self.inner.storage.save(SESSION_KEY, &next)?;
        self.inner.tx.send_replace(next);
        Ok(())
    }
}

/// Sign in with user credentials and store the resulting session
pub async fn sign_in(
    api: &ApiClient,
    store: &SessionStore,
    user_id: &str,
    password: &str,
) -> Result<Session, AuthError> {
    let response = api.sign_in(user_id, password).await?;

    store.save_tokens(
        &bearer(&response.access_token),
        &response.member_id,
        &response.refresh_token,
    )?;

    Ok(store.snapshot())
}

/// Exchange the stored refresh token for a new token pair.
///
/// A running reporter picks the new access token up on its next tick.
pub async fn reissue(api: &ApiClient, store: &SessionStore) -> Result<Session, AuthError> {
    let current = store.snapshot();
    if current.refresh_token.trim().is_empty() {
        return Err(AuthError::NoRefreshToken);
    }

    let response = api
        .reissue_token(&current.member_id, &current.refresh_token)
        .await?;

    store.save_tokens(
        &bearer(&response.access_token),
        &current.member_id,
        &response.refresh_token,
    )?;
    info!("Access token reissued for member: {}", current.member_id);

    Ok(store.snapshot())
}

/// Authentication flow errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No refresh token stored")]
    NoRefreshToken,
}

//! Authenticated-user state and its lifecycle.
//!
//! # Design
//! `SessionStore` is an explicit object, shared through `Arc`, that owns the
//! current user and token and mirrors them into a `CredentialStorage`. It
//! never performs network calls itself: `ApiClient::login` / `logout` drive
//! the transitions, and the forced-logout response stage invalidates it.
//!
//! ```text
//! Unauthenticated ──begin_login──▶ Authenticating ──establish──▶ Authenticated
//!        ▲                              │                            │
//!        └────────── abort_login ◀──────┘      clear / force_logout ─┘
//! ```
//!
//! Logging in again from `Authenticated` keeps the current session, in
//! memory and in storage, until `establish` replaces it.
//!
//! Navigation is not this crate's concern. A forced logout is announced as
//! `SessionEvent::ForcedLogout`; the host application's router subscribes and
//! moves to the login route.

use std::sync::{Arc, PoisonError, RwLock};

use crate::storage::{CredentialStorage, AUTHENTICATED_KEY, SESSION_KEYS, TOKEN_KEY, USER_KEY};
use crate::types::User;

/// Route the host should show after a forced logout.
pub const LOGIN_ROUTE: &str = "/auth/login";

/// An authenticated user together with the bearer token issued for them.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(Session),
}

/// Notifications delivered to subscribers after a state change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn { user: User },
    TokenRefreshed,
    LoggedOut,
    ForcedLogout { redirect_to: String },
}

type Listener = Box<dyn Fn(&SessionEvent) + Send + Sync>;

pub struct SessionStore {
    storage: Arc<dyn CredentialStorage>,
    state: RwLock<SessionState>,
    listeners: RwLock<Vec<Listener>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Restore the session from `storage` without touching the network.
    ///
    /// Both a token and a decodable user snapshot must be present to start
    /// `Authenticated`; anything else starts `Unauthenticated`.
    pub fn init(storage: Arc<dyn CredentialStorage>) -> Self {
        let state = match restore(storage.as_ref()) {
            Some(session) => {
                tracing::debug!(user = %session.user.username, "restored persisted session");
                SessionState::Authenticated(session)
            }
            None => SessionState::Unauthenticated,
        };
        Self {
            storage,
            state: RwLock::new(state),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// True iff both a token and a user are currently held.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            SessionState::Authenticated(_)
        )
    }

    pub fn token(&self) -> Option<String> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SessionState::Authenticated(session) => Some(session.token.clone()),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<User> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SessionState::Authenticated(session) => Some(session.user.clone()),
            _ => None,
        }
    }

    pub fn storage(&self) -> &Arc<dyn CredentialStorage> {
        &self.storage
    }

    /// Register a callback invoked after every state change.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Mark a login attempt in flight. Only moves out of `Unauthenticated`;
    /// an existing session keeps authorizing requests meanwhile.
    pub fn begin_login(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::Unauthenticated) {
            *state = SessionState::Authenticating;
        }
    }

    /// Return to `Unauthenticated` after a failed login attempt. A session
    /// established concurrently by another caller is left alone.
    pub fn abort_login(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::Authenticating) {
            *state = SessionState::Unauthenticated;
        }
    }

    /// Hold `user` and `token` in memory and in storage.
    pub fn establish(&self, user: User, token: String) {
        match serde_json::to_string(&user) {
            Ok(snapshot) => {
                self.persist(TOKEN_KEY, &token);
                self.persist(USER_KEY, &snapshot);
                self.persist(AUTHENTICATED_KEY, "true");
            }
            Err(e) => tracing::warn!(error = %e, "could not serialize user snapshot"),
        }
        self.set_state(SessionState::Authenticated(Session {
            user: user.clone(),
            token,
        }));
        self.emit(&SessionEvent::LoggedIn { user });
    }

    /// Swap the bearer token of the current session. No-op when
    /// unauthenticated.
    pub fn replace_token(&self, token: String) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let SessionState::Authenticated(session) = &mut *state else {
                return;
            };
            session.token = token.clone();
        }
        self.persist(TOKEN_KEY, &token);
        self.emit(&SessionEvent::TokenRefreshed);
    }

    /// Drop the session locally. Never fails; storage errors are logged.
    pub fn clear(&self) {
        self.wipe();
        self.emit(&SessionEvent::LoggedOut);
    }

    /// Drop the session after the server rejected its credentials and ask
    /// the host to navigate to `redirect_to`.
    pub fn force_logout(&self, redirect_to: &str) {
        tracing::warn!(redirect_to, "forcing logout after authentication failure");
        self.wipe();
        self.emit(&SessionEvent::ForcedLogout {
            redirect_to: redirect_to.to_string(),
        });
    }

    fn wipe(&self) {
        for key in SESSION_KEYS {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!(key, error = %e, "could not remove persisted credential");
            }
        }
        self.set_state(SessionState::Unauthenticated);
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            tracing::warn!(key, error = %e, "could not persist credential");
        }
    }

    fn set_state(&self, next: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn emit(&self, event: &SessionEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(event);
        }
    }
}

fn restore(storage: &dyn CredentialStorage) -> Option<Session> {
    let token = storage.get(TOKEN_KEY).ok().flatten().filter(|t| !t.is_empty())?;
    let snapshot = storage.get(USER_KEY).ok().flatten()?;
    let user = serde_json::from_str(&snapshot)
        .map_err(|e| tracing::warn!(error = %e, "ignoring unreadable user snapshot"))
        .ok()?;
    Some(Session { user, token })
}

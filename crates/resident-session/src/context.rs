//! Worker-wide session identity.
//!
//! A worker keeps exactly one [`SessionContext`] for its whole lifetime, which
//! is precisely what makes it dangerous: whatever request N left behind is
//! still there when request N+1 arrives. The context therefore never trusts
//! its own state across requests. Identity is re-derived from the incoming
//! cookie by [`SessionContext::prime`] and wiped by
//! [`SessionContext::invalidate`].

use std::sync::Arc;

use resident_core::ResponseCookie;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::id::SessionId;
use crate::store::{SessionData, SessionStore};

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie name carrying the session id.
    pub cookie_name: String,
    /// Cookie path.
    pub cookie_path: String,
    /// Cookie domain.
    pub cookie_domain: Option<String>,
    /// Send the cookie over HTTPS only.
    pub secure: bool,
    /// Hide the cookie from scripts.
    pub http_only: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "RESIDENTSESSID".to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            secure: false,
            http_only: true,
        }
    }
}

/// How the identity for the current request was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimeOutcome {
    /// Taken from the request's session cookie.
    FromCookie,
    /// A previous request left an id behind and no cookie was sent; a fresh
    /// id replaced it.
    Reissued,
    /// No cookie and no leftover identity.
    Unset,
}

/// A session started by the application during the current request.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    id: SessionId,
    data: SessionData,
}

impl ActiveSession {
    /// The session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Write a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// All session data.
    pub fn data(&self) -> &SessionData {
        &self.data
    }
}

/// Session identity plus the session started for the current request.
pub struct SessionContext {
    settings: SessionSettings,
    store: Arc<dyn SessionStore>,
    /// Current identity. `None` is the invalid placeholder.
    identity: Option<SessionId>,
    /// Id the client sent with this request, if any.
    cookie_id: Option<SessionId>,
    active: Option<ActiveSession>,
}

impl SessionContext {
    /// Create a context backed by `store`.
    pub fn new(settings: SessionSettings, store: Arc<dyn SessionStore>) -> Self {
        Self {
            settings,
            store,
            identity: None,
            cookie_id: None,
            active: None,
        }
    }

    /// Cookie name carrying the session id.
    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie_name
    }

    /// Cookie settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Current identity, if any.
    pub fn current_id(&self) -> Option<&SessionId> {
        self.identity.as_ref()
    }

    /// Whether an identity is set.
    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// Whether the application started a session during this request.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Derive this request's identity from its session cookie value.
    ///
    /// A leftover identity without a matching cookie means an earlier request
    /// started a session and never ended it; adopting it would hand that
    /// session to a different client, so a fresh id is installed instead.
    pub fn prime(&mut self, cookie_value: Option<&str>) -> PrimeOutcome {
        self.cookie_id = None;

        if let Some(raw) = cookie_value {
            match SessionId::parse(raw) {
                Some(id) => {
                    self.identity = Some(id.clone());
                    self.cookie_id = Some(id);
                    return PrimeOutcome::FromCookie;
                }
                None => debug!(cookie = %self.settings.cookie_name, "ignoring malformed session cookie"),
            }
        }

        if self.identity.is_some() {
            warn!("session identity left over from a previous request, reissuing");
            self.identity = Some(SessionId::generate());
            return PrimeOutcome::Reissued;
        }

        PrimeOutcome::Unset
    }

    /// Start (or resume) the session for this request.
    ///
    /// Returns the cookie to send when the client does not already hold the
    /// session id.
    pub fn start(&mut self) -> Result<Option<ResponseCookie>, SessionError> {
        if self.active.is_some() {
            return Ok(None);
        }

        let id = match &self.identity {
            Some(id) => id.clone(),
            None => {
                let id = SessionId::generate();
                self.identity = Some(id.clone());
                id
            }
        };
        let data = self.store.load(&id)?.unwrap_or_default();
        debug!(session_id = %id, "session started");

        let cookie = self.needs_cookie(&id).then(|| self.cookie_for(&id));
        self.active = Some(ActiveSession { id, data });
        Ok(cookie)
    }

    /// The active session.
    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    /// The active session, mutably.
    pub fn active_mut(&mut self) -> Result<&mut ActiveSession, SessionError> {
        self.active.as_mut().ok_or(SessionError::NotStarted)
    }

    /// Move the active session to a new id, e.g. after login.
    ///
    /// Returns the cookie carrying the new id.
    pub fn regenerate(&mut self, destroy_old: bool) -> Result<ResponseCookie, SessionError> {
        let session = self.active.as_mut().ok_or(SessionError::NotStarted)?;
        let old = std::mem::replace(&mut session.id, SessionId::generate());
        if destroy_old {
            self.store.destroy(&old)?;
        }
        let id = session.id.clone();
        self.identity = Some(id.clone());
        Ok(self.cookie_for(&id))
    }

    /// Write the active session back to the store and detach it.
    ///
    /// Returns whether a session was open.
    pub fn close(&mut self) -> Result<bool, SessionError> {
        match self.active.take() {
            Some(session) => {
                self.store.save(&session.id, &session.data)?;
                debug!(session_id = %session.id, "session closed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Destroy the active session in the store and detach it.
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        if let Some(session) = self.active.take() {
            self.store.destroy(&session.id)?;
        }
        Ok(())
    }

    /// Reset identity to the invalid placeholder.
    pub fn invalidate(&mut self) {
        self.identity = None;
        self.cookie_id = None;
    }

    fn needs_cookie(&self, id: &SessionId) -> bool {
        self.cookie_id.as_ref() != Some(id)
    }

    fn cookie_for(&self, id: &SessionId) -> ResponseCookie {
        let mut cookie = ResponseCookie::new(&self.settings.cookie_name, id.as_str())
            .with_path(&self.settings.cookie_path);
        if let Some(domain) = &self.settings.cookie_domain {
            cookie = cookie.with_domain(domain);
        }
        if self.settings.secure {
            cookie = cookie.secure();
        }
        if self.settings.http_only {
            cookie = cookie.http_only();
        }
        cookie
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("settings", &self.settings)
            .field("identity", &self.identity)
            .field("active", &self.active.is_some())
            .finish()
    }
}

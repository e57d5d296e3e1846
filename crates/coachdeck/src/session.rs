//! Session accessor
//!
//! One process-wide [`SessionContext`] holds the authenticated identity.
//! It is filled by [`SessionContext::initialize`] on sign-in and cleared by
//! [`SessionContext::teardown`] on sign-out; everything that needs an owner
//! scope asks it through [`SessionContext::scope`].

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use tokio::sync::watch;
use tracing::info;

use coachdeck_api::{ApiError, BrandAttribute, OwnerScope, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: Option<String>,
    pub business_name: Option<String>,
    #[serde(default)]
    pub brand: Vec<BrandAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub profile: Profile,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            access_token: access_token.into(),
            expires_at: None,
            profile: Profile::default(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn { user_id: String },
}

pub struct SessionContext {
    current: RwLock<Option<Session>>,
    auth: watch::Sender<AuthState>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (auth, _) = watch::channel(AuthState::SignedOut);
        Self {
            current: RwLock::new(None),
            auth,
        }
    }

    /// Install the session for a signed-in user, replacing any previous one.
    pub fn initialize(&self, session: Session) -> Result<()> {
        let scope = OwnerScope::new(session.user_id.as_str())?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.auth.send_replace(AuthState::SignedIn {
            user_id: scope.as_str().to_string(),
        });
        info!("[Session] Signed in as {}", scope);
        Ok(())
    }

    /// Clear the session. Safe to call when already signed out.
    pub fn teardown(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            self.auth.send_replace(AuthState::SignedOut);
            info!("[Session] Signed out");
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Owner scope for queries. Signed-out and expired sessions are
    /// [`ApiError::Unauthenticated`].
    pub fn scope(&self) -> Result<OwnerScope> {
        self.scope_at(Utc::now())
    }

    pub fn scope_at(&self, now: DateTime<Utc>) -> Result<OwnerScope> {
        match self.current() {
            Some(session) if !session.is_expired(now) => OwnerScope::new(session.user_id),
            _ => Err(ApiError::Unauthenticated),
        }
    }

    pub fn access_token(&self) -> Result<String> {
        self.scope()?;
        self.current()
            .map(|s| s.access_token)
            .ok_or(ApiError::Unauthenticated)
    }

    pub fn profile(&self) -> Option<Profile> {
        self.current().map(|s| s.profile)
    }

    pub fn update_profile(&self, profile: Profile) -> Result<()> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let session = current.as_mut().ok_or(ApiError::Unauthenticated)?;
        session.profile = profile;
        Ok(())
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.auth.subscribe()
    }
}

static SESSION: Lazy<SessionContext> = Lazy::new(SessionContext::new);

/// The process-wide session accessor.
pub fn session() -> &'static SessionContext {
    &SESSION
}

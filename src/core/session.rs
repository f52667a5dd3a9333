//! The authoritative record of the current user's credentials and
//! last-known server policy.
//!
//! [`SessionState`] is the serializable snapshot; [`Session`] wraps it with
//! a store so every mutation is persisted before the mutator returns.
//! Rehydration happens in [`Session::open`], so by construction no consumer
//! can read session fields before the persisted blob has been loaded.

use crate::api::{AuthContext, QuotaSnapshot, ServerPolicy};
use crate::core::constants::{DIRECT_API_HOST, HOSTED_PROXY_PATH};
use crate::core::policy::DeployMode;
use crate::core::store::{SessionStore, StoreError};
use crate::utils::url::normalize_base_url;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Version tag written into the persisted blob. Bump when the layout of
/// [`SessionState`] changes incompatibly; older blobs rehydrate as
/// defaults instead of failing.
pub const SESSION_STATE_VERSION: u32 = 1;

/// Serializable session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub version: u32,
    /// Proof of authenticated identity; `None` means unauthenticated.
    pub token: Option<String>,
    /// Shared-secret fallback when no per-user token exists.
    pub access_code: Option<String>,
    /// Set on login success.
    pub user_id: Option<String>,
    /// Upstream endpoint for model calls.
    pub remote_url: String,
    /// Server-declared flag: is an access code mandatory.
    pub need_code: bool,
    /// Server-declared UI policy flag.
    pub hide_user_key: bool,
    /// Remaining standard-tier usage as a server-opaque display string;
    /// `None` means unknown/unfetched.
    pub standard_remaining: Option<String>,
    /// Remaining premium-tier usage; same encoding as the standard tier.
    pub premium_remaining: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            version: SESSION_STATE_VERSION,
            token: None,
            access_code: None,
            user_id: None,
            remote_url: default_remote_url(DeployMode::current()).to_string(),
            need_code: true,
            hide_user_key: false,
            standard_remaining: None,
            premium_remaining: None,
        }
    }
}

impl SessionState {
    /// True iff a token is present, an access code is present, or the
    /// server has declared access control disabled.
    pub fn is_authorized(&self) -> bool {
        self.token.is_some() || self.access_code.is_some() || !self.need_code
    }

    /// Credentials attached to control-plane requests.
    pub fn auth_context(&self) -> AuthContext {
        AuthContext {
            token: self.token.clone(),
            access_code: self.access_code.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

/// Default upstream endpoint by deploy mode: static exports talk to the
/// API host directly, hosted builds route through the app's proxy path.
pub fn default_remote_url(mode: DeployMode) -> &'static str {
    match mode {
        DeployMode::StaticExport => DIRECT_API_HOST,
        DeployMode::Hosted => HOSTED_PROXY_PATH,
    }
}

/// Process-wide session, rehydrated from its store on open and persisted
/// on every mutation.
pub struct Session {
    state: Mutex<SessionState>,
    store: Arc<dyn SessionStore>,
}

impl Session {
    /// Rehydrate the session from `store`.
    ///
    /// A stale version tag or an unreadable blob resets to defaults;
    /// corrupted local state must never take the application down.
    pub fn open(store: Arc<dyn SessionStore>) -> Self {
        let state = match store.load() {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(error = %e, "resetting persisted session to defaults");
                SessionState::default()
            }
        };
        Self {
            state: Mutex::new(state),
            store,
        }
    }

    /// Current state, cloned. Guard decisions and header construction work
    /// off this snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn is_authorized(&self) -> bool {
        self.lock_state().is_authorized()
    }

    pub fn need_code(&self) -> bool {
        self.lock_state().need_code
    }

    pub fn auth_context(&self) -> AuthContext {
        self.lock_state().auth_context()
    }

    /// Store a session token. An empty string clears it.
    pub fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.token = non_empty(token))
    }

    /// Store the shared access code. An empty string clears it.
    pub fn set_access_code(&self, code: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.access_code = non_empty(code))
    }

    /// Point model traffic at a different upstream endpoint.
    pub fn set_remote_url(&self, url: &str) -> Result<(), StoreError> {
        self.mutate(|state| state.remote_url = normalize_base_url(url))
    }

    /// Persist the identity returned by a successful login.
    pub fn record_login(&self, token: &str, user_id: &str) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.token = non_empty(token);
            state.user_id = non_empty(user_id);
        })
    }

    /// Merge server policy into the session. Fields the server omitted
    /// keep their prior values.
    pub fn apply_policy(&self, policy: &ServerPolicy) -> Result<(), StoreError> {
        self.mutate(|state| {
            if let Some(need_code) = policy.need_code {
                state.need_code = need_code;
            }
            if let Some(hide_user_key) = policy.hide_user_key {
                state.hide_user_key = hide_user_key;
            }
        })
    }

    /// Overwrite both tier counters with server-returned values.
    pub fn set_quota(&self, quota: &QuotaSnapshot) -> Result<(), StoreError> {
        self.mutate(|state| {
            state.standard_remaining = Some(quota.standard_remaining.clone());
            state.premium_remaining = Some(quota.premium_remaining.clone());
        })
    }

    /// Drop credentials and policy, restoring defaults. Used on logout and
    /// storage-clear.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.mutate(|state| *state = SessionState::default())
    }

    fn mutate<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.lock_state();
        apply(&mut state);
        self.store.save(&state)
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{FileSessionStore, MemorySessionStore, SessionStore};
    use tempfile::TempDir;

    fn open_memory_session() -> (Session, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let session = Session::open(store.clone());
        (session, store)
    }

    #[test]
    fn set_token_authorizes_immediately() {
        let (session, _) = open_memory_session();
        assert!(!session.is_authorized());

        session.set_token("T").unwrap();
        assert!(session.is_authorized());
    }

    #[test]
    fn empty_token_clears_authorization() {
        let (session, _) = open_memory_session();
        session.set_token("T").unwrap();
        session.set_token("").unwrap();
        assert!(!session.is_authorized());
    }

    #[test]
    fn access_code_authorizes_without_token() {
        let (session, _) = open_memory_session();
        session.set_access_code("secret").unwrap();
        assert!(session.is_authorized());
    }

    #[test]
    fn disabled_access_control_authorizes_anonymous_session() {
        let (session, _) = open_memory_session();
        let policy = ServerPolicy {
            need_code: Some(false),
            ..ServerPolicy::default()
        };
        session.apply_policy(&policy).unwrap();
        assert!(session.is_authorized());
    }

    #[test]
    fn every_mutation_is_persisted() {
        let (session, store) = open_memory_session();
        session.set_token("T").unwrap();
        assert_eq!(store.saved().unwrap().token.as_deref(), Some("T"));

        session.set_remote_url("https://proxy.example.com/v1/").unwrap();
        assert_eq!(
            store.saved().unwrap().remote_url,
            "https://proxy.example.com/v1"
        );
    }

    #[test]
    fn policy_merge_keeps_omitted_fields() {
        let (session, _) = open_memory_session();
        let policy = ServerPolicy {
            hide_user_key: Some(true),
            ..ServerPolicy::default()
        };
        session.apply_policy(&policy).unwrap();

        let state = session.snapshot();
        assert!(state.hide_user_key);
        // need_code was not in the response; the default survives.
        assert!(state.need_code);
    }

    #[test]
    fn reset_restores_defaults_and_persists() {
        let (session, store) = open_memory_session();
        session.record_login("T", "42").unwrap();
        session.reset().unwrap();

        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(store.saved().unwrap(), SessionState::default());
    }

    #[test]
    fn stale_persisted_version_rehydrates_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");

        let mut stale = SessionState::default();
        stale.token = Some("old-token".to_string());
        stale.version = SESSION_STATE_VERSION + 7;
        FileSessionStore::with_path(path.clone()).save(&stale).unwrap();

        let session = Session::open(Arc::new(FileSessionStore::with_path(path)));
        let state = session.snapshot();
        assert_eq!(state, SessionState::default());
        assert!(state.token.is_none());
    }

    #[test]
    fn rehydrated_session_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");

        {
            let session = Session::open(Arc::new(FileSessionStore::with_path(path.clone())));
            session.record_login("T", "42").unwrap();
        }

        let session = Session::open(Arc::new(FileSessionStore::with_path(path)));
        let state = session.snapshot();
        assert_eq!(state.token.as_deref(), Some("T"));
        assert_eq!(state.user_id.as_deref(), Some("42"));
    }
}

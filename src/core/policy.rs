//! One-shot synchronization of server policy into the session.
//!
//! The policy endpoint is consulted at most once per process lifetime. The
//! guard is an atomic state machine (`NotFetched → Fetching → Done`) whose
//! transition into `Fetching` happens before any suspension point, so
//! interleaved triggers issued before the response arrives still produce
//! exactly one request. Failure also advances to `Done`: policy is
//! fail-open and a broken endpoint must not turn into a retry storm.

use crate::api::{AccessApi, ServerPolicy};
use crate::core::catalog::ModelCatalog;
use crate::core::quota::Tier;
use crate::core::session::Session;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// How this build is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    /// Served by a hosting deployment with a control plane to consult.
    Hosted,
    /// Fully static export; there is no server behind the app, so policy
    /// defaults stand permanently.
    StaticExport,
}

impl DeployMode {
    /// Mode baked in at build time.
    pub fn current() -> Self {
        if cfg!(feature = "static-export") {
            DeployMode::StaticExport
        } else {
            DeployMode::Hosted
        }
    }
}

/// Progress of the one-time policy fetch. Only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NotFetched,
    Fetching,
    Done,
}

const NOT_FETCHED: u8 = 0;
const FETCHING: u8 = 1;
const DONE: u8 = 2;

/// Owns the sync guard and performs the single policy fetch.
pub struct PolicySync {
    state: AtomicU8,
    mode: DeployMode,
    api: Arc<dyn AccessApi>,
    session: Arc<Session>,
    catalog: Arc<ModelCatalog>,
}

impl PolicySync {
    pub fn new(api: Arc<dyn AccessApi>, session: Arc<Session>, catalog: Arc<ModelCatalog>) -> Self {
        Self::with_mode(api, session, catalog, DeployMode::current())
    }

    /// Construct with an explicit deploy mode (tests override the
    /// build-time default).
    pub fn with_mode(
        api: Arc<dyn AccessApi>,
        session: Arc<Session>,
        catalog: Arc<ModelCatalog>,
        mode: DeployMode,
    ) -> Self {
        Self {
            state: AtomicU8::new(NOT_FETCHED),
            mode,
            api,
            session,
            catalog,
        }
    }

    pub fn state(&self) -> SyncState {
        match self.state.load(Ordering::Acquire) {
            NOT_FETCHED => SyncState::NotFetched,
            FETCHING => SyncState::Fetching,
            _ => SyncState::Done,
        }
    }

    /// Idempotent sync trigger. The first caller performs the fetch; any
    /// caller arriving while the fetch is in flight or finished returns
    /// immediately without issuing a request.
    pub async fn ensure_synced(&self) {
        if !self.begin() {
            return;
        }
        self.run_fetch().await;
    }

    /// Fire-and-forget variant of [`ensure_synced`](Self::ensure_synced):
    /// the fetch, if this call wins it, runs on a spawned task. Must be
    /// called from within a Tokio runtime.
    pub fn schedule(self: &Arc<Self>) {
        if !self.begin() {
            return;
        }
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            sync.run_fetch().await;
        });
    }

    /// Whether the current session may reach gated content.
    ///
    /// Side-effecting accessor: schedules the lazy policy sync if it has
    /// not started, then answers from current session state. Callers before
    /// the sync lands observe the persisted defaults.
    pub fn is_authorized(self: &Arc<Self>) -> bool {
        self.schedule();
        self.session.is_authorized()
    }

    /// Whether the server requires an access code. Schedules the lazy sync
    /// the same way [`is_authorized`](Self::is_authorized) does.
    pub fn access_control_enabled(self: &Arc<Self>) -> bool {
        self.schedule();
        self.session.need_code()
    }

    /// Claim the transition into `Fetching`. Runs synchronously before any
    /// await so interleaved callers cannot double-fire the request.
    fn begin(&self) -> bool {
        if self.mode == DeployMode::StaticExport {
            return false;
        }
        self.state
            .compare_exchange(NOT_FETCHED, FETCHING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn run_fetch(&self) {
        let auth = self.session.auth_context();
        match self.api.fetch_policy(&auth).await {
            Ok(policy) => self.apply(&policy),
            Err(e) => {
                tracing::debug!(error = %e, "policy fetch failed; keeping prior policy");
            }
        }
        self.state.store(DONE, Ordering::Release);
    }

    fn apply(&self, policy: &ServerPolicy) {
        tracing::debug!(?policy, "got policy from server");
        if let Err(e) = self.session.apply_policy(policy) {
            tracing::debug!(error = %e, "failed to persist server policy");
        }
        if policy.enable_premium == Some(false) {
            self.catalog.set_tier_available(Tier::Premium, false);
        }
        if let Some(greeting) = &policy.greeting {
            self.catalog.set_greeting(greeting);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::core::store::MemorySessionStore;
    use crate::utils::test_utils::{malformed_response_error, ScriptedApi};
    use tokio::sync::Notify;

    fn fixture(api: ScriptedApi, mode: DeployMode) -> (Arc<PolicySync>, Arc<Session>, Arc<ModelCatalog>) {
        let session = Arc::new(Session::open(Arc::new(MemorySessionStore::new())));
        let catalog = Arc::new(ModelCatalog::builtin());
        let sync = Arc::new(PolicySync::with_mode(
            Arc::new(api),
            session.clone(),
            catalog.clone(),
            mode,
        ));
        (sync, session, catalog)
    }

    #[tokio::test]
    async fn interleaved_triggers_issue_exactly_one_request() {
        let gate = Arc::new(Notify::new());
        let api = ScriptedApi::new()
            .policy_ok(ServerPolicy::default())
            .gate_policy(gate.clone());
        let counters = api.counters();
        let (sync, _, _) = fixture(api, DeployMode::Hosted);

        // All three triggers land before the response arrives.
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let sync = sync.clone();
                tokio::spawn(async move { sync.ensure_synced().await })
            })
            .collect();
        tokio::task::yield_now().await;

        assert_eq!(sync.state(), SyncState::Fetching);
        gate.notify_one();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counters.policy_calls(), 1);
        assert_eq!(sync.state(), SyncState::Done);

        // Later triggers stay no-ops for the life of the process.
        sync.ensure_synced().await;
        assert_eq!(counters.policy_calls(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_still_advances_to_done() {
        let api = ScriptedApi::new().policy_err(malformed_response_error());
        let counters = api.counters();
        let (sync, session, _) = fixture(api, DeployMode::Hosted);
        let before = session.snapshot();

        sync.ensure_synced().await;

        assert_eq!(sync.state(), SyncState::Done);
        assert_eq!(session.snapshot(), before);

        // No retry is scheduled for a failed attempt.
        sync.ensure_synced().await;
        assert_eq!(counters.policy_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_fetch_keeps_prior_policy() {
        let api = ScriptedApi::new().policy_err(ApiError::ServerRejected {
            code: 503,
            message: "maintenance".to_string(),
        });
        let (sync, session, _) = fixture(api, DeployMode::Hosted);

        sync.ensure_synced().await;

        assert!(session.need_code());
        assert_eq!(sync.state(), SyncState::Done);
    }

    #[tokio::test]
    async fn static_export_never_fetches() {
        let api = ScriptedApi::new().policy_ok(ServerPolicy::default());
        let counters = api.counters();
        let (sync, _, _) = fixture(api, DeployMode::StaticExport);

        sync.ensure_synced().await;
        let _ = sync.is_authorized();
        let _ = sync.access_control_enabled();

        assert_eq!(counters.policy_calls(), 0);
        assert_eq!(sync.state(), SyncState::NotFetched);
    }

    #[tokio::test]
    async fn successful_fetch_merges_policy_and_updates_the_catalog() {
        let api = ScriptedApi::new().policy_ok(ServerPolicy {
            need_code: Some(false),
            hide_user_key: Some(true),
            enable_premium: Some(false),
            greeting: Some("Welcome back.".to_string()),
        });
        let (sync, session, catalog) = fixture(api, DeployMode::Hosted);

        sync.ensure_synced().await;

        let state = session.snapshot();
        assert!(!state.need_code);
        assert!(state.hide_user_key);

        assert!(catalog
            .models()
            .iter()
            .filter(|m| m.tier == Tier::Premium)
            .all(|m| !m.available));
        assert!(catalog
            .models()
            .iter()
            .filter(|m| m.tier == Tier::Standard)
            .all(|m| m.available));
        assert_eq!(catalog.greeting(), "Welcome back.");
    }

    #[tokio::test]
    async fn authorization_query_triggers_the_lazy_sync() {
        let api = ScriptedApi::new().policy_ok(ServerPolicy {
            need_code: Some(false),
            ..ServerPolicy::default()
        });
        let (sync, _, _) = fixture(api, DeployMode::Hosted);

        // First query sees the persisted default (access control on) but
        // kicks off the fetch.
        assert!(!sync.is_authorized());
        while sync.state() != SyncState::Done {
            tokio::task::yield_now().await;
        }
        assert!(sync.is_authorized());
    }

    #[tokio::test]
    async fn token_authorizes_regardless_of_sync_outcome() {
        let api = ScriptedApi::new().policy_err(malformed_response_error());
        let (sync, session, _) = fixture(api, DeployMode::Hosted);
        session.set_token("T").unwrap();

        assert!(sync.is_authorized());
        sync.ensure_synced().await;
        assert!(sync.is_authorized());
    }
}

use crate::api::{
    AccessApi, ApiError, AuthContext, LoginReply, QuotaSnapshot, ServerPolicy,
};
use crate::core::quota::Tier;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Produce a representative parse failure for scripting malformed-response
/// outcomes.
pub fn malformed_response_error() -> ApiError {
    let source = serde_json::from_str::<serde_json::Value>("<not json>").unwrap_err();
    ApiError::MalformedResponse(source)
}

/// Per-endpoint request counts observed by a [`ScriptedApi`].
#[derive(Default)]
pub struct CallCounters {
    policy: AtomicUsize,
    login: AtomicUsize,
    quota: AtomicUsize,
    consume: AtomicUsize,
}

impl CallCounters {
    pub fn policy_calls(&self) -> usize {
        self.policy.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.login.load(Ordering::SeqCst)
    }

    pub fn quota_calls(&self) -> usize {
        self.quota.load(Ordering::SeqCst)
    }

    pub fn consume_count(&self) -> usize {
        self.consume.load(Ordering::SeqCst)
    }
}

type Scripted<T> = Mutex<Option<Result<T, ApiError>>>;

/// Scripted [`AccessApi`] standing in for the control plane in tests.
///
/// Each endpoint returns its scripted reply exactly once; a second call to
/// an endpoint whose reply was already consumed panics, which doubles as a
/// backstop against accidental re-fires.
#[derive(Default)]
pub struct ScriptedApi {
    login_reply: Scripted<LoginReply>,
    policy_reply: Scripted<ServerPolicy>,
    quota_reply: Scripted<QuotaSnapshot>,
    consume_reply: Scripted<QuotaSnapshot>,
    consume_log: Mutex<Vec<(AuthContext, Tier)>>,
    counters: Arc<CallCounters>,
    policy_gate: Option<Arc<Notify>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_ok(self, reply: LoginReply) -> Self {
        *self.login_reply.lock().unwrap() = Some(Ok(reply));
        self
    }

    pub fn login_err(self, error: ApiError) -> Self {
        *self.login_reply.lock().unwrap() = Some(Err(error));
        self
    }

    pub fn policy_ok(self, policy: ServerPolicy) -> Self {
        *self.policy_reply.lock().unwrap() = Some(Ok(policy));
        self
    }

    pub fn policy_err(self, error: ApiError) -> Self {
        *self.policy_reply.lock().unwrap() = Some(Err(error));
        self
    }

    pub fn quota_ok(self, quota: QuotaSnapshot) -> Self {
        *self.quota_reply.lock().unwrap() = Some(Ok(quota));
        self
    }

    pub fn quota_err(self, error: ApiError) -> Self {
        *self.quota_reply.lock().unwrap() = Some(Err(error));
        self
    }

    pub fn consume_ok(self, quota: QuotaSnapshot) -> Self {
        *self.consume_reply.lock().unwrap() = Some(Ok(quota));
        self
    }

    pub fn consume_err(self, error: ApiError) -> Self {
        *self.consume_reply.lock().unwrap() = Some(Err(error));
        self
    }

    /// Hold the policy response open until `gate` is notified, so tests can
    /// interleave triggers while the request is in flight.
    pub fn gate_policy(mut self, gate: Arc<Notify>) -> Self {
        self.policy_gate = Some(gate);
        self
    }

    pub fn counters(&self) -> Arc<CallCounters> {
        self.counters.clone()
    }

    pub fn consume_calls(&self) -> Vec<(AuthContext, Tier)> {
        self.consume_log.lock().unwrap().clone()
    }
}

fn take<T>(slot: &Scripted<T>, endpoint: &str) -> Result<T, ApiError> {
    slot.lock()
        .unwrap()
        .take()
        .unwrap_or_else(|| panic!("no scripted {endpoint} reply left"))
}

#[async_trait]
impl AccessApi for ScriptedApi {
    async fn login(&self, _account: &str, _password: &str) -> Result<LoginReply, ApiError> {
        self.counters.login.fetch_add(1, Ordering::SeqCst);
        take(&self.login_reply, "login")
    }

    async fn fetch_policy(&self, _auth: &AuthContext) -> Result<ServerPolicy, ApiError> {
        self.counters.policy.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.policy_gate {
            gate.notified().await;
        }
        take(&self.policy_reply, "policy")
    }

    async fn fetch_quota(&self, _auth: &AuthContext) -> Result<QuotaSnapshot, ApiError> {
        self.counters.quota.fetch_add(1, Ordering::SeqCst);
        take(&self.quota_reply, "quota")
    }

    async fn consume_quota(
        &self,
        auth: &AuthContext,
        tier: Tier,
    ) -> Result<QuotaSnapshot, ApiError> {
        self.counters.consume.fetch_add(1, Ordering::SeqCst);
        self.consume_log.lock().unwrap().push((auth.clone(), tier));
        take(&self.consume_reply, "consume")
    }
}

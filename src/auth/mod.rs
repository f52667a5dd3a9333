//! Login and logout flows.
//!
//! [`LoginFlow`] exchanges account credentials for a session token at the
//! control plane's authorization endpoint and persists the returned
//! identity into the session. Rejections carry the server's message
//! verbatim; the session is never mutated on failure.

use crate::api::{AccessApi, LoginReply};
use crate::core::guard::Route;
use crate::core::session::Session;
use crate::core::store::StoreError;
use std::sync::Arc;

/// Outcome of a successful login, including where the caller should
/// navigate next.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user_id: String,
    pub destination: Route,
}

pub struct LoginFlow {
    api: Arc<dyn AccessApi>,
    session: Arc<Session>,
}

impl LoginFlow {
    pub fn new(api: Arc<dyn AccessApi>, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    /// Post credentials to the authorization endpoint. On success the
    /// token and user id are persisted before this returns, so a guard
    /// evaluated right after sees the authenticated session.
    ///
    /// De-duplication of rapid repeated submits is the caller's concern;
    /// each call issues exactly one request.
    pub async fn login(
        &self,
        account: &str,
        password: &str,
    ) -> Result<LoginSuccess, Box<dyn std::error::Error>> {
        let LoginReply { token, user_id } = self.api.login(account, password).await?;
        self.session.record_login(&token, &user_id)?;
        tracing::debug!(user_id = %user_id, "login succeeded");
        Ok(LoginSuccess {
            user_id,
            destination: Route::Chat,
        })
    }

    /// Drop the current identity and reset the session to defaults.
    pub fn logout(&self) -> Result<(), StoreError> {
        self.session.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::core::session::SessionState;
    use crate::core::store::MemorySessionStore;
    use crate::utils::test_utils::ScriptedApi;

    fn flow_with(api: ScriptedApi) -> (LoginFlow, Arc<Session>) {
        let session = Arc::new(Session::open(Arc::new(MemorySessionStore::new())));
        let flow = LoginFlow::new(Arc::new(api), session.clone());
        (flow, session)
    }

    #[tokio::test]
    async fn successful_login_persists_identity_and_points_at_chat() {
        let api = ScriptedApi::new().login_ok(LoginReply {
            token: "T".to_string(),
            user_id: "42".to_string(),
        });
        let (flow, session) = flow_with(api);

        let success = flow.login("u1", "p1").await.unwrap();
        assert_eq!(success.user_id, "42");
        assert_eq!(success.destination, Route::Chat);

        let state = session.snapshot();
        assert_eq!(state.token.as_deref(), Some("T"));
        assert_eq!(state.user_id.as_deref(), Some("42"));
        assert!(session.is_authorized());
    }

    #[tokio::test]
    async fn rejected_login_surfaces_the_server_message_and_leaves_the_session_alone() {
        let api = ScriptedApi::new().login_err(ApiError::ServerRejected {
            code: 401,
            message: "bad credentials".to_string(),
        });
        let (flow, session) = flow_with(api);

        let err = flow.login("u1", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "bad credentials");

        let state = session.snapshot();
        assert!(state.token.is_none());
        assert_eq!(state, SessionState::default());
    }

    #[tokio::test]
    async fn logout_resets_the_session() {
        let api = ScriptedApi::new().login_ok(LoginReply {
            token: "T".to_string(),
            user_id: "42".to_string(),
        });
        let (flow, session) = flow_with(api);

        flow.login("u1", "p1").await.unwrap();
        flow.logout().unwrap();

        assert_eq!(session.snapshot(), SessionState::default());
        assert!(!session.is_authorized());
    }
}

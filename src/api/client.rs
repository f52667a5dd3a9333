//! `reqwest`-backed implementation of [`AccessApi`].

use crate::api::{
    AccessApi, ApiError, AuthContext, LoginEnvelope, LoginReply, LoginRequest, QuotaEnvelope,
    QuotaRequest, QuotaSnapshot, ServerPolicy, CODE_SUCCESS,
};
use crate::core::constants::{DEFAULT_APP_URL, DEFAULT_CONTROL_URL, POLICY_ENDPOINT};
use crate::core::quota::Tier;
use crate::utils::url::construct_api_url;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

const LOGIN_ENDPOINT: &str = "user/login";
const QUOTA_READ_ENDPOINT: &str = "user/remaining";
const QUOTA_CONSUME_ENDPOINT: &str = "user/consume";

/// HTTP client for the hosting app's policy endpoint and the control
/// plane's account endpoints.
pub struct HttpAccessApi {
    client: reqwest::Client,
    app_url: String,
    control_url: String,
}

impl HttpAccessApi {
    pub fn new(client: reqwest::Client, app_url: &str, control_url: &str) -> Self {
        Self {
            client,
            app_url: app_url.to_string(),
            control_url: control_url.to_string(),
        }
    }

    pub fn with_defaults(client: reqwest::Client) -> Self {
        Self::new(client, DEFAULT_APP_URL, DEFAULT_CONTROL_URL)
    }

    async fn post_json<B, T>(
        &self,
        url: String,
        body: Option<&B>,
        auth: Option<&AuthContext>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(&url);
        if let Some(auth) = auth {
            request = apply_auth_headers(request, auth);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::Network)?;
        let status = response.status();
        let text = response.text().await.map_err(ApiError::Network)?;

        if !status.is_success() {
            return Err(ApiError::ServerRejected {
                code: status.as_u16() as i64,
                message: text.trim().to_string(),
            });
        }

        serde_json::from_str(&text).map_err(ApiError::MalformedResponse)
    }
}

fn apply_auth_headers(
    request: reqwest::RequestBuilder,
    auth: &AuthContext,
) -> reqwest::RequestBuilder {
    if let Some(token) = &auth.token {
        request.header("Authorization", format!("Bearer {token}"))
    } else if let Some(code) = &auth.access_code {
        request.header("X-Access-Code", code.clone())
    } else {
        request
    }
}

fn ensure_success(code: i64, msg: String) -> Result<(), ApiError> {
    if code == CODE_SUCCESS {
        Ok(())
    } else {
        Err(ApiError::ServerRejected { code, message: msg })
    }
}

#[async_trait]
impl AccessApi for HttpAccessApi {
    async fn login(&self, account: &str, password: &str) -> Result<LoginReply, ApiError> {
        let url = construct_api_url(&self.control_url, LOGIN_ENDPOINT);
        let request = LoginRequest {
            user_acct: account,
            password,
        };
        let envelope: LoginEnvelope = self.post_json(url, Some(&request), None).await?;
        ensure_success(envelope.code, envelope.msg)?;
        Ok(LoginReply {
            token: envelope.token,
            user_id: envelope.user_id,
        })
    }

    async fn fetch_policy(&self, auth: &AuthContext) -> Result<ServerPolicy, ApiError> {
        let url = construct_api_url(&self.app_url, POLICY_ENDPOINT);
        self.post_json::<(), ServerPolicy>(url, None, Some(auth))
            .await
    }

    async fn fetch_quota(&self, auth: &AuthContext) -> Result<QuotaSnapshot, ApiError> {
        let url = construct_api_url(&self.control_url, QUOTA_READ_ENDPOINT);
        let request = QuotaRequest {
            user_id: auth.user_id.as_deref(),
            token: auth.token.as_deref(),
            tier: None,
        };
        let envelope: QuotaEnvelope = self.post_json(url, Some(&request), None).await?;
        ensure_success(envelope.code, envelope.msg)?;
        Ok(QuotaSnapshot {
            standard_remaining: envelope.standard_remaining,
            premium_remaining: envelope.premium_remaining,
        })
    }

    async fn consume_quota(
        &self,
        auth: &AuthContext,
        tier: Tier,
    ) -> Result<QuotaSnapshot, ApiError> {
        let url = construct_api_url(&self.control_url, QUOTA_CONSUME_ENDPOINT);
        let request = QuotaRequest {
            user_id: auth.user_id.as_deref(),
            token: auth.token.as_deref(),
            tier: Some(tier.wire_name()),
        };
        let envelope: QuotaEnvelope = self.post_json(url, Some(&request), None).await?;
        ensure_success(envelope.code, envelope.msg)?;
        Ok(QuotaSnapshot {
            standard_remaining: envelope.standard_remaining,
            premium_remaining: envelope.premium_remaining,
        })
    }
}

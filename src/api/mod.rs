//! Control-plane wire payloads and the transport seam.
//!
//! [`AccessApi`] abstracts the four remote operations this crate performs
//! (login, policy fetch, quota read, quota consume) so the core can be
//! exercised against a scripted fake in tests. [`client::HttpAccessApi`]
//! is the production implementation.

use crate::core::quota::Tier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;

pub mod client;

/// Status code the control plane uses to signal success in its envelopes.
pub const CODE_SUCCESS: i64 = 200;

/// Credentials attached to control-plane requests, snapshotted from the
/// session at call time.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub token: Option<String>,
    pub access_code: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub user_acct: &'a str,
    pub password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEnvelope {
    pub code: i64,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub msg: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRequest<'a> {
    pub user_id: Option<&'a str>,
    pub token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaEnvelope {
    pub code: i64,
    #[serde(default)]
    pub standard_remaining: String,
    #[serde(default)]
    pub premium_remaining: String,
    #[serde(default)]
    pub msg: String,
}

/// Remaining-usage counters as returned by the server. Display strings,
/// not necessarily numeric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub standard_remaining: String,
    pub premium_remaining: String,
}

/// Identity returned by a successful login.
#[derive(Debug, Clone)]
pub struct LoginReply {
    pub token: String,
    pub user_id: String,
}

/// Free-form policy object served by the hosting deployment. Absent fields
/// leave the client's prior values untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerPolicy {
    pub need_code: Option<bool>,
    pub hide_user_key: Option<bool>,
    pub enable_premium: Option<bool>,
    pub greeting: Option<String>,
}

/// Failures observed when talking to the control plane.
#[derive(Debug)]
pub enum ApiError {
    /// Transport-level failure; the request may never have reached the
    /// server.
    Network(reqwest::Error),

    /// The server answered with a non-success code. `message` is the
    /// server-supplied text, surfaced to users verbatim.
    ServerRejected { code: i64, message: String },

    /// The response body could not be parsed.
    MalformedResponse(serde_json::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(source) => write!(f, "Request failed: {source}"),
            // The server message is what users are meant to see.
            ApiError::ServerRejected { message, .. } => write!(f, "{message}"),
            ApiError::MalformedResponse(source) => {
                write!(f, "Failed to parse server response: {source}")
            }
        }
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ApiError::Network(source) => Some(source),
            ApiError::ServerRejected { .. } => None,
            ApiError::MalformedResponse(source) => Some(source),
        }
    }
}

/// The four remote operations behind the access layer.
#[async_trait]
pub trait AccessApi: Send + Sync {
    /// Exchange account credentials for a session token.
    async fn login(&self, account: &str, password: &str) -> Result<LoginReply, ApiError>;

    /// Fetch server policy. Carries current auth headers, no body.
    async fn fetch_policy(&self, auth: &AuthContext) -> Result<ServerPolicy, ApiError>;

    /// Read remaining counts for both tiers.
    async fn fetch_quota(&self, auth: &AuthContext) -> Result<QuotaSnapshot, ApiError>;

    /// Report one unit of `tier` usage spent; returns the updated counts.
    async fn consume_quota(&self, auth: &AuthContext, tier: Tier)
        -> Result<QuotaSnapshot, ApiError>;
}

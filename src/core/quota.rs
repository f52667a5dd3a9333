//! Per-tier usage tracking.
//!
//! Quota is server-authoritative: the client never decrements a counter
//! locally. Both operations post to the control plane and, on success,
//! overwrite the session's counters with whatever the server returned, so
//! the displayed remainder cannot drift from the true one.

use crate::api::{AccessApi, QuotaSnapshot};
use crate::core::session::Session;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A named model-usage class with its own quota counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    Premium,
}

impl Tier {
    /// Name the control plane uses for this tier.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Tier::Standard),
            "premium" => Ok(Tier::Premium),
            other => Err(format!(
                "Unknown tier '{other}'. Expected 'standard' or 'premium'."
            )),
        }
    }
}

/// Queries and decrements per-tier usage counters via the control plane.
pub struct QuotaTracker {
    api: Arc<dyn AccessApi>,
    session: Arc<Session>,
}

impl QuotaTracker {
    pub fn new(api: Arc<dyn AccessApi>, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    /// Fetch current remaining counts for both tiers and store them in the
    /// session. On rejection the session is left untouched and the server's
    /// error payload is returned to the caller.
    pub async fn refresh(&self) -> Result<QuotaSnapshot, Box<dyn std::error::Error>> {
        let auth = self.session.auth_context();
        let quota = self.api.fetch_quota(&auth).await?;
        self.session.set_quota(&quota)?;
        Ok(quota)
    }

    /// Report one unit of `tier` usage spent. The server's updated counts
    /// overwrite the session; an action gated on this call is complete only
    /// once it returns `Ok`. On rejection the caller decides whether to
    /// block the gated action.
    pub async fn consume(&self, tier: Tier) -> Result<QuotaSnapshot, Box<dyn std::error::Error>> {
        let auth = self.session.auth_context();
        let quota = self.api.consume_quota(&auth, tier).await?;
        tracing::debug!(tier = %tier, standard = %quota.standard_remaining, premium = %quota.premium_remaining, "quota consumed");
        self.session.set_quota(&quota)?;
        Ok(quota)
    }
}

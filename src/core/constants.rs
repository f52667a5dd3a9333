//! Shared constants used across the application

/// Upstream API host used when the client talks to the model service
/// directly (static exports have no hosting proxy to route through).
pub const DIRECT_API_HOST: &str = "https://api.openai.com";

/// Relative proxy path served by the hosting deployment. Hosted builds
/// default to this so model traffic stays on the app origin.
pub const HOSTED_PROXY_PATH: &str = "/api/openai/";

/// Base URL of the control plane that owns accounts, quota, and policy.
pub const DEFAULT_CONTROL_URL: &str = "https://control.chatgate.dev/api";

/// Origin of the hosted app; the policy endpoint lives under it.
pub const DEFAULT_APP_URL: &str = "https://chat.chatgate.dev";

/// Policy endpoint path, relative to the app origin.
pub const POLICY_ENDPOINT: &str = "api/config";

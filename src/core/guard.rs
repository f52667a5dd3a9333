//! Route guard mapping session state to a navigation decision.
//!
//! The guard is a pure function over the target route and a session
//! snapshot; it performs no I/O and triggers no sync. It must be evaluated
//! against a rehydrated session — [`crate::core::session::Session::open`]
//! loads the persisted blob before a snapshot can exist, which is what
//! prevents the transient redirect-to-login flash on restart.

use crate::core::session::SessionState;

/// Named navigation targets of the surrounding application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Chat,
    Login,
    Auth,
    Settings,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Chat => "/chat",
            Route::Login => "/login",
            Route::Auth => "/auth",
            Route::Settings => "/settings",
        }
    }

    pub fn from_path(path: &str) -> Option<Route> {
        match path {
            "/" => Some(Route::Home),
            "/chat" => Some(Route::Chat),
            "/login" => Some(Route::Login),
            "/auth" => Some(Route::Auth),
            "/settings" => Some(Route::Settings),
            _ => None,
        }
    }
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectToLogin,
    RedirectToAuth,
}

/// Decide whether navigating to `route` may proceed.
pub fn evaluate(route: Route, state: &SessionState) -> RouteDecision {
    // The login page itself is always reachable; anything else would loop.
    if route == Route::Login {
        return RouteDecision::Allow;
    }
    if state.token.is_none() && state.user_id.is_none() {
        return RouteDecision::RedirectToLogin;
    }
    if route == Route::Auth {
        return RouteDecision::Allow;
    }
    // Identified but not yet cleared by access control: collect the code.
    if state.token.is_none() && state.access_code.is_none() && state.need_code {
        return RouteDecision::RedirectToAuth;
    }
    RouteDecision::Allow
}

/// Path-based variant of [`evaluate`]. Unknown paths are guarded like the
/// home route.
pub fn evaluate_path(path: &str, state: &SessionState) -> RouteDecision {
    evaluate(Route::from_path(path).unwrap_or(Route::Home), state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anonymous() -> SessionState {
        SessionState::default()
    }

    fn logged_in() -> SessionState {
        SessionState {
            token: Some("T".to_string()),
            user_id: Some("42".to_string()),
            ..SessionState::default()
        }
    }

    #[test]
    fn anonymous_chat_navigation_redirects_to_login() {
        assert_eq!(
            evaluate_path("/chat", &anonymous()),
            RouteDecision::RedirectToLogin
        );
    }

    #[test]
    fn login_route_always_allows() {
        assert_eq!(evaluate_path("/login", &anonymous()), RouteDecision::Allow);
        assert_eq!(evaluate_path("/login", &logged_in()), RouteDecision::Allow);
    }

    #[test]
    fn token_holder_reaches_chat_and_settings() {
        assert_eq!(evaluate(Route::Chat, &logged_in()), RouteDecision::Allow);
        assert_eq!(evaluate(Route::Settings, &logged_in()), RouteDecision::Allow);
    }

    #[test]
    fn identified_session_without_code_is_sent_to_the_code_page() {
        let state = SessionState {
            user_id: Some("42".to_string()),
            ..SessionState::default()
        };
        assert_eq!(evaluate(Route::Chat, &state), RouteDecision::RedirectToAuth);
        // The code page itself must stay reachable.
        assert_eq!(evaluate(Route::Auth, &state), RouteDecision::Allow);
    }

    #[test]
    fn disabled_access_control_clears_an_identified_session() {
        let state = SessionState {
            user_id: Some("42".to_string()),
            need_code: false,
            ..SessionState::default()
        };
        assert_eq!(evaluate(Route::Chat, &state), RouteDecision::Allow);
    }

    #[test]
    fn unknown_paths_are_guarded() {
        assert_eq!(
            evaluate_path("/masks", &anonymous()),
            RouteDecision::RedirectToLogin
        );
    }
}

//! Route gating.
//!
//! [`decide`] is a pure function of the session snapshot and the roles a
//! route requires. It never touches the network: the role it checks is the
//! one decoded from the token, available as soon as the session is.
//!
//! [`RoutePolicy`] maps URL paths to required roles for the two back-offices
//! (`/admin`, `/client`) and the signed-in-only pages.

use shopfront_core::{Role, RoleSet};

use super::{SessionSnapshot, SessionState};

/// What to do with a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardDecision {
    /// Show the route.
    Render,
    /// No session: send the user to the login page.
    RedirectLogin,
    /// Signed in with the wrong role: send the user home.
    RedirectHome,
    /// The identity is not resolved yet.
    ShowLoading,
}

impl GuardDecision {
    /// Where to navigate instead, if anywhere.
    #[must_use]
    pub fn redirect_target(self, policy: &RoutePolicy) -> Option<&str> {
        match self {
            Self::RedirectLogin => Some(&policy.login_path),
            Self::RedirectHome => Some(&policy.home_path),
            Self::Render | Self::ShowLoading => None,
        }
    }
}

/// Decide whether a route requiring `required` may render for `session`.
#[must_use]
pub fn decide(session: &SessionSnapshot, required: &RoleSet) -> GuardDecision {
    match (session.state, &session.identity) {
        (SessionState::Anonymous, _) => GuardDecision::RedirectLogin,
        (SessionState::Pending | SessionState::Authenticated, None) => GuardDecision::ShowLoading,
        (SessionState::Pending | SessionState::Authenticated, Some(identity)) => {
            if required.admits(identity.role) {
                GuardDecision::Render
            } else {
                GuardDecision::RedirectHome
            }
        }
    }
}

/// A protected path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProtectedPrefix {
    prefix: String,
    roles: RoleSet,
}

/// Maps paths to the roles allowed to view them.
///
/// Paths not covered by any prefix are public and always render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    protected: Vec<ProtectedPrefix>,
    login_path: String,
    home_path: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::new("/login", "/")
            .protect("/admin", RoleSet::only(Role::Admin))
            .protect("/client", RoleSet::only(Role::Client))
            .protect("/account", RoleSet::any())
            .protect("/checkout", RoleSet::any())
    }
}

impl RoutePolicy {
    /// An empty policy with the given redirect targets.
    #[must_use]
    pub fn new(login_path: impl Into<String>, home_path: impl Into<String>) -> Self {
        Self {
            protected: Vec::new(),
            login_path: login_path.into(),
            home_path: home_path.into(),
        }
    }

    /// Require `roles` for `prefix` and everything below it.
    #[must_use]
    pub fn protect(mut self, prefix: impl Into<String>, roles: RoleSet) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_owned();
        self.protected.push(ProtectedPrefix { prefix, roles });
        self
    }

    /// Login page path.
    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Home page path.
    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    /// Roles required for `path`, or `None` if it is public.
    ///
    /// The longest matching prefix wins. A prefix matches whole segments
    /// only: `/admin` covers `/admin/orders` but not `/administrator`.
    #[must_use]
    pub fn required_roles(&self, path: &str) -> Option<&RoleSet> {
        let path = path.split(['?', '#']).next().unwrap_or(path);

        self.protected
            .iter()
            .filter(|p| {
                path.strip_prefix(p.prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .max_by_key(|p| p.prefix.len())
            .map(|p| &p.roles)
    }

    /// Gate a navigation to `path`.
    #[must_use]
    pub fn check(&self, path: &str, session: &SessionSnapshot) -> GuardDecision {
        self.required_roles(path)
            .map_or(GuardDecision::Render, |roles| decide(session, roles))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::session::Identity;
    use crate::session::token::{Claims, tests::token_for};

    fn identity(role: &str) -> Identity {
        Identity::from_claims(Claims::decode(&token_for("1", role)).unwrap())
    }

    fn snapshot(state: SessionState, identity: Option<Identity>) -> SessionSnapshot {
        SessionSnapshot { state, identity }
    }

    fn authenticated(role: &str) -> SessionSnapshot {
        snapshot(SessionState::Authenticated, Some(identity(role)))
    }

    fn role_sets() -> Vec<RoleSet> {
        vec![
            RoleSet::any(),
            RoleSet::only(Role::Admin),
            RoleSet::only(Role::Client),
            RoleSet::from([Role::Admin, Role::Client]),
        ]
    }

    #[test]
    fn test_admin_token_scenario() {
        let session = authenticated("admin");
        assert_eq!(
            decide(&session, &RoleSet::only(Role::Admin)),
            GuardDecision::Render
        );
        assert_eq!(
            decide(&session, &RoleSet::only(Role::Client)),
            GuardDecision::RedirectHome
        );
    }

    #[test]
    fn test_anonymous_always_redirects_to_login() {
        for roles in role_sets() {
            assert_eq!(
                decide(&SessionSnapshot::anonymous(), &roles),
                GuardDecision::RedirectLogin
            );
        }
    }

    #[test]
    fn test_unresolved_identity_shows_loading() {
        for state in [SessionState::Pending, SessionState::Authenticated] {
            for roles in role_sets() {
                assert_eq!(
                    decide(&snapshot(state, None), &roles),
                    GuardDecision::ShowLoading
                );
            }
        }
    }

    #[test]
    fn test_pending_with_identity_uses_role() {
        let session = snapshot(SessionState::Pending, Some(identity("client")));
        assert_eq!(
            decide(&session, &RoleSet::only(Role::Client)),
            GuardDecision::Render
        );
    }

    #[test]
    fn test_empty_role_set_admits_any_identity() {
        assert_eq!(
            decide(&authenticated("client"), &RoleSet::any()),
            GuardDecision::Render
        );
    }

    #[test]
    fn test_decide_is_total_and_deterministic() {
        let identities = [None, Some(identity("admin")), Some(identity("client"))];
        let mut seen = HashSet::new();

        for state in SessionState::ALL {
            for id in &identities {
                for roles in role_sets() {
                    let session = snapshot(state, id.clone());
                    let first = decide(&session, &roles);
                    assert_eq!(first, decide(&session, &roles));
                    seen.insert(first);
                }
            }
        }

        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_policy_prefix_matching() {
        let policy = RoutePolicy::default();
        assert_eq!(
            policy.required_roles("/admin/orders?page=2"),
            Some(&RoleSet::only(Role::Admin))
        );
        assert_eq!(
            policy.required_roles("/admin"),
            Some(&RoleSet::only(Role::Admin))
        );
        assert_eq!(policy.required_roles("/administrator"), None);
        assert_eq!(policy.required_roles("/products/42"), None);
        assert_eq!(policy.required_roles("/checkout"), Some(&RoleSet::any()));
    }

    #[test]
    fn test_policy_longest_prefix_wins() {
        let policy = RoutePolicy::new("/login", "/")
            .protect("/client", RoleSet::only(Role::Client))
            .protect("/client/reports/", RoleSet::only(Role::Admin));
        assert_eq!(
            policy.required_roles("/client/reports/monthly"),
            Some(&RoleSet::only(Role::Admin))
        );
        assert_eq!(
            policy.required_roles("/client/orders"),
            Some(&RoleSet::only(Role::Client))
        );
    }

    #[test]
    fn test_policy_check() {
        let policy = RoutePolicy::default();
        let anonymous = SessionSnapshot::anonymous();
        let client = authenticated("client");

        assert_eq!(policy.check("/", &anonymous), GuardDecision::Render);
        assert_eq!(
            policy.check("/client/orders", &anonymous),
            GuardDecision::RedirectLogin
        );
        assert_eq!(
            policy.check("/client/orders", &client),
            GuardDecision::Render
        );
        assert_eq!(
            policy.check("/admin/stats", &client),
            GuardDecision::RedirectHome
        );
    }

    #[test]
    fn test_redirect_targets() {
        let policy = RoutePolicy::default();
        assert_eq!(
            GuardDecision::RedirectLogin.redirect_target(&policy),
            Some("/login")
        );
        assert_eq!(
            GuardDecision::RedirectHome.redirect_target(&policy),
            Some("/")
        );
        assert_eq!(GuardDecision::Render.redirect_target(&policy), None);
        assert_eq!(GuardDecision::ShowLoading.redirect_target(&policy), None);
    }
}

//! Role-based route protection.
//!
//! A guard is a pure projection of the shared [`Session`]: [`evaluate`] maps
//! `(user, loading)` to a [`GuardState`] and [`redirect_for`] picks where an
//! unauthorized visitor should go. [`AccessGuard`] remembers the last state so
//! navigation fires once per transition, never once per re-render.
use crate::config::Routes;
use crate::models::{Session, UserType};
use crate::session::SessionStore;
use std::sync::Arc;
use tokio::sync::mpsc;

pub const ACCESS_DENIED_MESSAGE: &str = "Você não tem permissão para acessar esta área.";

/// Which protected area a guard covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Authorized iff the user is an admin.
    AdminOnly,
    /// Authorized for enterprise users and admins.
    EnterpriseArea,
}

impl AccessPolicy {
    const ALL: [AccessPolicy; 2] = [AccessPolicy::AdminOnly, AccessPolicy::EnterpriseArea];

    pub fn allows(&self, user_type: UserType) -> bool {
        match self {
            AccessPolicy::AdminOnly => user_type == UserType::Admin,
            AccessPolicy::EnterpriseArea => {
                matches!(user_type, UserType::Enterprise | UserType::Admin)
            }
        }
    }

    pub fn home<'a>(&self, routes: &'a Routes) -> &'a str {
        match self {
            AccessPolicy::AdminOnly => &routes.admin_home,
            AccessPolicy::EnterpriseArea => &routes.enterprise_home,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    DeniedNoUser,
    DeniedWrongRole,
    Authorized,
}

/// What the page should show for a guard state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView<T> {
    /// Loading placeholder; used while checking and while a redirect is pending.
    Placeholder,
    AccessDenied { message: &'static str },
    Content(T),
}

pub fn evaluate(policy: AccessPolicy, session: &Session) -> GuardState {
    if session.loading {
        return GuardState::Checking;
    }
    match session.user {
        None => GuardState::DeniedNoUser,
        Some(ref user) if policy.allows(user.user_type) => GuardState::Authorized,
        Some(_) => GuardState::DeniedWrongRole,
    }
}

/// Redirect target for the state `session` puts `policy` in, if any.
///
/// A user with the wrong role is sent to the home of another area they
/// qualify for; only when no such area exists do they go to login.
pub fn redirect_for(policy: AccessPolicy, session: &Session, routes: &Routes) -> Option<String> {
    match evaluate(policy, session) {
        GuardState::Checking | GuardState::Authorized => None,
        GuardState::DeniedNoUser => Some(routes.login.clone()),
        GuardState::DeniedWrongRole => {
            let user_type = session.user.as_ref()?.user_type;
            let target = AccessPolicy::ALL
                .iter()
                .find(|other| **other != policy && other.allows(user_type))
                .map(|other| other.home(routes))
                .unwrap_or(routes.login.as_str());
            Some(target.to_string())
        }
    }
}

/// Performs client-side navigation.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that forwards paths to the router over a channel.
#[derive(Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, path: &str) {
        if self.tx.send(path.to_string()).is_err() {
            tracing::warn!("Router gone, dropping navigation to {}", path);
        }
    }
}

pub struct AccessGuard {
    policy: AccessPolicy,
    routes: Routes,
    navigator: Arc<dyn Navigator>,
    last: Option<(GuardState, Option<String>)>,
}

impl AccessGuard {
    pub fn new(policy: AccessPolicy, routes: Routes, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            policy,
            routes,
            navigator,
            last: None,
        }
    }

    pub fn admin_only(routes: Routes, navigator: Arc<dyn Navigator>) -> Self {
        Self::new(AccessPolicy::AdminOnly, routes, navigator)
    }

    pub fn enterprise_area(routes: Routes, navigator: Arc<dyn Navigator>) -> Self {
        Self::new(AccessPolicy::EnterpriseArea, routes, navigator)
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn state(&self) -> Option<GuardState> {
        self.last.as_ref().map(|(state, _)| *state)
    }

    /// Re-evaluates against `session`. Navigates only when the state (or its
    /// redirect target) differs from the previous update.
    pub fn update(&mut self, session: &Session) -> GuardState {
        let state = evaluate(self.policy, session);
        let redirect = redirect_for(self.policy, session, &self.routes);
        let key = (state, redirect);

        if self.last.as_ref() != Some(&key) {
            tracing::debug!(
                "Guard {:?}: {:?} -> {:?}",
                self.policy,
                self.last.as_ref().map(|(s, _)| *s),
                state
            );
            if let Some(ref target) = key.1 {
                tracing::info!("Guard {:?} redirecting to {}", self.policy, target);
                self.navigator.navigate(target);
            }
            self.last = Some(key);
        }
        state
    }

    /// Updates and renders. `children` is only invoked when authorized.
    pub fn view<T>(&mut self, session: &Session, children: impl FnOnce() -> T) -> GuardView<T> {
        match self.update(session) {
            GuardState::Authorized => GuardView::Content(children()),
            GuardState::DeniedWrongRole => GuardView::AccessDenied {
                message: ACCESS_DENIED_MESSAGE,
            },
            GuardState::Checking | GuardState::DeniedNoUser => GuardView::Placeholder,
        }
    }

    /// Follows the shared session until teardown, calling `on_state` after
    /// every change.
    pub async fn watch<F>(mut self, session: SessionStore, mut on_state: F)
    where
        F: FnMut(GuardState) + Send,
    {
        let mut changes = session.subscribe();
        let mut shutdown = session.shutdown_signal();

        loop {
            let snapshot = changes.borrow_and_update().clone();
            on_state(self.update(&snapshot));

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
        tracing::debug!("Guard {:?} stopped", self.policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNavigator {
        visits: Mutex<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, path: &str) {
            self.visits.lock().unwrap().push(path.to_string());
        }
    }

    fn user(user_type: UserType) -> User {
        User {
            id: "1".to_string(),
            email: "ana@empresa.com.br".to_string(),
            name: "Ana".to_string(),
            user_type,
            cnpj: None,
        }
    }

    #[test]
    fn test_evaluate_states() {
        let checking = Session::initial();
        let anonymous = Session::resolved(None);
        let enterprise = Session::resolved(Some(user(UserType::Enterprise)));
        let admin = Session::resolved(Some(user(UserType::Admin)));

        assert_eq!(evaluate(AccessPolicy::AdminOnly, &checking), GuardState::Checking);
        assert_eq!(evaluate(AccessPolicy::AdminOnly, &anonymous), GuardState::DeniedNoUser);
        assert_eq!(evaluate(AccessPolicy::AdminOnly, &enterprise), GuardState::DeniedWrongRole);
        assert_eq!(evaluate(AccessPolicy::AdminOnly, &admin), GuardState::Authorized);
        assert_eq!(evaluate(AccessPolicy::EnterpriseArea, &enterprise), GuardState::Authorized);
        assert_eq!(evaluate(AccessPolicy::EnterpriseArea, &admin), GuardState::Authorized);
    }

    #[test]
    fn test_checking_never_renders_children() {
        let nav = Arc::new(RecordingNavigator::default());
        let mut guard = AccessGuard::admin_only(Routes::default(), nav.clone());
        let mut rendered = false;
        let view = guard.view(&Session::initial(), || rendered = true);
        assert_eq!(view, GuardView::Placeholder);
        assert!(!rendered);
        assert!(nav.visits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_anonymous_redirects_to_login_once() {
        let nav = Arc::new(RecordingNavigator::default());
        let mut guard = AccessGuard::enterprise_area(Routes::default(), nav.clone());
        let anonymous = Session::resolved(None);

        guard.update(&Session::initial());
        for _ in 0..3 {
            assert_eq!(guard.view(&anonymous, || ()), GuardView::Placeholder);
        }
        assert_eq!(*nav.visits.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[test]
    fn test_enterprise_user_at_admin_guard_goes_to_enterprise_home() {
        let nav = Arc::new(RecordingNavigator::default());
        let mut guard = AccessGuard::admin_only(Routes::default(), nav.clone());
        let view = guard.view(&Session::resolved(Some(user(UserType::Enterprise))), || "secret");

        assert_eq!(
            view,
            GuardView::AccessDenied {
                message: ACCESS_DENIED_MESSAGE
            }
        );
        assert_eq!(*nav.visits.lock().unwrap(), vec!["/dashboard".to_string()]);
    }

    #[test]
    fn test_logout_mid_session_hides_children_same_update() {
        let nav = Arc::new(RecordingNavigator::default());
        let mut guard = AccessGuard::enterprise_area(Routes::default(), nav.clone());

        let view = guard.view(&Session::resolved(Some(user(UserType::Enterprise))), || "page");
        assert_eq!(view, GuardView::Content("page"));

        let view = guard.view(&Session::resolved(None), || "page");
        assert_eq!(view, GuardView::Placeholder);
        assert_eq!(guard.state(), Some(GuardState::DeniedNoUser));
        assert_eq!(*nav.visits.lock().unwrap(), vec!["/login".to_string()]);
    }

    #[test]
    fn test_redirect_again_after_reentering_denied_state() {
        let nav = Arc::new(RecordingNavigator::default());
        let mut guard = AccessGuard::enterprise_area(Routes::default(), nav.clone());

        guard.update(&Session::resolved(None));
        guard.update(&Session::resolved(Some(user(UserType::Enterprise))));
        guard.update(&Session::resolved(None));

        assert_eq!(nav.visits.lock().unwrap().len(), 2);
    }
}

//! Shared authentication state.
//!
//! One [`SessionStore`] is created at startup and handed to every guard,
//! poller and page that needs the current user. Clones share the same state.
//! Consumers observe changes through [`SessionStore::subscribe`]; only
//! `login`, `logout` and `refresh` mutate it.
use crate::api_client::ApiClient;
use crate::documents::is_valid_email;
use crate::errors::{AppError, ResultExt};
use crate::models::{Session, User};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, OnceCell};

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    state: watch::Sender<Session>,
    shutdown: watch::Sender<bool>,
    initialized: OnceCell<()>,
    /// Bumped by every login/logout so a slow resolution started earlier
    /// cannot overwrite a newer identity.
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(Session::initial());
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                api,
                state,
                shutdown,
                initialized: OnceCell::new(),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn current(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Flips to `true` once on teardown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Performs the one session resolution. Later calls (and concurrent ones)
    /// wait for the first and do nothing else.
    pub async fn init(&self) {
        self.inner
            .initialized
            .get_or_init(|| async {
                let epoch = self.inner.epoch.load(Ordering::SeqCst);
                let user = self.resolve_user().await;
                self.apply_if_current(epoch, user);
            })
            .await;
    }

    /// Re-reads the identity from the backend, e.g. after the profile changed.
    pub async fn refresh(&self) {
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let user = self.resolve_user().await;
        self.apply_if_current(epoch, user);
    }

    async fn resolve_user(&self) -> Option<User> {
        match self.inner.api.whoami().await.context("Session check failed") {
            Ok(Some(user)) => {
                tracing::info!("Session resolved for {} ({:?})", user.email, user.user_type);
                Some(user)
            }
            Ok(None) => {
                tracing::info!("No active session");
                None
            }
            Err(e) => {
                tracing::warn!("{}, treating as signed out", e);
                None
            }
        }
    }

    fn apply_if_current(&self, epoch: u64, user: Option<User>) {
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Discarding stale session resolution");
            return;
        }
        self.inner.state.send_replace(Session::resolved(user));
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(AppError::Validation("E-mail inválido".to_string()));
        }
        if password.is_empty() {
            return Err(AppError::Validation("Informe a senha".to_string()));
        }

        let user = self
            .inner
            .api
            .login(email, password)
            .await
            .context("Login failed")?;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner
            .state
            .send_replace(Session::resolved(Some(user.clone())));
        Ok(user)
    }

    /// Clears the user immediately, before this call returns. The returned
    /// future performs the remote logout; it may be awaited or spawned.
    /// Calling it again when already signed out is harmless.
    pub fn logout(&self) -> impl Future<Output = ()> + Send + 'static {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let previous = self.inner.state.send_replace(Session::resolved(None));
        if let Some(ref user) = previous.user {
            tracing::info!("Signing out {}", user.email);
        }

        // the tokens are taken now so a later login keeps its own
        let tokens = self.inner.api.tokens().snapshot();
        self.inner.api.tokens().clear();

        let api = self.inner.api.clone();
        async move {
            if tokens.is_empty() {
                return;
            }
            if let Err(e) = api.logout_with(tokens).await {
                tracing::warn!("Logout call failed: {}", e);
            }
        }
    }

    /// Ends the session lifecycle: signs out locally and stops every watcher.
    pub fn teardown(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.state.send_replace(Session::resolved(None));
        self.inner.api.tokens().clear();
        self.inner.shutdown.send_replace(true);
        tracing::info!("Session torn down");
    }
}

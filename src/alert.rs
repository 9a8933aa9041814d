//! Confirmation dialog state for destructive actions.
//!
//! `Closed -> Open(config) -> Confirming(config) -> Closed`, or
//! `Open -> Closed` on cancel. A failed action still closes the dialog; the
//! error is logged and not handed back to the caller.
use crate::errors::AppError;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Async action run when the user confirms.
pub type ConfirmAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), AppError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Danger,
    Warning,
    Info,
}

#[derive(Clone)]
pub struct AlertConfig {
    pub title: String,
    pub description: String,
    pub kind: AlertKind,
    pub confirm_label: String,
    pub cancel_label: String,
    pub on_confirm: ConfirmAction,
}

impl fmt::Debug for AlertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertConfig")
            .field("title", &self.title)
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("confirm_label", &self.confirm_label)
            .field("cancel_label", &self.cancel_label)
            .finish_non_exhaustive()
    }
}

impl AlertConfig {
    pub fn new<F, Fut>(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: AlertKind,
        on_confirm: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), AppError>> + Send + 'static,
    {
        Self {
            title: title.into(),
            description: description.into(),
            kind,
            confirm_label: "Confirmar".to_string(),
            cancel_label: "Cancelar".to_string(),
            on_confirm: Arc::new(move || -> BoxFuture<'static, Result<(), AppError>> {
                Box::pin(on_confirm())
            }),
        }
    }

    pub fn labels(mut self, confirm: impl Into<String>, cancel: impl Into<String>) -> Self {
        self.confirm_label = confirm.into();
        self.cancel_label = cancel.into();
        self
    }
}

#[derive(Debug, Clone)]
pub enum AlertState {
    Closed,
    Open(AlertConfig),
    Confirming(AlertConfig),
}

impl AlertState {
    pub fn is_open(&self) -> bool {
        !matches!(self, AlertState::Closed)
    }

    pub fn config(&self) -> Option<&AlertConfig> {
        match self {
            AlertState::Closed => None,
            AlertState::Open(config) | AlertState::Confirming(config) => Some(config),
        }
    }
}

struct ClosingGuard {
    state: Arc<Mutex<AlertState>>,
}

impl Drop for ClosingGuard {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if matches!(*state, AlertState::Confirming(_)) {
            *state = AlertState::Closed;
        }
    }
}

/// Shared handle to one dialog. Clones drive the same dialog.
#[derive(Clone)]
pub struct AlertModal {
    state: Arc<Mutex<AlertState>>,
}

impl Default for AlertModal {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertModal {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(AlertState::Closed)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AlertState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> AlertState {
        self.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_open()
    }

    /// True while the confirm action runs.
    pub fn is_loading(&self) -> bool {
        matches!(*self.lock(), AlertState::Confirming(_))
    }

    /// Opens the dialog, replacing any pending config.
    pub fn show_alert(&self, config: AlertConfig) {
        let mut state = self.lock();
        if matches!(*state, AlertState::Confirming(_)) {
            tracing::warn!("Ignoring show_alert while a confirmation is running");
            return;
        }
        tracing::debug!("Opening alert: {}", config.title);
        *state = AlertState::Open(config);
    }

    pub fn close_alert(&self) {
        let mut state = self.lock();
        if matches!(*state, AlertState::Confirming(_)) {
            return;
        }
        *state = AlertState::Closed;
    }

    pub async fn confirm_alert(&self) {
        let config = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, AlertState::Closed) {
                AlertState::Open(config) => {
                    *state = AlertState::Confirming(config.clone());
                    config
                }
                other => {
                    *state = other;
                    return;
                }
            }
        };

        // closes the dialog even if this future is dropped or the action panics
        let _closing = ClosingGuard {
            state: Arc::clone(&self.state),
        };
        if let Err(e) = (config.on_confirm)().await {
            tracing::error!("Confirm action '{}' failed: {}", config.title, e);
        }
    }

    /// "Delete item" preset.
    pub fn delete<F, Fut>(&self, item_name: &str, on_confirm: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.show_alert(
            AlertConfig::new(
                "Confirmar exclusão",
                format!(
                    "Tem certeza que deseja excluir {}? Esta ação não pode ser desfeita.",
                    item_name
                ),
                AlertKind::Danger,
                on_confirm,
            )
            .labels("Excluir", "Cancelar"),
        );
    }

    /// "Save changes" preset.
    pub fn edit<F, Fut>(&self, item_name: &str, on_confirm: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.show_alert(
            AlertConfig::new(
                "Confirmar alterações",
                format!("Deseja salvar as alterações em {}?", item_name),
                AlertKind::Info,
                on_confirm,
            )
            .labels("Salvar", "Cancelar"),
        );
    }

    pub fn warning<F, Fut>(&self, title: &str, description: &str, on_confirm: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), AppError>> + Send + 'static,
    {
        self.show_alert(
            AlertConfig::new(title, description, AlertKind::Warning, on_confirm)
                .labels("Continuar", "Cancelar"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_failed_confirm_still_closes() {
        let modal = AlertModal::new();
        modal.delete("o cliente", || async {
            Err(AppError::Transport(Some("falhou".to_string())))
        });
        assert!(modal.is_open());

        modal.confirm_alert().await;
        assert!(matches!(modal.state(), AlertState::Closed));
        assert!(!modal.is_loading());
    }

    #[tokio::test]
    async fn test_confirm_runs_action_once() {
        let modal = AlertModal::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        modal.edit("o produto", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        modal.confirm_alert().await;
        modal.confirm_alert().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!modal.is_open());
    }

    #[tokio::test]
    async fn test_close_ignored_while_confirming() {
        let modal = AlertModal::new();
        let (release, gate) = oneshot::channel::<()>();
        let gate = Arc::new(tokio::sync::Mutex::new(Some(gate)));
        modal.warning("Atenção", "Saldo negativo", move || {
            let gate = gate.clone();
            async move {
                if let Some(rx) = gate.lock().await.take() {
                    let _ = rx.await;
                }
                Ok(())
            }
        });

        let confirming = modal.confirm_alert();
        let observer = async {
            tokio::task::yield_now().await;
            assert!(modal.is_loading());
            modal.close_alert();
            assert!(modal.is_loading());
            // a second confirm while running is a no-op
            modal.confirm_alert().await;
            let _ = release.send(());
        };
        tokio::join!(confirming, observer);

        assert!(!modal.is_open());
        assert!(!modal.is_loading());
    }

    #[tokio::test]
    async fn test_abandoned_confirm_closes_dialog() {
        let modal = AlertModal::new();
        modal.delete("o fornecedor", || futures::future::pending::<Result<(), AppError>>());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), modal.confirm_alert()).await;
        assert!(abandoned.is_err());
        assert!(!modal.is_loading());
        assert!(!modal.is_open());

        // the dialog is usable again
        modal.warning("Atenção", "Saldo negativo", || async { Ok(()) });
        assert!(modal.is_open());
        modal.close_alert();
        assert!(!modal.is_open());
    }

    #[tokio::test]
    async fn test_panicking_action_closes_dialog() {
        let modal = AlertModal::new();
        modal.delete("a conta", || async {
            if true {
                panic!("action blew up");
            }
            Ok(())
        });

        let task = tokio::spawn({
            let modal = modal.clone();
            async move { modal.confirm_alert().await }
        });
        assert!(task.await.unwrap_err().is_panic());
        assert!(matches!(modal.state(), AlertState::Closed));
    }

    #[test]
    fn test_cancel_discards_config() {
        let modal = AlertModal::new();
        modal.delete("a categoria", || async { Ok(()) });
        match modal.state() {
            AlertState::Open(config) => {
                assert_eq!(config.kind, AlertKind::Danger);
                assert_eq!(config.confirm_label, "Excluir");
            }
            other => panic!("expected open alert, got {:?}", other),
        }
        modal.close_alert();
        assert!(modal.state().config().is_none());
    }

    #[tokio::test]
    async fn test_confirm_without_config_is_noop() {
        let modal = AlertModal::new();
        modal.confirm_alert().await;
        assert!(!modal.is_open());
    }
}

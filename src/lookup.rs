//! Form autofill hooks over the external lookup services.
//!
//! A [`SearchHook`] is bound to one form. Each call to [`SearchHook::search`]
//! normalises and validates the raw input, applies the duplicate-suppression
//! rule, calls the service and copies whatever the record carries into the
//! form. Failures are reported through the [`Notifier`] and never returned.
use crate::documents::normalize_digits;
use crate::errors::AppError;
use crate::models::FormField;
use crate::services::{CepService, CnpjService, LookupService};
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives autofilled values.
pub trait FormSink: Send + Sync {
    fn set_field(&self, field: FormField, value: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Info(String),
    Error(String),
}

/// User-visible toasts.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// When a repeated query is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Skip whenever the query equals the last issued one.
    SameValue,
    /// Skip only while the previous identical query is still running.
    SameValueWhileInFlight,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub suppression: Suppression,
    pub success_message: Option<&'static str>,
    pub not_found_message: &'static str,
}

impl SearchOptions {
    pub fn cep() -> Self {
        Self {
            suppression: Suppression::SameValue,
            success_message: None,
            not_found_message: "CEP não encontrado",
        }
    }

    pub fn cnpj() -> Self {
        Self {
            suppression: Suppression::SameValueWhileInFlight,
            success_message: Some("Dados da empresa preenchidos automaticamente"),
            not_found_message: "CNPJ não encontrado",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Input did not have the right digit count.
    Invalid,
    /// Suppressed as a repeat of the last query.
    Duplicate,
    /// Record found; this many fields were written.
    Applied(usize),
    NotFound,
    Failed(String),
    /// A newer query was issued before this one answered; result dropped.
    Stale,
}

#[derive(Debug, Default)]
struct QueryState {
    last_query: Option<String>,
    in_flight: bool,
    latest_seq: u64,
}

/// Clears `in_flight` when the latest request finishes, whichever way it exits.
struct InFlightGuard {
    state: Arc<Mutex<QueryState>>,
    seq: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if state.latest_seq == self.seq {
            state.in_flight = false;
        }
    }
}

fn lock(state: &Mutex<QueryState>) -> MutexGuard<'_, QueryState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct SearchHook<S: LookupService> {
    service: Arc<S>,
    form: Arc<dyn FormSink>,
    notifier: Arc<dyn Notifier>,
    options: SearchOptions,
    state: Arc<Mutex<QueryState>>,
}

/// Postal-code autofill for address forms.
pub type CepSearch = SearchHook<CepService>;
/// Company autofill for supplier/client forms.
pub type CnpjSearch = SearchHook<CnpjService>;

impl SearchHook<CepService> {
    pub fn new(
        service: Arc<CepService>,
        form: Arc<dyn FormSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_options(service, form, notifier, SearchOptions::cep())
    }
}

impl SearchHook<CnpjService> {
    pub fn new(
        service: Arc<CnpjService>,
        form: Arc<dyn FormSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_options(service, form, notifier, SearchOptions::cnpj())
    }
}

impl<S: LookupService> SearchHook<S> {
    pub fn with_options(
        service: Arc<S>,
        form: Arc<dyn FormSink>,
        notifier: Arc<dyn Notifier>,
        options: SearchOptions,
    ) -> Self {
        Self {
            service,
            form,
            notifier,
            options,
            state: Arc::new(Mutex::new(QueryState::default())),
        }
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).in_flight
    }

    pub fn last_query(&self) -> Option<String> {
        lock(&self.state).last_query.clone()
    }

    /// Forgets the last query so the same value may be searched again.
    pub fn reset_search(&self) {
        lock(&self.state).last_query = None;
    }

    pub async fn search(&self, raw: &str) -> SearchOutcome {
        let digits = normalize_digits(raw);
        if digits.len() != S::DIGITS {
            tracing::debug!("Ignoring {} input with {} digits", S::NAME, digits.len());
            return SearchOutcome::Invalid;
        }

        let guard = {
            let mut state = lock(&self.state);
            let repeated = state.last_query.as_deref() == Some(digits.as_str());
            let suppress = match self.options.suppression {
                Suppression::SameValue => repeated,
                Suppression::SameValueWhileInFlight => repeated && state.in_flight,
            };
            if suppress {
                tracing::debug!("Skipping repeated {} lookup for {}", S::NAME, digits);
                return SearchOutcome::Duplicate;
            }

            state.last_query = Some(digits.clone());
            state.in_flight = true;
            state.latest_seq += 1;
            InFlightGuard {
                state: Arc::clone(&self.state),
                seq: state.latest_seq,
            }
        };

        let result = self.service.lookup(&digits).await;

        if lock(&self.state).latest_seq != guard.seq {
            tracing::debug!("Discarding stale {} response for {}", S::NAME, digits);
            return SearchOutcome::Stale;
        }

        let outcome = self.apply(&digits, result);
        drop(guard);
        outcome
    }

    fn apply(&self, digits: &str, result: Result<Option<S::Record>, AppError>) -> SearchOutcome {
        match result {
            Ok(Some(record)) => {
                let fields = S::autofill(&record);
                for (field, value) in &fields {
                    self.form.set_field(*field, value);
                }
                tracing::info!("{} {} autofilled {} field(s)", S::NAME, digits, fields.len());
                if let Some(message) = self.options.success_message {
                    self.notifier
                        .notify(Notification::Success(message.to_string()));
                }
                SearchOutcome::Applied(fields.len())
            }
            Ok(None) => {
                self.notifier
                    .notify(Notification::Info(self.options.not_found_message.to_string()));
                SearchOutcome::NotFound
            }
            Err(e) if e.is_auth_expired() => {
                // the session layer owns expiry handling
                tracing::warn!("{} lookup hit an expired session", S::NAME);
                SearchOutcome::Failed(e.user_message())
            }
            Err(e) => {
                tracing::warn!("{} lookup for {} failed: {}", S::NAME, digits, e);
                let message = e.user_message();
                self.notifier.notify(Notification::Error(message.clone()));
                SearchOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct RecordingForm {
        fields: Mutex<Vec<(FormField, String)>>,
    }

    impl FormSink for RecordingForm {
        fn set_field(&self, field: FormField, value: &str) {
            self.fields.lock().unwrap().push((field, value.to_string()));
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.seen.lock().unwrap().push(notification);
        }
    }

    type Reply = Result<Option<String>, AppError>;

    /// Answers each call with the next queued reply, waiting on its gate.
    #[derive(Default)]
    struct ScriptedService {
        calls: AtomicUsize,
        replies: Mutex<VecDeque<(oneshot::Receiver<()>, Reply)>>,
    }

    impl ScriptedService {
        fn push(&self, reply: Reply) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.replies.lock().unwrap().push_back((rx, reply));
            tx
        }

        fn push_ready(&self, reply: Reply) {
            let _ = self.push(reply).send(());
        }
    }

    #[async_trait]
    impl LookupService for ScriptedService {
        type Record = String;
        const NAME: &'static str = "test";
        const DIGITS: usize = 4;

        async fn lookup(&self, _digits: &str) -> Result<Option<String>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop_front();
            let (gate, reply) = next.expect("unexpected lookup call");
            let _ = gate.await;
            reply
        }

        fn autofill(record: &String) -> Vec<(FormField, String)> {
            vec![(FormField::City, record.clone())]
        }
    }

    struct Fixture {
        service: Arc<ScriptedService>,
        form: Arc<RecordingForm>,
        notifier: Arc<RecordingNotifier>,
        hook: SearchHook<ScriptedService>,
    }

    fn fixture(options: SearchOptions) -> Fixture {
        let service = Arc::new(ScriptedService::default());
        let form = Arc::new(RecordingForm::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let hook =
            SearchHook::with_options(service.clone(), form.clone(), notifier.clone(), options);
        Fixture {
            service,
            form,
            notifier,
            hook,
        }
    }

    #[tokio::test]
    async fn test_invalid_input_is_silent() {
        let f = fixture(SearchOptions::cnpj());
        assert_eq!(f.hook.search("12-3").await, SearchOutcome::Invalid);
        assert_eq!(f.service.calls.load(Ordering::SeqCst), 0);
        assert!(!f.hook.is_loading());
        assert!(f.notifier.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_value_policy_skips_repeat_until_reset() {
        let f = fixture(SearchOptions::cep());
        f.service.push_ready(Ok(Some("Santos".to_string())));
        f.service.push_ready(Ok(Some("Santos".to_string())));

        assert_eq!(f.hook.search("12-34").await, SearchOutcome::Applied(1));
        assert_eq!(f.hook.search("1234").await, SearchOutcome::Duplicate);
        assert_eq!(f.service.calls.load(Ordering::SeqCst), 1);

        f.hook.reset_search();
        assert_eq!(f.hook.search("1234").await, SearchOutcome::Applied(1));
        assert_eq!(f.service.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_in_flight_policy_allows_repeat_after_completion() {
        let f = fixture(SearchOptions::cnpj());
        let gate = f.service.push(Ok(Some("Recife".to_string())));
        f.service.push_ready(Ok(None));

        let first = f.hook.search("1234");
        let second = async {
            tokio::task::yield_now().await;
            assert!(f.hook.is_loading());
            let repeat = f.hook.search("1234").await;
            let _ = gate.send(());
            repeat
        };
        let (first, second) = tokio::join!(first, second);
        assert_eq!(first, SearchOutcome::Applied(1));
        assert_eq!(second, SearchOutcome::Duplicate);

        assert_eq!(f.hook.search("1234").await, SearchOutcome::NotFound);
        assert_eq!(f.service.calls.load(Ordering::SeqCst), 2);
        assert!(!f.hook.is_loading());
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let f = fixture(SearchOptions::cnpj());
        let slow = f.service.push(Ok(Some("Old".to_string())));
        f.service.push_ready(Ok(Some("New".to_string())));

        let first = f.hook.search("1111");
        let second = async {
            tokio::task::yield_now().await;
            let outcome = f.hook.search("2222").await;
            let _ = slow.send(());
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, SearchOutcome::Stale);
        assert_eq!(second, SearchOutcome::Applied(1));
        assert_eq!(
            *f.form.fields.lock().unwrap(),
            vec![(FormField::City, "New".to_string())]
        );
        assert!(!f.hook.is_loading());
    }

    #[tokio::test]
    async fn test_failure_notifies_and_clears_loading() {
        let f = fixture(SearchOptions::cnpj());
        f.service
            .push_ready(Err(AppError::Transport(Some("Serviço indisponível".to_string()))));
        f.service.push_ready(Err(AppError::Transport(None)));

        assert_eq!(
            f.hook.search("1234").await,
            SearchOutcome::Failed("Serviço indisponível".to_string())
        );
        assert!(!f.hook.is_loading());

        f.hook.search("1234").await;
        let seen = f.notifier.seen.lock().unwrap();
        assert_eq!(seen[0], Notification::Error("Serviço indisponível".to_string()));
        assert_eq!(
            seen[1],
            Notification::Error(crate::errors::GENERIC_FAILURE_MESSAGE.to_string())
        );
        assert!(f.form.fields.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found_leaves_form_untouched() {
        let f = fixture(SearchOptions::cep());
        f.service.push_ready(Ok(None));

        assert_eq!(f.hook.search("9999").await, SearchOutcome::NotFound);
        assert!(f.form.fields.lock().unwrap().is_empty());
        assert_eq!(
            *f.notifier.seen.lock().unwrap(),
            vec![Notification::Info("CEP não encontrado".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancelled_search_still_clears_loading() {
        let f = fixture(SearchOptions::cnpj());
        let _gate = f.service.push(Ok(None));

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            f.hook.search("1234"),
        )
        .await;
        assert!(pending.is_err());
        assert!(!f.hook.is_loading());
    }
}

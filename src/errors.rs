use reqwest::StatusCode;
use std::fmt;

/// Message shown when a collaborator fails without telling us why.
pub const GENERIC_FAILURE_MESSAGE: &str = "Não foi possível concluir a consulta. Tente novamente.";

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Malformed input (e.g. a CEP with the wrong digit count).
    Validation(String),
    /// The collaborator answered but has no such record.
    NotFound(String),
    /// Network, status or parse failure talking to a collaborator.
    /// Carries the collaborator's own message when it sent one.
    Transport(Option<String>),
    /// 401 from an authenticated call.
    AuthExpired,
    /// 403 from an authenticated call.
    Forbidden(String),
    /// Internal invariant broken or client misconfigured.
    Internal(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Transport(Some(msg)) => write!(f, "Transport error: {}", msg),
            AppError::Transport(None) => write!(f, "Transport error"),
            AppError::AuthExpired => write!(f, "Session expired"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            AppError::Validation(msg) => AppError::Validation(msg.clone()),
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::Transport(msg) => AppError::Transport(msg.clone()),
            AppError::AuthExpired => AppError::AuthExpired,
            AppError::Forbidden(msg) => AppError::Forbidden(msg.clone()),
            AppError::Internal(msg) => AppError::Internal(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl AppError {
    /// Maps a non-success HTTP status (and the response body) onto the taxonomy.
    ///
    /// The body is inspected for a JSON `message` (or `error`) field so the
    /// collaborator's own wording can be surfaced to the user.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = extract_message(body);
        match status {
            StatusCode::UNAUTHORIZED => AppError::AuthExpired,
            StatusCode::FORBIDDEN => AppError::Forbidden(
                message.unwrap_or_else(|| "Você não tem permissão para esta ação.".to_string()),
            ),
            StatusCode::NOT_FOUND => {
                AppError::NotFound(message.unwrap_or_else(|| "Registro não encontrado".to_string()))
            }
            _ => AppError::Transport(message),
        }
    }

    /// Peels off context layers and returns the innermost error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self.root(), AppError::AuthExpired)
    }

    /// Text suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self.root() {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Transport(Some(msg)) => msg.clone(),
            AppError::Transport(None) => GENERIC_FAILURE_MESSAGE.to_string(),
            AppError::AuthExpired => "Sua sessão expirou. Faça login novamente.".to_string(),
            AppError::Forbidden(msg) => msg.clone(),
            AppError::Internal(_) => GENERIC_FAILURE_MESSAGE.to_string(),
            AppError::WithContext { .. } => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::debug!("reqwest error: {}", err);
        AppError::Transport(None)
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

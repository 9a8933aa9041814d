use crate::config::Config;
use crate::errors::AppError;
use crate::models::{AdminStats, LoginRequest, LoginResponse, User, WhoAmIResponse};
use reqwest::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use reqwest::{RequestBuilder, Response};
use std::sync::{Arc, Mutex};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Opaque bearer tokens issued by the auth service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Tokens {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }

    fn cookie_header(&self) -> Option<String> {
        let pairs: Vec<String> = [
            (ACCESS_TOKEN_COOKIE, &self.access_token),
            (REFRESH_TOKEN_COOKIE, &self.refresh_token),
        ]
        .iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| format!("{}={}", name, v)))
        .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

/// Local copy of the session cookies, shared by every clone of the client.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<Mutex<Tokens>>,
}

impl TokenStore {
    pub fn new(tokens: Tokens) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tokens)),
        }
    }

    pub fn snapshot(&self) -> Tokens {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Overwrites only the tokens that are present in `update`.
    pub fn merge(&self, update: Tokens) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if update.access_token.is_some() {
            guard.access_token = update.access_token;
        }
        if update.refresh_token.is_some() {
            guard.refresh_token = update.refresh_token;
        }
    }

    pub fn clear(&self) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Tokens::default();
    }
}

/// Client for the application's own backend (auth and admin endpoints).
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Self::with_tokens(config, Tokens::default())
    }

    /// Client seeded with tokens read from an existing cookie jar.
    pub fn with_tokens(config: &Config, tokens: Tokens) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create API client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens: TokenStore::new(tokens),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        with_credentials(builder, &self.tokens.snapshot())
    }

    async fn check(response: Response, action: &str) -> Result<Response, AppError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        tracing::warn!("{} returned {}: {}", action, status, error_text);
        Err(AppError::from_status(status, &error_text))
    }

    /// Resolves the identity behind the stored tokens.
    ///
    /// Returns `Ok(None)` without a network call when no token is stored.
    pub async fn whoami(&self) -> Result<Option<User>, AppError> {
        if self.tokens.snapshot().is_empty() {
            tracing::debug!("No session tokens stored, skipping whoami");
            return Ok(None);
        }

        let url = format!("{}/auth/me", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::Transport(Some(format!("whoami request failed: {}", e))))?;
        let response = Self::check(response, "whoami").await?;

        let body: WhoAmIResponse = response.json().await.map_err(|e| {
            AppError::Transport(Some(format!("Failed to parse whoami response: {}", e)))
        })?;
        Ok(Some(body.into_user()))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let url = format!("{}/auth/login", self.base_url);
        tracing::info!("Logging in as {}", email);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|e| AppError::Transport(Some(format!("login request failed: {}", e))))?;
        let response = Self::check(response, "login").await?;

        let cookie_tokens = tokens_from_set_cookie(&response);
        let body: LoginResponse = response.json().await.map_err(|e| {
            AppError::Transport(Some(format!("Failed to parse login response: {}", e)))
        })?;

        self.tokens.merge(cookie_tokens);
        self.tokens.merge(Tokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
        });

        tracing::info!("Logged in: {} ({:?})", body.user.email, body.user.user_type);
        Ok(body.user)
    }

    /// Asks the auth service to invalidate the session. Local tokens are
    /// cleared before the request goes out, whatever its outcome.
    pub async fn logout(&self) -> Result<(), AppError> {
        let tokens = self.tokens.snapshot();
        self.tokens.clear();
        self.logout_with(tokens).await
    }

    /// Invalidates the session identified by `tokens` without reading or
    /// touching the token store, so a login that lands in between keeps
    /// its own tokens.
    pub async fn logout_with(&self, tokens: Tokens) -> Result<(), AppError> {
        let url = format!("{}/auth/logout", self.base_url);
        let request = with_credentials(self.client.post(&url), &tokens);
        let result = match request.send().await {
            Ok(response) => Self::check(response, "logout").await.map(|_| ()),
            Err(e) => Err(AppError::Transport(Some(format!(
                "logout request failed: {}",
                e
            )))),
        };

        if let Err(ref e) = result {
            tracing::warn!("Remote logout failed, local tokens cleared anyway: {}", e);
        }
        result
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, AppError> {
        let url = format!("{}/admin/stats", self.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::Transport(Some(format!("stats request failed: {}", e))))?;
        let response = Self::check(response, "admin stats").await?;

        response.json().await.map_err(|e| {
            AppError::Transport(Some(format!("Failed to parse admin stats: {}", e)))
        })
    }
}

fn with_credentials(builder: RequestBuilder, tokens: &Tokens) -> RequestBuilder {
    let mut builder = builder;
    if let Some(ref access) = tokens.access_token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", access));
    }
    if let Some(cookie) = tokens.cookie_header() {
        builder = builder.header(COOKIE, cookie);
    }
    builder
}

fn tokens_from_set_cookie(response: &Response) -> Tokens {
    let mut tokens = Tokens::default();
    for header in response.headers().get_all(SET_COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        let Some((name, value)) = raw.split(';').next().and_then(|kv| kv.split_once('=')) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match name.trim() {
            ACCESS_TOKEN_COOKIE => tokens.access_token = Some(value.to_string()),
            REFRESH_TOKEN_COOKIE => tokens.refresh_token = Some(value.to_string()),
            _ => {}
        }
    }
    tokens
}

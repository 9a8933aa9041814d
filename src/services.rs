use crate::circuit_breaker::{
    create_lookup_circuit_breaker, guarded, Answered, LookupCircuitBreaker,
};
use crate::config::Config;
use crate::documents::{format_br_phone, format_cep, CEP_DIGITS, CNPJ_DIGITS};
use crate::errors::{AppError, ResultExt};
use crate::lookup_cache::LookupCache;
use crate::models::{AddressAutofill, CepApiResponse, CnpjApiResponse, CompanyRecord, FormField};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// An external lookup keyed by a normalised, fixed-length digit string.
///
/// `Ok(None)` means the collaborator answered but has no record for the key.
#[async_trait]
pub trait LookupService: Send + Sync {
    type Record: Clone + Send + Sync + 'static;

    /// Short name used in logs and cache keys.
    const NAME: &'static str;
    /// Exact digit count a query must have after normalisation.
    const DIGITS: usize;

    async fn lookup(&self, digits: &str) -> Result<Option<Self::Record>, AppError>;

    /// Form values carried by a record, in the order they are applied.
    fn autofill(record: &Self::Record) -> Vec<(FormField, String)>;
}

fn build_client(config: &Config, service: &str) -> Result<Client, AppError> {
    Client::builder()
        .timeout(config.http_timeout())
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create {} client: {}", service, e)))
}

async fn cached_or_fetch<T, F>(
    cache: Option<&LookupCache>,
    key: String,
    fetch: F,
) -> Result<Option<T>, AppError>
where
    T: Serialize + DeserializeOwned,
    F: std::future::Future<Output = Result<Option<T>, AppError>>,
{
    if let Some(cache) = cache {
        if let Some(hit) = cache.get::<T>(&key).await {
            return Ok(Some(hit));
        }
    }

    let fetched = fetch.await?;

    if let (Some(cache), Some(record)) = (cache, fetched.as_ref()) {
        cache.insert(&key, record).await;
    }
    Ok(fetched)
}

// ============ Postal Code (CEP) ============

pub struct CepService {
    client: Client,
    base_url: String,
    breaker: LookupCircuitBreaker,
    cache: Option<LookupCache>,
}

impl CepService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config, "CEP")?,
            base_url: config.cep_base_url.trim_end_matches('/').to_string(),
            breaker: create_lookup_circuit_breaker(),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: LookupCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Every reply is an answer here: non-2xx and malformed bodies read as
    /// "not found". Only network failures count against the breaker.
    async fn fetch(&self, cep: &str) -> Result<Answered<Option<AddressAutofill>>, AppError> {
        let url = format!("{}/{}", self.base_url, cep);
        tracing::info!("Fetching address for CEP: {}", cep);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("CEP request failed: {}", e);
                AppError::Transport(None)
            })?;

        if !response.status().is_success() {
            tracing::info!("CEP service returned {} for {}", response.status(), cep);
            return Ok(Ok(None));
        }

        let body: CepApiResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Malformed CEP response for {}: {}", cep, e);
                return Ok(Ok(None));
            }
        };

        let address = AddressAutofill {
            address: body.street,
            district: body.neighborhood,
            city: body.city,
            state: body.state,
            ..Default::default()
        };

        if address.is_empty() {
            return Ok(Ok(None));
        }
        Ok(Ok(Some(address)))
    }
}

#[async_trait]
impl LookupService for CepService {
    type Record = AddressAutofill;

    const NAME: &'static str = "cep";
    const DIGITS: usize = CEP_DIGITS;

    async fn lookup(&self, digits: &str) -> Result<Option<AddressAutofill>, AppError> {
        cached_or_fetch(self.cache.as_ref(), format!("cep:{}", digits), async {
            guarded(&self.breaker, "CEP", self.fetch(digits))
                .await
                .with_context(|| format!("CEP lookup for {}", digits))
        })
        .await
    }

    fn autofill(record: &AddressAutofill) -> Vec<(FormField, String)> {
        record
            .fields()
            .into_iter()
            .map(|(field, value)| (field, value.to_string()))
            .collect()
    }
}

// ============ Company Tax ID (CNPJ) ============

pub struct CnpjService {
    client: Client,
    base_url: String,
    breaker: LookupCircuitBreaker,
    cache: Option<LookupCache>,
}

impl CnpjService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config, "CNPJ")?,
            base_url: config.cnpj_base_url.trim_end_matches('/').to_string(),
            breaker: create_lookup_circuit_breaker(),
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: LookupCache) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn fetch(&self, cnpj: &str) -> Result<Answered<Option<CompanyRecord>>, AppError> {
        let url = format!("{}/{}", self.base_url, cnpj);
        tracing::info!("Fetching company data for CNPJ: {}", cnpj);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("CNPJ request failed: {}", e);
                AppError::Transport(None)
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!("CNPJ {} not found", cnpj);
            return Ok(Ok(None));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let error = AppError::from_status(status, &error_text);
            if status.is_client_error() {
                tracing::warn!("CNPJ service refused {}: {} {}", cnpj, status, error_text);
                return Ok(Err(error));
            }
            tracing::error!("CNPJ service returned error {}: {}", status, error_text);
            return Err(error);
        }

        let body: CnpjApiResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse CNPJ response: {}", e);
            AppError::Transport(None)
        })?;

        tracing::info!("Successfully fetched CNPJ {}", cnpj);
        Ok(Ok(Some(company_from_response(cnpj, body))))
    }
}

fn company_from_response(cnpj: &str, body: CnpjApiResponse) -> CompanyRecord {
    CompanyRecord {
        cnpj: cnpj.to_string(),
        name: body.razao_social,
        trade_name: body.nome_fantasia,
        email: body.email.map(|e| e.trim().to_lowercase()),
        phone: body.ddd_telefone_1.as_deref().and_then(format_br_phone),
        address: AddressAutofill {
            address: body.logradouro,
            number: body.numero,
            complement: body.complemento,
            district: body.bairro,
            city: body.municipio,
            state: body.uf,
            zip_code: body.cep.as_deref().map(format_cep).filter(|c| !c.is_empty()),
        },
    }
}

#[async_trait]
impl LookupService for CnpjService {
    type Record = CompanyRecord;

    const NAME: &'static str = "cnpj";
    const DIGITS: usize = CNPJ_DIGITS;

    async fn lookup(&self, digits: &str) -> Result<Option<CompanyRecord>, AppError> {
        cached_or_fetch(self.cache.as_ref(), format!("cnpj:{}", digits), async {
            guarded(&self.breaker, "CNPJ", self.fetch(digits))
                .await
                .with_context(|| format!("CNPJ lookup for {}", digits))
        })
        .await
    }

    fn autofill(record: &CompanyRecord) -> Vec<(FormField, String)> {
        record
            .fields()
            .into_iter()
            .map(|(field, value)| (field, value.to_string()))
            .collect()
    }
}

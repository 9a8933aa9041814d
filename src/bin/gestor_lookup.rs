//! Command-line CEP/CNPJ lookup, printing the fields a form would receive.
//!
//! Usage: `gestor-lookup cep 01310-100` or `gestor-lookup cnpj 11.222.333/0001-81`

use gestor_web::config::Config;
use gestor_web::documents::{format_cnpj, is_valid_cnpj};
use gestor_web::lookup::{CepSearch, CnpjSearch, FormSink, Notification, Notifier, SearchOutcome};
use gestor_web::lookup_cache::LookupCache;
use gestor_web::models::FormField;
use gestor_web::services::{CepService, CnpjService};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Default)]
struct JsonForm {
    fields: Mutex<Map<String, Value>>,
}

impl FormSink for JsonForm {
    fn set_field(&self, field: FormField, value: &str) {
        if let Ok(mut fields) = self.fields.lock() {
            fields.insert(field.as_str().to_string(), Value::String(value.to_string()));
        }
    }
}

struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Success(msg) | Notification::Info(msg) => tracing::info!("{}", msg),
            Notification::Error(msg) => tracing::error!("{}", msg),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gestor_web=debug,gestor_lookup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (kind, query) = match args.as_slice() {
        [kind, query] => (kind.as_str(), query.as_str()),
        _ => anyhow::bail!("usage: gestor-lookup <cep|cnpj> <value>"),
    };

    let config = Config::from_env()?;
    let cache = LookupCache::new(config.lookup_cache_ttl());
    let form = Arc::new(JsonForm::default());
    let notifier = Arc::new(LogNotifier);

    let outcome = match kind {
        "cep" => {
            let service = CepService::new(&config)?.with_cache(cache);
            CepSearch::new(Arc::new(service), form.clone(), notifier)
                .search(query)
                .await
        }
        "cnpj" => {
            if !is_valid_cnpj(query) {
                tracing::warn!("{} has invalid check digits", format_cnpj(query));
            }
            let service = CnpjService::new(&config)?.with_cache(cache);
            CnpjSearch::new(Arc::new(service), form.clone(), notifier)
                .search(query)
                .await
        }
        other => anyhow::bail!("unknown lookup kind '{}', expected cep or cnpj", other),
    };

    match outcome {
        SearchOutcome::Applied(_) => {
            let fields = form
                .fields
                .lock()
                .map(|f| f.clone())
                .map_err(|_| anyhow::anyhow!("form state poisoned"))?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(fields))?);
            Ok(())
        }
        SearchOutcome::Invalid => anyhow::bail!("'{}' is not a valid {}", query, kind),
        SearchOutcome::NotFound => anyhow::bail!("{} {} not found", kind, query),
        SearchOutcome::Failed(msg) => anyhow::bail!(msg),
        SearchOutcome::Duplicate | SearchOutcome::Stale => Ok(()),
    }
}

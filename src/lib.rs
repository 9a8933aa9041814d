//! Gestor Web client core
//!
//! Headless core of the financial management front-end: session state,
//! role-based route guards, CEP/CNPJ autofill hooks, the confirmation dialog
//! and the admin statistics poller. Pages and forms plug in through the
//! `Navigator`, `FormSink` and `Notifier` traits.
//!
//! # Modules
//!
//! - `alert`: Confirmation dialog state machine.
//! - `api_client`: Backend client (auth and admin endpoints) and token store.
//! - `circuit_breaker`: Circuit breaker around external lookups.
//! - `config`: Configuration management.
//! - `documents`: CEP/CNPJ/phone normalisation, masks and validation.
//! - `errors`: Error handling types.
//! - `guard`: Access guards for protected areas.
//! - `lookup`: CEP and CNPJ search hooks.
//! - `lookup_cache`: Checksummed TTL cache for lookup results.
//! - `models`: Core data models.
//! - `services`: External lookup services (CEP, CNPJ).
//! - `session`: Shared session state.
//! - `stats`: Admin statistics poller.

pub mod alert;
pub mod api_client;
pub mod circuit_breaker;
pub mod config;
pub mod documents;
pub mod errors;
pub mod guard;
pub mod lookup;
pub mod lookup_cache;
pub mod models;
pub mod services;
pub mod session;
pub mod stats;

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// A serialized lookup record sealed with a SHA-256 digest of its cache key
/// and payload. The key is part of the digest so an entry copied under
/// another document number does not verify either.
#[derive(Debug, Clone)]
struct SealedRecord {
    payload: String,
    digest: [u8; 32],
}

impl SealedRecord {
    fn seal(key: &str, payload: String) -> Self {
        let digest = digest_of(key, &payload);
        Self { payload, digest }
    }

    fn open(&self, key: &str) -> Option<&str> {
        let expected = digest_of(key, &self.payload);
        if expected == self.digest {
            return Some(&self.payload);
        }
        tracing::warn!(
            "Lookup cache entry {} failed verification (stored {}, computed {})",
            key,
            hex::encode(&self.digest[..8]),
            hex::encode(&expected[..8])
        );
        None
    }
}

fn digest_of(key: &str, payload: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.as_bytes());
    hasher.finalize().into()
}

/// Shared TTL cache for successful CEP/CNPJ lookups.
///
/// Keys are namespaced by lookup kind: `cep:{digits}` or `cnpj:{digits}`.
/// An entry that fails verification or no longer parses is evicted and
/// reported as a miss, so the caller refetches.
#[derive(Clone)]
pub struct LookupCache {
    inner: Cache<String, Arc<SealedRecord>>,
}

impl LookupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(10_000)
                .build(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let sealed = self.inner.get(key).await?;
        match sealed
            .open(key)
            .and_then(|payload| serde_json::from_str(payload).ok())
        {
            Some(value) => {
                tracing::debug!("Lookup cache hit: {}", key);
                Some(value)
            }
            None => {
                self.inner.invalidate(key).await;
                None
            }
        }
    }

    pub async fn insert<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(payload) => {
                let sealed = SealedRecord::seal(key, payload);
                self.inner.insert(key.to_string(), Arc::new(sealed)).await;
            }
            Err(e) => tracing::warn!("Skipping cache insert for {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AddressAutofill;

    fn santos() -> AddressAutofill {
        AddressAutofill {
            city: Some("Santos".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cache_hit() {
        let cache = LookupCache::new(Duration::from_secs(60));
        cache.insert("cep:11010000", &santos()).await;

        let hit: Option<AddressAutofill> = cache.get("cep:11010000").await;
        assert_eq!(hit, Some(santos()));
        let other: Option<AddressAutofill> = cache.get("cep:11010001").await;
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn test_tampered_payload_is_evicted() {
        let cache = LookupCache::new(Duration::from_secs(60));
        let mut sealed = SealedRecord::seal("cep:50000000", r#"{"city":"Recife"}"#.to_string());
        sealed.payload = r#"{"city":"Olinda"}"#.to_string();
        cache
            .inner
            .insert("cep:50000000".to_string(), Arc::new(sealed))
            .await;

        let miss: Option<AddressAutofill> = cache.get("cep:50000000").await;
        assert_eq!(miss, None);
        assert!(cache.inner.get("cep:50000000").await.is_none());
    }

    #[tokio::test]
    async fn test_entry_moved_to_another_key_is_rejected() {
        let cache = LookupCache::new(Duration::from_secs(60));
        let sealed = SealedRecord::seal("cep:11010000", serde_json::to_string(&santos()).unwrap());
        cache
            .inner
            .insert("cep:01310100".to_string(), Arc::new(sealed))
            .await;

        let miss: Option<AddressAutofill> = cache.get("cep:01310100").await;
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_unparseable_payload_is_a_miss() {
        let cache = LookupCache::new(Duration::from_secs(60));
        cache.insert("cnpj:11222333000181", &"just a string").await;

        let miss: Option<AddressAutofill> = cache.get("cnpj:11222333000181").await;
        assert_eq!(miss, None);
    }
}

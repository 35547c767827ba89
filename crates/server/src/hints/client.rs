//! HTTP client for the product metadata resolver.
//!
//! Per-tenant bearer credentials, a hard per-request timeout, bounded retries
//! with jittered backoff on transient failures, and a TTL cache so repeated
//! shortfalls on the same product do not hammer the resolver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;
use url::Url;

use lotwise_core::{ProductHints, Tenant};

use super::{HintError, HintResolver};
use crate::config::ResolverConfig;

/// Base backoff between retry attempts; doubles per attempt, plus jitter.
const BASE_BACKOFF_MS: u64 = 100;

/// Metadata resolver API client.
#[derive(Clone)]
pub struct HttpHintResolver {
    inner: Arc<HttpHintResolverInner>,
}

struct HttpHintResolverInner {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    max_retries: u32,
    /// Tenant name -> bearer token.
    tokens: HashMap<String, SecretString>,
    /// (tenant, product) -> hints, expired by TTL.
    cache: Cache<(String, String), ProductHints>,
}

impl HttpHintResolver {
    /// Create a resolver client from configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created. This should never happen
    /// under normal circumstances as we use standard TLS configuration.
    #[must_use]
    pub fn new(config: &ResolverConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            inner: Arc::new(HttpHintResolverInner {
                client,
                endpoint: config.endpoint.clone(),
                timeout: config.timeout,
                max_retries: config.max_retries,
                tokens: config.tokens.clone(),
                cache: Cache::builder()
                    .max_capacity(10_000)
                    .time_to_live(config.cache_ttl)
                    .build(),
            }),
        }
    }

    /// URL of the hints endpoint for one product.
    fn hints_url(&self, external_product_id: &str) -> Result<Url, HintError> {
        let mut url = self.inner.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| HintError::InvalidEndpoint)?
            .pop_if_empty()
            .extend(["products", external_product_id, "hints"]);
        Ok(url)
    }

    /// One fetch including retries on transient failures.
    async fn fetch(
        &self,
        tenant: &Tenant,
        external_product_id: &str,
    ) -> Result<ProductHints, HintError> {
        let token = self
            .inner
            .tokens
            .get(tenant.as_str())
            .ok_or_else(|| HintError::UnknownTenant(tenant.to_string()))?;
        let url = self.hints_url(external_product_id)?;

        let mut attempt = 0;
        loop {
            let result = self
                .inner
                .client
                .get(url.clone())
                .bearer_auth(token.expose_secret())
                .timeout(self.inner.timeout)
                .send()
                .await;

            let err = match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        // A malformed body is "no hint available", not a failure.
                        return Ok(response.json::<ProductHints>().await.unwrap_or_else(|err| {
                            tracing::warn!(
                                external_product_id,
                                error = %err,
                                "malformed resolver response, treating as no hints"
                            );
                            ProductHints::default()
                        }));
                    }
                    if status.is_client_error() {
                        // Unknown product, revoked scope, etc. - no hints.
                        return Ok(ProductHints::default());
                    }
                    HintError::Status(status)
                }
                Err(err) => HintError::Transport(err),
            };

            if attempt >= self.inner.max_retries {
                return Err(err);
            }
            attempt += 1;
            let backoff = backoff_with_jitter(attempt);
            tracing::debug!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "resolver call failed, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

#[async_trait]
impl HintResolver for HttpHintResolver {
    #[instrument(skip(self), fields(tenant = %tenant))]
    async fn resolve(
        &self,
        tenant: &Tenant,
        external_product_id: &str,
    ) -> Result<ProductHints, HintError> {
        let key = (tenant.as_str().to_string(), external_product_id.to_string());
        if let Some(hit) = self.inner.cache.get(&key).await {
            return Ok(hit);
        }

        let hints = self.fetch(tenant, external_product_id).await?;
        self.inner.cache.insert(key, hints).await;
        Ok(hints)
    }
}

/// Exponential backoff with a random jitter component.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = BASE_BACKOFF_MS << attempt.min(4);
    let jitter = rand::rng().random_range(0..BASE_BACKOFF_MS / 2);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver_with_tokens(tokens: &[(&str, &str)]) -> HttpHintResolver {
        let config = ResolverConfig {
            endpoint: Url::parse("https://resolver.example.com/v1").expect("url"),
            timeout: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(60),
            max_retries: 0,
            tokens: tokens
                .iter()
                .map(|(tenant, token)| ((*tenant).to_string(), SecretString::from(*token)))
                .collect(),
        };
        HttpHintResolver::new(&config)
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_an_error_without_network() {
        let resolver = resolver_with_tokens(&[("acme", "token-1")]);
        let result = resolver.resolve(&Tenant::new("other"), "p-1").await;
        assert!(matches!(result, Err(HintError::UnknownTenant(_))));
    }

    #[test]
    fn test_hints_url_encodes_product_id() {
        let resolver = resolver_with_tokens(&[]);
        let url = resolver.hints_url("gid://platform/Product/42").expect("url");
        assert_eq!(
            url.as_str(),
            "https://resolver.example.com/v1/products/gid:%2F%2Fplatform%2FProduct%2F42/hints"
        );
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let first = backoff_with_jitter(1);
        let fourth = backoff_with_jitter(4);
        assert!(first >= Duration::from_millis(BASE_BACKOFF_MS * 2));
        assert!(fourth >= Duration::from_millis(BASE_BACKOFF_MS * 16));
    }
}

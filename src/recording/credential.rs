use crate::error::SttError;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type FetchFn = dyn Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync;

/// API credential: a literal key or an async function returning one
/// (e.g. a temporary key minted by the application's backend).
#[derive(Clone)]
pub enum ApiKey {
    Static(String),
    Fetch(Arc<FetchFn>),
}

impl ApiKey {
    pub fn fetch<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        ApiKey::Fetch(Arc::new(move || f().boxed()))
    }

    /// Produce the key. Empty keys and fetch failures are auth errors.
    pub async fn resolve(&self) -> Result<String, SttError> {
        let key = match self {
            ApiKey::Static(key) => key.clone(),
            ApiKey::Fetch(fetch) => fetch()
                .await
                .map_err(|e| SttError::auth(format!("Failed to resolve API key: {:#}", e)))?,
        };
        if key.trim().is_empty() {
            return Err(SttError::auth("API key is empty"));
        }
        Ok(key)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKey::Static(_) => f.write_str("ApiKey::Static(<redacted>)"),
            ApiKey::Fetch(_) => f.write_str("ApiKey::Fetch(..)"),
        }
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        ApiKey::Static(key)
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        ApiKey::Static(key.to_string())
    }
}

//! Token refresh for drivers that authenticate with access/refresh token pairs
//!
//! An operation that fails with an empty or expired token gets exactly one
//! re-authentication. New credentials are persisted through the
//! [`ConfigStore`] before the operation is retried. Refreshes are serialized
//! and calls rejected with the same token share one exchange.

use crate::storage::registry::StorageConfig;
use crate::storage::store::ConfigStore;
use crate::{GatewayError, ResultExt};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";

/// A credential pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    /// Token sent with API calls
    pub access_token: String,

    /// Token exchanged for a new pair
    pub refresh_token: String,
}

/// Exchanges a refresh token for new credentials
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Request a new token pair
    async fn refresh(&self, refresh_token: &str) -> crate::Result<Tokens>;
}

/// Holds a storage's credentials and refreshes them on demand
pub struct TokenManager<P: TokenProvider> {
    provider: P,
    store: Arc<dyn ConfigStore>,
    config: RwLock<StorageConfig>,
}

impl<P: TokenProvider> TokenManager<P> {
    /// Create a manager over a stored configuration
    pub fn new(provider: P, store: Arc<dyn ConfigStore>, config: StorageConfig) -> Self {
        Self {
            provider,
            store,
            config: RwLock::new(config),
        }
    }

    /// Current access token
    pub async fn access_token(&self) -> String {
        self.field(ACCESS_TOKEN).await
    }

    /// Current refresh token
    pub async fn refresh_token(&self) -> String {
        self.field(REFRESH_TOKEN).await
    }

    async fn field(&self, name: &str) -> String {
        let config = self.config.read().await;
        config
            .addition
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Obtain and persist a new token pair
    pub async fn refresh(&self) -> crate::Result<Tokens> {
        let mut config = self.config.write().await;
        self.exchange(&mut config).await
    }

    /// Refresh unless another call already replaced `rejected`
    async fn refresh_if_current(&self, rejected: &str) -> crate::Result<()> {
        let mut config = self.config.write().await;
        let current = config
            .addition
            .get(ACCESS_TOKEN)
            .and_then(Value::as_str)
            .unwrap_or_default();
        if current != rejected {
            debug!("Credentials of {} already refreshed", config.mount_path);
            return Ok(());
        }
        self.exchange(&mut config).await.map(|_| ())
    }

    /// Exchange the refresh token held in `config`; the caller holds the
    /// write lock for the whole exchange
    async fn exchange(&self, config: &mut StorageConfig) -> crate::Result<Tokens> {
        let current = config
            .addition
            .get(REFRESH_TOKEN)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let tokens = self.provider.refresh(&current).await?;
        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(GatewayError::EmptyToken);
        }

        let mut updated = config.clone();
        let mut addition = match updated.addition {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        addition.insert(ACCESS_TOKEN.to_string(), Value::from(tokens.access_token.clone()));
        addition.insert(REFRESH_TOKEN.to_string(), Value::from(tokens.refresh_token.clone()));
        updated.addition = Value::Object(addition);

        self.store
            .update(&updated)
            .await
            .with_context(|| format!("failed to save refreshed credentials of {}", updated.mount_path))?;
        *config = updated;
        info!("Refreshed credentials for storage {}", config.mount_path);
        Ok(tokens)
    }

    /// Run `op` with the access token, refreshing once if the token is rejected
    pub async fn call<T, F, Fut>(&self, op: F) -> crate::Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        let token = self.access_token().await;
        match op(token.clone()).await {
            Err(e) if e.is_token_invalid() => {
                warn!("Token rejected ({}), refreshing once", e);
                self.refresh_if_current(&token).await?;
                op(self.access_token().await).await
            }
            other => other,
        }
    }
}

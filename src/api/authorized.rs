use std::sync::Arc;

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{decode, ApiClient, ApiError, Error, Payload, RequestOptions};
use crate::auth::{refresh::RefreshCoordinator, TokenProviderRegistry};

/// Client for calls made on behalf of the signed-in user.
///
/// A 401 triggers one token refresh through the shared [`RefreshCoordinator`]
/// followed by exactly one retry; a second 401 ends the session.
#[derive(Clone)]
pub struct AuthorizedClient {
    client: ApiClient,
    registry: TokenProviderRegistry,
    refresher: Arc<RefreshCoordinator>,
}

impl AuthorizedClient {
    pub fn new(client: ApiClient, registry: TokenProviderRegistry) -> Self {
        let refresher = Arc::new(RefreshCoordinator::new(client.clone()));
        Self::with_refresher(client, registry, refresher)
    }

    pub fn with_refresher(
        client: ApiClient,
        registry: TokenProviderRegistry,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            client,
            registry,
            refresher,
        }
    }

    pub fn registry(&self) -> &TokenProviderRegistry {
        &self.registry
    }

    async fn send(
        &self,
        path: &str,
        token: &str,
        options: &RequestOptions,
    ) -> Result<reqwest::Response, Error> {
        let mut authorized = options.clone();
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))?;
        authorized.headers.insert(AUTHORIZATION, bearer);
        self.client.request(path, &authorized).await
    }

    pub async fn fetch_payload(
        &self,
        path: &str,
        token: &str,
        options: &RequestOptions,
    ) -> Result<Payload, Error> {
        let res = self.send(path, token, options).await?;
        if res.status() != StatusCode::UNAUTHORIZED {
            return decode(res, options.parse).await;
        }

        debug!(message = "Access token rejected", path);

        let provider = match self.registry.current() {
            Some(provider) => provider,
            None => {
                warn!(message = "No token provider registered, cannot refresh", path);
                return Err(ApiError::session_expired().into());
            }
        };

        let refresh_token = match provider.get_refresh_token().await {
            Some(refresh_token) => refresh_token,
            None => {
                warn!(message = "No refresh token stored, clearing session", path);
                provider.clear().await;
                return Err(ApiError::session_expired().into());
            }
        };

        // The coordinator records the new pair (or the cleared session) itself.
        let tokens = self
            .refresher
            .refresh(&refresh_token, Arc::clone(&provider))
            .await
            .map_err(|err| ApiError::refresh_failed(&err))?;

        match self.retry(path, &tokens.access_token, options).await {
            Ok(payload) => Ok(payload),
            Err(err) => {
                warn!(message = "Retry after refresh failed, clearing session", path, error = %err);
                provider.clear().await;
                match err {
                    Error::Api(err) => Err(err.into()),
                    other => Err(ApiError::new(other.to_string(), Some(401)).into()),
                }
            }
        }
    }

    /// The single retry allowed after a refresh; a 401 here is terminal.
    async fn retry(
        &self,
        path: &str,
        token: &str,
        options: &RequestOptions,
    ) -> Result<Payload, Error> {
        let res = self.send(path, token, options).await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::session_expired().into());
        }
        decode(res, options.parse).await
    }

    pub async fn fetch<T>(&self, path: &str, token: &str, options: &RequestOptions) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        self.fetch_payload(path, token, options).await?.deserialize()
    }
}

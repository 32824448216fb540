//! Typed operations of the feed API.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError, AuthorizedClient, Error, RequestOptions};
use crate::auth::{refresh::RefreshCoordinator, TokenPair, TokenProviderRegistry};

use self::model::{FeedPost, FeedResponse, Message, RegisteredUser, SearchResponse, UserSummary};

pub const SEARCH_LIMIT: u32 = 5;

pub struct FeedClient {
    client: ApiClient,
    authorized: AuthorizedClient,
}

impl FeedClient {
    pub fn new(client: ApiClient, registry: TokenProviderRegistry) -> Self {
        let authorized = AuthorizedClient::new(client.clone(), registry);
        Self { client, authorized }
    }

    /// Builds a client that refreshes through `refresher`, so every client
    /// sharing it collapses an expiry into one refresh call.
    pub fn with_refresher(
        client: ApiClient,
        registry: TokenProviderRegistry,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        let authorized = AuthorizedClient::with_refresher(client.clone(), registry, refresher);
        Self { client, authorized }
    }

    fn registry(&self) -> &TokenProviderRegistry {
        self.authorized.registry()
    }

    fn credentials(username: &str, password: &str) -> serde_json::Value {
        json!({ "username": username, "password": password })
    }

    async fn access_token(&self) -> Result<String, Error> {
        let provider = self
            .registry()
            .current()
            .ok_or_else(ApiError::session_expired)?;
        let token = provider
            .get_token()
            .await
            .ok_or_else(ApiError::session_expired)?;
        Ok(token)
    }

    /// Logs in and stores the issued tokens in the registered provider.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, Error> {
        let options = RequestOptions::post().json(&Self::credentials(username, password));
        let tokens: TokenPair = self.client.fetch("/api/auth/login", &options).await?;

        match self.registry().current() {
            Some(provider) => {
                provider.set_tokens(tokens.clone()).await;
                info!(message = "Logged in", username);
            }
            None => debug!(message = "Logged in without a token provider, session not stored"),
        }
        Ok(tokens)
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<RegisteredUser, Error> {
        let options = RequestOptions::post().json(&Self::credentials(username, password));
        let user: RegisteredUser = self.client.fetch("/api/auth/register", &options).await?;
        info!(message = "Registered user", id = user.id, username = %user.username);
        Ok(user)
    }

    pub async fn logout(&self) {
        if let Some(provider) = self.registry().current() {
            provider.clear().await;
            info!(message = "Logged out");
        }
    }

    pub async fn feed(&self) -> Result<Vec<FeedPost>, Error> {
        let token = self.access_token().await?;
        let feed: FeedResponse = self
            .authorized
            .fetch("/api/feed", &token, &RequestOptions::get())
            .await?;
        Ok(feed.posts)
    }

    pub async fn create_post(&self, content: &str) -> Result<(), Error> {
        let token = self.access_token().await?;
        let options = RequestOptions::post().json(&json!({ "content": content }));
        self.authorized
            .fetch_payload("/api/posts", &token, &options)
            .await?;
        Ok(())
    }

    pub async fn follow(&self, user_id: i64) -> Result<Message, Error> {
        let token = self.access_token().await?;
        self.authorized
            .fetch(&follow_path(user_id), &token, &RequestOptions::post())
            .await
    }

    pub async fn unfollow(&self, user_id: i64) -> Result<Message, Error> {
        let token = self.access_token().await?;
        self.authorized
            .fetch(&follow_path(user_id), &token, &RequestOptions::delete())
            .await
    }

    /// Finds users by name. A blank query matches nobody and costs no request.
    pub async fn search_users(&self, query: &str) -> Result<Vec<UserSummary>, Error> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let token = self.access_token().await?;
        let limit = SEARCH_LIMIT.to_string();
        let params = serde_urlencoded::to_string([("q", query), ("limit", limit.as_str())])?;
        let res: SearchResponse = self
            .authorized
            .fetch(
                &format!("/api/users/search?{params}"),
                &token,
                &RequestOptions::get(),
            )
            .await?;
        Ok(res.users)
    }
}

fn follow_path(user_id: i64) -> String {
    format!("/api/follow/{user_id}")
}

pub mod model {
    use serde::{Deserialize, Deserializer, Serialize};

    #[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RegisteredUser {
        pub id: i64,
        pub username: String,
    }

    #[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FeedResponse {
        #[serde(default)]
        pub page: Option<u32>,
        /// Anything but a list of posts reads as an empty feed.
        #[serde(default, deserialize_with = "lenient_list")]
        pub posts: Vec<FeedPost>,
    }

    #[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FeedPost {
        pub id: i64,
        /// Author id.
        pub userid: i64,
        pub content: String,
        /// Creation timestamp as sent by the server.
        pub createdat: String,
    }

    #[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SearchResponse {
        #[serde(default, deserialize_with = "lenient_list")]
        pub users: Vec<UserSummary>,
    }

    #[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct UserSummary {
        pub id: i64,
        pub username: String,
    }

    #[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Message {
        pub message: String,
    }

    fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: serde::de::DeserializeOwned,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Array(_) => {
                serde_json::from_value(value).map_err(serde::de::Error::custom)?
            }
            _ => Vec::new(),
        })
    }
}

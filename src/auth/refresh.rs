use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{TokenPair, TokenProvider};
use crate::api::{ApiClient, Error, RequestOptions};

pub const REFRESH_PATH: &str = "/api/auth/refresh";

pub type RefreshResult = Result<TokenPair, Arc<Error>>;

type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Collapses concurrent refresh attempts into a single call to the refresh
/// endpoint.
///
/// While a refresh is outstanding every caller awaits that same operation. The
/// slot is emptied as soon as the operation settles, so the next expiry starts
/// a fresh refresh instead of replaying a stale outcome.
pub struct RefreshCoordinator {
    client: ApiClient,
    pending: Arc<Mutex<Option<PendingRefresh>>>,
}

impl RefreshCoordinator {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            pending: Arc::new(Mutex::const_new(None)),
        }
    }

    pub async fn is_refreshing(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Exchanges `refresh_token` for a new pair, or joins the refresh already in
    /// flight.
    ///
    /// The outcome is recorded in `session` by the refresh itself: the new pair
    /// on success, a cleared session on failure. This happens once per refresh
    /// and also when every caller has stopped waiting.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        session: Arc<dyn TokenProvider>,
    ) -> RefreshResult {
        let pending = {
            let mut slot = self.pending.lock().await;
            match slot.clone() {
                Some(in_flight) => {
                    debug!(message = "Joining in-flight session refresh");
                    in_flight
                }
                None => {
                    info!(message = "Session expired, refreshing tokens");
                    let started = self.start(refresh_token.to_owned(), session);
                    slot.replace(started.clone());
                    started
                }
            }
        };

        pending.await
    }

    fn start(&self, refresh_token: String, session: Arc<dyn TokenProvider>) -> PendingRefresh {
        let client = self.client.clone();
        let slot = Arc::clone(&self.pending);

        // The starter still holds the slot lock here, so the task cannot empty
        // the slot before the pending operation has been stored in it.
        let task = tokio::spawn({
            let slot = Arc::clone(&slot);
            async move {
                let outcome = fetch_new_tokens(&client, &refresh_token).await;
                match &outcome {
                    Ok(tokens) => {
                        session.set_tokens(tokens.clone()).await;
                        info!(message = "Session refreshed");
                    }
                    Err(err) => {
                        warn!(message = "Session refresh failed, clearing session", error = %err);
                        session.clear().await;
                    }
                }
                slot.lock().await.take();
                outcome.map_err(Arc::new)
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    slot.lock().await.take();
                    Err(Arc::new(Error::Task(err)))
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn fetch_new_tokens(client: &ApiClient, refresh_token: &str) -> Result<TokenPair, Error> {
    let options = RequestOptions::post().json(&json!({ "refreshToken": refresh_token }));
    client.fetch(REFRESH_PATH, &options).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::session::MemorySession;

    fn coordinator(mock_server: &MockServer) -> RefreshCoordinator {
        RefreshCoordinator::new(ApiClient::new(
            reqwest::Client::new(),
            Some(mock_server.uri()),
        ))
    }

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.into(),
            refresh_token: refresh.into(),
        }
    }

    #[tokio::test]
    async fn refresh_stores_new_pair() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .and(body_json(json!({ "refreshToken": "r1" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "t2", "refreshToken": "r2" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let session = Arc::new(MemorySession::with_tokens(pair("t1", "r1")));
        let coordinator = coordinator(&mock_server);

        let tokens = coordinator.refresh("r1", session.clone()).await.unwrap();
        assert_eq!(tokens, pair("t2", "r2"));
        assert_eq!(session.snapshot(), Some(pair("t2", "r2")));
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "t2", "refreshToken": "r2" }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let session: Arc<dyn TokenProvider> =
            Arc::new(MemorySession::with_tokens(pair("t1", "r1")));
        let coordinator = coordinator(&mock_server);

        let (a, b, c) = tokio::join!(
            coordinator.refresh("r1", session.clone()),
            coordinator.refresh("r1", session.clone()),
            coordinator.refresh("r1", session.clone()),
        );
        assert_eq!(a.unwrap(), pair("t2", "r2"));
        assert_eq!(b.unwrap(), pair("t2", "r2"));
        assert_eq!(c.unwrap(), pair("t2", "r2"));
    }

    #[tokio::test]
    async fn settled_refresh_is_not_reused() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "t2", "refreshToken": "r2" })),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let session = Arc::new(MemorySession::new());
        let coordinator = coordinator(&mock_server);

        coordinator.refresh("r1", session.clone()).await.unwrap();
        coordinator.refresh("r2", session.clone()).await.unwrap();
    }

    #[tokio::test]
    async fn failure_reaches_every_caller_and_clears_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({ "message": "refresh token revoked" }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let session = Arc::new(MemorySession::with_tokens(pair("t1", "r1")));
        let coordinator = coordinator(&mock_server);

        let (a, b) = tokio::join!(
            coordinator.refresh("r1", session.clone()),
            coordinator.refresh("r1", session.clone()),
        );
        for outcome in [a, b] {
            let err = outcome.unwrap_err();
            assert_eq!(err.status(), Some(403));
        }
        assert_eq!(session.snapshot(), None);
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn body_missing_fields_is_a_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t2" })))
            .mount(&mock_server)
            .await;

        let session = Arc::new(MemorySession::with_tokens(pair("t1", "r1")));
        let err = coordinator(&mock_server)
            .refresh("r1", session.clone())
            .await
            .unwrap_err();
        assert!(matches!(*err, Error::Deserialize(_)));
        assert_eq!(session.snapshot(), None);
    }

    #[tokio::test]
    async fn abandoned_refresh_still_updates_session() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(REFRESH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "token": "t2", "refreshToken": "r2" }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let session = Arc::new(MemorySession::with_tokens(pair("t1", "r1")));
        let coordinator = coordinator(&mock_server);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), coordinator.refresh("r1", session.clone()))
                .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(session.snapshot(), Some(pair("t2", "r2")));
        assert!(!coordinator.is_refreshing().await);
    }
}

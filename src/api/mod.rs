//! Raw access to the feed API.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;

pub use self::{
    authorized::AuthorizedClient,
    decode::{decode, Format, Payload},
    error::{ApiError, Error},
};

pub mod authorized;
pub mod decode;
pub mod error;

/// Method, headers, body and decoding hint of a single call.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
    pub parse: Option<Format>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post() -> Self {
        Self::method(Method::POST)
    }

    pub fn delete() -> Self {
        Self::method(Method::DELETE)
    }

    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json(self, body: &serde_json::Value) -> Self {
        self.body(body.to_string())
    }

    pub fn parse(mut self, format: Format) -> Self {
        self.parse = Some(format);
        self
    }
}

/// Client for calls that carry no credentials.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl ApiClient {
    pub fn new(client: reqwest::Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref().filter(|url| !url.is_empty())
    }

    fn build_request(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<reqwest::Request, Error> {
        let base_url = self.base_url().ok_or(Error::MissingBaseUrl)?;
        let url = format!("{base_url}{path}");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(options.headers.clone());

        let builder = self
            .client
            .request(options.method.clone(), url)
            .headers(headers);

        let builder = match &options.body {
            Some(body) => builder.body(body.clone()),
            None => builder,
        };

        builder.build().map_err(Error::Reqwest)
    }

    /// Sends the call and hands back the response undecoded.
    pub async fn request(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<reqwest::Response, Error> {
        let req = self.build_request(path, options)?;
        debug!(message = "Sending request", method = %req.method(), path);
        let res = self.client.execute(req).await?;
        debug!(message = "Got response", path, status = res.status().as_u16());
        Ok(res)
    }

    pub async fn fetch_payload(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<Payload, Error> {
        let res = self.request(path, options).await?;
        decode(res, options.parse).await
    }

    pub async fn fetch<T>(&self, path: &str, options: &RequestOptions) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        self.fetch_payload(path, options).await?.deserialize()
    }
}

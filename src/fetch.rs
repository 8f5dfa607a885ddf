//! Bounded-timeout JSON calls to external sources.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde_json::Value;

use crate::error::PriceError;

/// Default deadline for a source's own lookup.
pub const GENERAL_TIMEOUT: Duration = Duration::from_millis(8000);
/// Default deadline for lookups used as an inner step of another source.
pub const AUXILIARY_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outbound call: endpoint, query, headers and an optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl JsonRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: vec![],
            headers: vec![],
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_owned(), value.into()));
        self
    }
}

#[async_trait]
pub trait JsonFetcher: Send + Sync {
    /// Performs `request`, giving up once `timeout` has elapsed.
    async fn fetch(&self, request: &JsonRequest, timeout: Duration) -> Result<Value, PriceError>;
}

/// Runs `operation` under a hard deadline. On expiry the future is dropped,
/// which cancels the in-flight call.
pub async fn with_deadline<T, F>(
    url: &str,
    timeout: Duration,
    operation: F,
) -> Result<T, PriceError>
where
    F: Future<Output = Result<T, PriceError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(PriceError::Timeout {
            url: url.to_owned(),
            after: timeout,
        }),
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn build() -> Result<Self, PriceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Accept",
            "application/json"
                .parse()
                .map_err(|_| PriceError::Config("invalid Accept header".to_owned()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| PriceError::Config(format!("building HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn send(&self, request: &JsonRequest) -> Result<Value, PriceError> {
        let url = request.url.as_str();
        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!("{:?} {} {:?}", request.method, url, request.query);
        let res = builder
            .send()
            .await
            .map_err(|e| PriceError::transport(url, format!("request failed: {}", e)))?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PriceError::transport(url, "rate limited"));
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PriceError::transport(url, format!("HTTP {} - {}", status, body)));
        }

        res.json::<Value>()
            .await
            .map_err(|e| PriceError::parse(url, format!("response is not JSON: {}", e)))
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn fetch(&self, request: &JsonRequest, timeout: Duration) -> Result<Value, PriceError> {
        with_deadline(&request.url, timeout, self.send(request)).await
    }
}

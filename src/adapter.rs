use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    redirect, Method,
};
use reqwest_middleware::{ClientWithMiddleware, Middleware, Next};
use task_local_extensions::Extensions;

use crate::policy::HeaderPolicy;

/// Header multimap as exchanged with the extractor.
pub type Headers = BTreeMap<String, Vec<String>>;

#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error("reqwest error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("YouTube asked to confirm this is not a bot; automated access to {url} was blocked")]
    Challenge { url: String },
}

/// An outbound request as described by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub headers: Headers,
    pub data: Option<Vec<u8>>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: Headers::new(),
            data: None,
        }
    }

    pub fn post(url: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            data: Some(data),
            ..Self::get(url)
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status_code: u16,
    pub status_message: String,
    pub headers: Headers,
    pub body: String,
    /// URL the response was finally served from, after redirects.
    pub latest_url: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// First value of a response header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(|v| v.as_str())
    }
}

/// HTTP capability handed to the extractor.
///
/// Non-2xx statuses are returned as a normal [`Response`]; only transport
/// failures and verification challenges are errors.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, RequestError>;
}

/// Middleware filling in the headers the [`HeaderPolicy`] asks for.
pub struct RequestShaper {
    policy: Arc<HeaderPolicy>,
}

impl RequestShaper {
    pub fn new(policy: Arc<HeaderPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Middleware for RequestShaper {
    async fn handle(
        &self,
        mut req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        {
            let url = req.url().to_string();
            let mut rng = rand::thread_rng();
            self.policy
                .shape(&url, req.headers_mut(), &mut rng, Utc::now());
            debug!("{} {} ({} headers)", req.method(), url, req.headers().len());
        }

        next.run(req, extensions).await
    }
}

/// [`Downloader`] backed by reqwest with anti-detection header shaping.
pub struct ShapingDownloader {
    client: ClientWithMiddleware,
    policy: Arc<HeaderPolicy>,
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, RequestError> {
    let mut map = HeaderMap::new();
    for (name, values) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| RequestError::InvalidHeader(name.clone()))?;
        for value in values {
            let value = HeaderValue::from_str(value)
                .map_err(|_| RequestError::InvalidHeader(name.to_string()))?;
            map.append(name.clone(), value);
        }
    }
    Ok(map)
}

fn from_header_map(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    headers
}

impl ShapingDownloader {
    pub fn new(policy: HeaderPolicy, timeout: Duration) -> reqwest::Result<Self> {
        let policy = Arc::new(policy);

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(10))
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RequestShaper::new(policy.clone()))
            .build();

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &HeaderPolicy {
        &self.policy
    }
}

#[async_trait]
impl Downloader for ShapingDownloader {
    async fn execute(&self, request: Request) -> Result<Response, RequestError> {
        let headers = to_header_map(&request.headers)?;
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str())
            .headers(headers);
        if let Some(data) = request.data {
            builder = builder.body(data);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let latest_url = resp.url().to_string();
        if latest_url != request.url {
            debug!("{} redirected to {}", request.url, latest_url);
        }
        let headers = from_header_map(resp.headers());
        let body = resp.text().await?;

        self.policy.check_challenge(&request.url, &body)?;

        Ok(Response {
            status_code: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            latest_url,
        })
    }
}

//! Request-issuing capability handed to scenarios.
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout applied by [`HttpTransport::new`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            headers: vec![],
            body: None,
        }
    }

    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, RequestError> {
        Ok(Self {
            method: Method::Post,
            path: path.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(serde_json::to_vec(body)?),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: vec![],
        }
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{}", rampa_core::CANCELLED_REASON)]
    Cancelled,
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Something able to issue a [`Request`] against the system under test.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    async fn send(&self, request: Request) -> Result<Response, RequestError>;
}

/// [`Transport`] over a pooled [`reqwest::Client`]. Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, RequestError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.into(), url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let res = builder.send().await?;
        let status = res.status().as_u16();
        // NOTE: Draining the body lets the connection go back to the pool.
        let body = res.bytes().await?.to_vec();

        Ok(Response { status, body })
    }
}

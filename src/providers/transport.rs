use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::providers::ProviderError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAuth {
    None,
    Bearer(String),
    Header { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsonRequest {
    pub url: String,
    pub auth: RequestAuth,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some(String::from("application/json")),
            body: body.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.body.as_slice()).to_string()
    }

    pub fn decode_json<T: DeserializeOwned>(&self, context: &str) -> Result<T, ProviderError> {
        serde_json::from_slice(self.body.as_slice())
            .map_err(|e| ProviderError::Response(format!("{context} JSON decode failed: {e}")))
    }
}

/// Blocking HTTP seam used by every provider adapter.
pub trait HttpTransport: Send + Sync + 'static {
    fn post_json(&self, request: &JsonRequest) -> Result<HttpReply, ProviderError>;
    fn get(&self, url: &str) -> Result<HttpReply, ProviderError>;
}

pub type SharedHttpTransport = Arc<dyn HttpTransport>;

/// reqwest blocking transport. The client is built on first use so construction is
/// safe from inside an async runtime; calls must run on a blocking thread.
#[derive(Debug)]
pub struct ReqwestTransport {
    timeout: Duration,
    client: OnceLock<Client>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceLock::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn client(&self) -> Result<&Client, ProviderError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("http client init failed: {e}")))?;
        Ok(self.client.get_or_init(|| built))
    }

    fn read_reply(resp: reqwest::blocking::Response) -> Result<HttpReply, ProviderError> {
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .map_err(|e| ProviderError::Network(format!("response body read failed: {e}")))?;
        Ok(HttpReply {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn post_json(&self, request: &JsonRequest) -> Result<HttpReply, ProviderError> {
        let mut builder = self.client()?.post(request.url.as_str()).json(&request.body);
        builder = match &request.auth {
            RequestAuth::None => builder,
            RequestAuth::Bearer(token) => builder.bearer_auth(token),
            RequestAuth::Header { name, value } => builder.header(*name, value.as_str()),
        };
        let resp = builder
            .send()
            .map_err(|e| ProviderError::Network(format!("request to {} failed: {e}", request.url)))?;
        Self::read_reply(resp)
    }

    fn get(&self, url: &str) -> Result<HttpReply, ProviderError> {
        let resp = self
            .client()?
            .get(url)
            .send()
            .map_err(|e| ProviderError::Network(format!("request to {url} failed: {e}")))?;
        Self::read_reply(resp)
    }
}

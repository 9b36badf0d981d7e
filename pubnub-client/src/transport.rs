//! Transport executor: turns a [`RequestDescriptor`] into an HTTP call.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::protocol::{self, SDK_NAME, encode_query, query};
use crate::types::Error;

/// Operation a request belongs to; used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Publish,
    Subscribe,
    Time,
}

/// A finalized, transport-ready request. Built fresh per call and consumed
/// once by [`send`].
#[derive(Debug)]
pub(crate) struct RequestDescriptor {
    pub operation: Operation,
    pub method: Method,
    /// Already percent-encoded path.
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl RequestDescriptor {
    pub fn get(operation: Operation, path: String, timeout: Duration) -> Self {
        Self {
            operation,
            method: Method::GET,
            path,
            query: BTreeMap::new(),
            body: None,
            timeout,
        }
    }

    pub fn set_query(&mut self, key: &str, value: impl Into<String>) {
        self.query.insert(key.to_string(), value.into());
    }
}

/// Raw HTTP response: status plus body text.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Query parameters every request carries.
pub(crate) fn default_query(config: &Config) -> BTreeMap<String, String> {
    let mut q = BTreeMap::new();
    q.insert(query::UUID.to_string(), config.uuid.clone());
    q.insert(query::PNSDK.to_string(), SDK_NAME.to_string());
    if let Some(auth) = config.auth_key.as_deref().filter(|a| !a.is_empty()) {
        q.insert(query::AUTH.to_string(), auth.to_string());
    }
    q
}

/// Build the final URL, signing the request when a secret key is configured.
pub(crate) fn build_url(config: &Config, desc: &mut RequestDescriptor) -> Result<url::Url, Error> {
    if let Some(secret) = config.signing_key() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        desc.set_query(query::TIMESTAMP, now.to_string());
        let signature = protocol::sign(
            secret,
            &config.subscribe_key,
            &config.publish_key,
            &desc.path,
            &desc.query,
        )?;
        desc.set_query(query::SIGNATURE, signature);
    }
    let mut raw = format!("{}{}", config.base_url(), desc.path);
    if !desc.query.is_empty() {
        raw.push('?');
        raw.push_str(&encode_query(&desc.query));
    }
    Ok(url::Url::parse(&raw)?)
}

/// Dispatch a request and return the raw response. Non-2xx statuses are
/// returned as responses; only connection-level failures become errors.
pub(crate) async fn send(
    http: &reqwest::Client,
    config: &Config,
    mut desc: RequestDescriptor,
) -> Result<RawResponse, Error> {
    let url = build_url(config, &mut desc)?;
    tracing::debug!(
        operation = ?desc.operation,
        method = %desc.method,
        path = %desc.path,
        "Dispatching request"
    );

    let mut req = http
        .request(desc.method.clone(), url)
        .timeout(desc.timeout);
    if let Some(body) = desc.body {
        req = req
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
    }

    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    tracing::trace!(operation = ?desc.operation, %status, "Response received");
    Ok(RawResponse { status, body })
}

/// Like [`send`], but abandons the request when `token` is cancelled.
pub(crate) async fn send_cancellable(
    http: &reqwest::Client,
    config: &Config,
    desc: RequestDescriptor,
    token: &CancellationToken,
) -> Result<RawResponse, Error> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = send(http, config, desc) => result,
    }
}

//! HTTP transport used to reach the Bot API

use std::time::Duration;

use reqwest::blocking::Client;

use crate::telegram::error::DeliveryError;

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Performs one blocking HTTP GET.
///
/// An `Err` means the exchange did not complete; any status code the remote
/// sent back is returned as `Ok`.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, DeliveryError>;
}

/// [`HttpTransport`] backed by a blocking `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;

        Ok(Self { http })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, DeliveryError> {
        // request URLs embed the bot token, keep them out of error text
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|e| DeliveryError::Transport(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .unwrap_or_else(|e| format!("<unreadable body: {}>", e.without_url()));

        Ok(HttpResponse { status, body })
    }
}

//! SOAP client over HTTP
//!
//! Posts request documents with reqwest and decodes the response body with
//! [`decode_document`]. Non-2xx responses, transport failures and undecodable
//! bodies all come back as [`RemoteCallError`].

use super::xml::decode_document;
use super::RemoteAdapter;
use crate::error::RemoteCallError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = concat!("ccp-sync/", env!("CARGO_PKG_VERSION"));
const CONTENT_TYPE: &str = "text/xml; charset=utf-8";
const ERROR_BODY_PREVIEW: usize = 200;

/// SOAP endpoint client
pub struct SoapClient {
    http_client: reqwest::Client,
    url: String,
}

impl SoapClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteCallError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteCallError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteAdapter for SoapClient {
    async fn post(&self, body: String) -> Result<Value, RemoteCallError> {
        let response = self
            .http_client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| RemoteCallError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteCallError::Network(e.to_string()))?;

        if !status.is_success() {
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(RemoteCallError::Status(status.as_u16(), preview));
        }

        decode_document(&text)
    }
}

//! Remote service access
//!
//! The pipeline only sees [`RemoteAdapter`]: a request document goes in, a
//! decoded nested value comes out.

pub mod soap_client;
pub mod xml;

pub use soap_client::SoapClient;

use crate::error::RemoteCallError;
use async_trait::async_trait;
use serde_json::Value;

/// One request/response exchange with the remote service
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Post a request document and return the decoded response
    async fn post(&self, body: String) -> Result<Value, RemoteCallError>;
}

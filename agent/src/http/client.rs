//! HTTP client for the resource manager API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::ProvisioningError;

/// Resource manager transport, a trait for testability
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get_resource(&self, path: &str, authorization: &str) -> Result<Value, ProvisioningError>;

    async fn put_resource(
        &self,
        path: &str,
        authorization: &str,
        body: &Value,
    ) -> Result<Value, ProvisioningError>;
}

/// HTTP client bound to one resource manager endpoint
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProvisioningError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProvisioningError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        authorization: &str,
    ) -> Result<T, ProvisioningError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, authorization);

        self.send("GET", request).await
    }

    /// Make a PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        authorization: &str,
        body: &B,
    ) -> Result<T, ProvisioningError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("PUT {}", url);

        let request = self
            .client
            .put(&url)
            .header(header::AUTHORIZATION, authorization)
            .json(body);

        self.send("PUT", request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        request: RequestBuilder,
    ) -> Result<T, ProvisioningError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProvisioningError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed: {} - {}", method, status, body);
            return Err(ProvisioningError::Request(format!("{}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProvisioningError::Request(e.to_string()))
    }
}

#[async_trait]
impl ResourceClient for HttpClient {
    async fn get_resource(&self, path: &str, authorization: &str) -> Result<Value, ProvisioningError> {
        self.get(path, authorization).await
    }

    async fn put_resource(
        &self,
        path: &str,
        authorization: &str,
        body: &Value,
    ) -> Result<Value, ProvisioningError> {
        self.put(path, authorization, body).await
    }
}

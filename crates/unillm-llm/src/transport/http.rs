use log::debug;
use reqwest::{header, Client, Response};
use serde_json::Value;
use std::sync::Arc;

use unillm_core::{LLMError, Result, TransportError};

use crate::auth::Authenticator;
use crate::provider::ProviderConfig;

/// reqwest client plus the headers every request to one provider carries
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    authenticator: Arc<dyn Authenticator>,
    headers: header::HeaderMap,
}

impl HttpClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Self::with_authenticator(config, config.auth.authenticator()?)
    }

    pub fn with_authenticator(
        config: &ProviderConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LLMError::Config(e.to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        // Add custom headers from config
        for (key, value) in &config.headers {
            let header_name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| LLMError::Config(format!("Invalid header name: {}", e)))?;
            let header_value = header::HeaderValue::from_str(value)
                .map_err(|e| LLMError::Config(format!("Invalid header value: {}", e)))?;
            headers.insert(header_name, header_value);
        }

        Ok(Self {
            client,
            authenticator,
            headers,
        })
    }

    /// Add a header sent with every request
    pub fn with_static_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(name, header::HeaderValue::from_static(value));
        self
    }

    async fn build_headers(&self) -> std::result::Result<header::HeaderMap, TransportError> {
        let mut headers = self.headers.clone();

        if let Some((header_name, header_value)) = self.authenticator.get_auth_header().await? {
            let name = header::HeaderName::from_bytes(header_name.as_bytes())
                .map_err(|e| TransportError::Auth(format!("Invalid auth header name: {}", e)))?;
            let value = header::HeaderValue::from_str(&header_value)
                .map_err(|e| TransportError::Auth(format!("Invalid auth header value: {}", e)))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// POST `body` as JSON and fail on any non-success status
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        accept: &'static str,
    ) -> std::result::Result<Response, TransportError> {
        let mut headers = self.build_headers().await?;
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(accept));

        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => TransportError::Auth(error_text),
                code => TransportError::Api {
                    status: code,
                    message: error_text,
                },
            });
        }

        Ok(response)
    }
}

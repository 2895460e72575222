use async_trait::async_trait;
use unillm_core::TransportError;

/// Authenticator trait for different authentication methods
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Get the authentication header (header_name, header_value)
    /// Returns None if no authentication is needed
    async fn get_auth_header(&self) -> Result<Option<(String, String)>, TransportError>;
}

/// API key sent in a dedicated header (`x-api-key` unless overridden)
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    header: String,
    api_key: String,
}

impl ApiKeyAuth {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            header: "x-api-key".to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuth {
    async fn get_auth_header(&self) -> Result<Option<(String, String)>, TransportError> {
        if self.api_key.is_empty() {
            return Err(TransportError::Auth("API key is empty".to_string()));
        }
        Ok(Some((self.header.clone(), self.api_key.clone())))
    }
}

/// Bearer token authenticator
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    /// Create a new bearer authenticator
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for BearerAuth {
    async fn get_auth_header(&self) -> Result<Option<(String, String)>, TransportError> {
        if self.token.is_empty() {
            return Err(TransportError::Auth("bearer token is empty".to_string()));
        }
        Ok(Some((
            "Authorization".to_string(),
            format!("Bearer {}", self.token),
        )))
    }
}

/// No authentication
#[derive(Debug, Clone)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    async fn get_auth_header(&self) -> Result<Option<(String, String)>, TransportError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_key_header() {
        let header = ApiKeyAuth::new("sk-test").get_auth_header().await.unwrap();
        assert_eq!(header, Some(("x-api-key".to_string(), "sk-test".to_string())));

        let header = ApiKeyAuth::new("k").with_header("api-key").get_auth_header().await.unwrap();
        assert_eq!(header.unwrap().0, "api-key");
    }

    #[tokio::test]
    async fn test_bearer_header() {
        let header = BearerAuth::new("tok").get_auth_header().await.unwrap();
        assert_eq!(header, Some(("Authorization".to_string(), "Bearer tok".to_string())));
    }

    #[tokio::test]
    async fn test_empty_credentials_fail() {
        assert!(matches!(
            BearerAuth::new("").get_auth_header().await,
            Err(TransportError::Auth(_))
        ));
        assert!(NoAuth.get_auth_header().await.unwrap().is_none());
    }
}

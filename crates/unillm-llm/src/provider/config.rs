use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use unillm_core::{LLMError, Result};

use crate::auth::{ApiKeyAuth, Authenticator, BearerAuth, NoAuth};

/// Service name of the Bedrock Mistral provider
pub const BEDROCK_MISTRAL: &str = "bedrock-mistral";
/// Service name of the Anthropic provider
pub const ANTHROPIC: &str = "anthropic";

/// Authentication configuration enum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Key sent in the provider's API key header
    ApiKey {
        key: String,
    },
    /// `Authorization: Bearer` token
    Bearer {
        token: String,
    },
    /// Static AWS credentials for SigV4-signed Bedrock calls
    Aws {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
    },
    /// No authentication; Bedrock falls back to the default AWS credential chain
    #[default]
    None,
}

impl AuthConfig {
    /// Create API key auth from environment variable
    pub fn api_key_from_env(env_var: &str) -> Option<Self> {
        std::env::var(env_var).ok().map(|key| Self::ApiKey { key })
    }

    /// Create bearer auth from environment variable
    pub fn bearer_from_env(env_var: &str) -> Option<Self> {
        std::env::var(env_var).ok().map(|token| Self::Bearer { token })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::ApiKey { .. } => "api_key",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::Aws { .. } => "aws",
            AuthConfig::None => "none",
        }
    }

    /// Header authenticator for HTTP providers; AWS credentials are rejected
    pub fn authenticator(&self) -> Result<Arc<dyn Authenticator>> {
        match self {
            AuthConfig::ApiKey { key } => Ok(Arc::new(ApiKeyAuth::new(key.clone()))),
            AuthConfig::Bearer { token } => Ok(Arc::new(BearerAuth::new(token.clone()))),
            AuthConfig::None => Ok(Arc::new(NoAuth)),
            AuthConfig::Aws { .. } => Err(LLMError::Config(
                "AWS credentials only apply to Bedrock".to_string(),
            )),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Service name, used to pick the provider implementation
    pub provider_id: String,
    /// Base URL for the API
    pub base_url: String,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// AWS region (Bedrock); the default region chain when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Model used when a request does not name one; the provider default when unset
    #[serde(default)]
    pub model: Option<String>,
    /// Request timeout in seconds
    #[serde(with = "serde_duration", default = "default_timeout")]
    pub timeout: Duration,
    /// Additional headers to include
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ProviderConfig {
    /// Create a new provider config
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
            auth: AuthConfig::None,
            region: None,
            model: None,
            timeout: default_timeout(),
            headers: HashMap::new(),
        }
    }

    /// Bedrock runtime in `region`, signed with the default AWS credential chain
    pub fn bedrock_mistral(region: &str) -> Self {
        Self::new(BEDROCK_MISTRAL, bedrock_runtime_url(region)).with_region(region)
    }

    pub fn anthropic() -> Self {
        Self::new(ANTHROPIC, "https://api.anthropic.com/v1")
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.auth = AuthConfig::ApiKey { key: key.into() };
        self
    }

    /// Set bearer token
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthConfig::Bearer { token: token.into() };
        self
    }

    /// Sign with static AWS credentials instead of the default chain
    pub fn with_aws_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        self.auth = AuthConfig::Aws {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        };
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

pub fn bedrock_runtime_url(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

// Custom serialization for Duration
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

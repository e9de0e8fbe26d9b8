use crate::error::ProviderError;
use crate::retry::RetryPolicy;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Credentials and tuning shared by the embedding and chat providers.
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.7,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Config("api key is not set".to_string()));
        }

        let parsed = Url::parse(&self.base_url)
            .map_err(|error| ProviderError::Config(format!("base url {}: {error}", self.base_url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProviderError::Config(format!(
                "base url must be http(s): {}",
                self.base_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ProviderError::Config(
                "request timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// HTTP client with the configured timeouts applied to every request.
    pub fn http_client(&self) -> Result<reqwest::Client, ProviderError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(concat!("pdf-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| ProviderError::Config(format!("http client: {error}")))
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_key() -> ProviderConfig {
        ProviderConfig {
            api_key: "sk-test".to_string(),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn missing_api_key_is_rejected() {
        assert!(matches!(
            ProviderConfig::default().validate(),
            Err(ProviderError::Config(_))
        ));
        assert!(with_key().validate().is_ok());
    }

    #[test]
    fn base_url_must_be_http() {
        let config = ProviderConfig {
            base_url: "ftp://example.com".to_string(),
            ..with_key()
        };
        assert!(config.validate().is_err());

        let config = ProviderConfig {
            base_url: "not a url".to_string(),
            ..with_key()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ProviderConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..with_key()
        };
        assert_eq!(config.endpoint("embeddings"), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let rendered = format!("{:?}", with_key());
        assert!(!rendered.contains("sk-test"));
    }
}

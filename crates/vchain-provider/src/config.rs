//! Provider client configuration.

use std::time::Duration;
use vchain_models::{ApiVariant, DeploymentNames, ProviderConfig, SelfHostedConfig};

use crate::error::{ProviderError, ProviderResult};

/// Base address of the hosted API.
pub const DEFAULT_HOSTED_BASE_URL: &str = "https://api.openai.com/v1";

/// Text model used by the planner against the hosted API.
pub const DEFAULT_PLANNER_MODEL: &str = "gpt-4o";

/// Image model used against the hosted API.
pub const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";

/// Transport settings shared by every provider request.
#[derive(Debug, Clone)]
pub struct ProviderClientConfig {
    /// Hosted API base URL (overridable for tests and proxies)
    pub hosted_base_url: String,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Hosted text model used for planning
    pub planner_model: String,
    /// Hosted image model
    pub image_model: String,
}

impl Default for ProviderClientConfig {
    fn default() -> Self {
        Self {
            hosted_base_url: DEFAULT_HOSTED_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
            planner_model: DEFAULT_PLANNER_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }
}

impl ProviderClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hosted_base_url: std::env::var("VCHAIN_HOSTED_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.hosted_base_url),
            timeout: std::env::var("VCHAIN_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: defaults.connect_timeout,
            planner_model: std::env::var("VCHAIN_PLANNER_MODEL").unwrap_or(defaults.planner_model),
            image_model: std::env::var("VCHAIN_IMAGE_MODEL").unwrap_or(defaults.image_model),
        }
    }

    /// Use a different hosted base URL.
    pub fn with_hosted_base_url(mut self, url: impl Into<String>) -> Self {
        self.hosted_base_url = url.into();
        self
    }
}

/// Assemble a [`ProviderConfig`] from `VCHAIN_*` environment variables.
///
/// `VCHAIN_PROVIDER` selects the family (`hosted` when unset).
pub fn provider_config_from_env() -> ProviderResult<ProviderConfig> {
    let kind = std::env::var("VCHAIN_PROVIDER").unwrap_or_else(|_| "hosted".to_string());

    let config = match kind.trim().to_ascii_lowercase().as_str() {
        "hosted" | "openai" => ProviderConfig::Hosted,
        "self_hosted" | "self-hosted" | "azure" => {
            let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
            let api_variant = match var("VCHAIN_API_VARIANT") {
                Some(v) => v.parse::<ApiVariant>()?,
                None => ApiVariant::default(),
            };
            ProviderConfig::SelfHosted(SelfHostedConfig {
                endpoint: var("VCHAIN_ENDPOINT").unwrap_or_default(),
                api_variant,
                deployments: DeploymentNames {
                    video: var("VCHAIN_VIDEO_DEPLOYMENT").unwrap_or_default(),
                    planner: var("VCHAIN_PLANNER_DEPLOYMENT").unwrap_or_default(),
                    image: var("VCHAIN_IMAGE_DEPLOYMENT"),
                },
                api_version: var("VCHAIN_API_VERSION"),
            })
        }
        other => {
            return Err(ProviderError::validation(format!(
                "unknown provider '{}', expected 'hosted' or 'self_hosted'",
                other
            )))
        }
    };

    config.validate()?;
    Ok(config)
}

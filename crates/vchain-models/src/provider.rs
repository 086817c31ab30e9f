//! Provider configuration.
//!
//! A [`ProviderConfig`] selects one of two address/auth families:
//! - `Hosted`: a multi-tenant API at a fixed base address, bearer auth.
//! - `SelfHosted`: a caller-owned gateway, addressed either through a
//!   versioned path or through per-deployment paths with an explicit
//!   `api-version` query parameter, authenticated with an `api-key` header.
//!
//! The config is immutable once built and owned by the caller of the pipeline.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ModelError, ModelResult};

/// Literal prefix every hosted credential starts with.
pub const HOSTED_KEY_PREFIX: &str = "sk-";

/// Which address/auth family a config (or a history record) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Hosted,
    SelfHosted,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hosted => "hosted",
            ProviderKind::SelfHosted => "self_hosted",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Address scheme of a self-hosted gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiVariant {
    /// `{endpoint}/openai/v1/...`
    #[default]
    #[serde(alias = "v1")]
    VersionedPath,
    /// `{endpoint}/openai/deployments/{name}/...?api-version=...`
    #[serde(alias = "deployments")]
    DeploymentPath,
}

impl ApiVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVariant::VersionedPath => "v1",
            ApiVariant::DeploymentPath => "deployments",
        }
    }
}

impl std::str::FromStr for ApiVariant {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "versioned" | "versioned_path" => Ok(ApiVariant::VersionedPath),
            "deployments" | "deployment" | "deployment_path" => Ok(ApiVariant::DeploymentPath),
            other => Err(ModelError::invalid_provider(format!(
                "unknown api variant '{}'",
                other
            ))),
        }
    }
}

/// Deployment names used by a self-hosted gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct DeploymentNames {
    /// Video generation deployment
    pub video: String,
    /// Text (chat) deployment used by the segment planner
    pub planner: String,
    /// Image generation deployment (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl DeploymentNames {
    /// Deployment used for image generation.
    ///
    /// Falls back to the planner and then the video deployment when no
    /// dedicated image deployment is configured.
    pub fn image_or_fallback(&self) -> Option<&str> {
        self.image
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| Some(self.planner.as_str()).filter(|s| !s.trim().is_empty()))
            .or_else(|| Some(self.video.as_str()).filter(|s| !s.trim().is_empty()))
    }
}

/// Settings of a self-hosted gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelfHostedConfig {
    /// Gateway base address, e.g. `https://my-resource.example.com`
    pub endpoint: String,
    /// Address scheme
    #[serde(default)]
    pub api_variant: ApiVariant,
    /// Deployment names
    pub deployments: DeploymentNames,
    /// API version (required for, and only for, `DeploymentPath`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl SelfHostedConfig {
    /// Create a versioned-path config.
    pub fn versioned(endpoint: impl Into<String>, deployments: DeploymentNames) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_variant: ApiVariant::VersionedPath,
            deployments,
            api_version: None,
        }
    }

    /// Create a deployment-path config.
    pub fn deployment(
        endpoint: impl Into<String>,
        deployments: DeploymentNames,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_variant: ApiVariant::DeploymentPath,
            deployments,
            api_version: Some(api_version.into()),
        }
    }

    /// Endpoint with trailing slashes removed.
    pub fn normalized_endpoint(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }
}

/// Provider selection for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Hosted,
    SelfHosted(SelfHostedConfig),
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderConfig::Hosted => ProviderKind::Hosted,
            ProviderConfig::SelfHosted(_) => ProviderKind::SelfHosted,
        }
    }

    /// Self-hosted settings, if any.
    pub fn self_hosted(&self) -> Option<&SelfHostedConfig> {
        match self {
            ProviderConfig::Hosted => None,
            ProviderConfig::SelfHosted(cfg) => Some(cfg),
        }
    }

    /// Whether the provider accepts separate start and end frames.
    pub fn supports_dual_frames(&self) -> bool {
        matches!(self, ProviderConfig::SelfHosted(_))
    }

    /// Whether request bodies carry an explicit `model` field.
    ///
    /// Deployment-addressed requests name the model through the deployment.
    pub fn includes_model_field(&self) -> bool {
        match self {
            ProviderConfig::Hosted => true,
            ProviderConfig::SelfHosted(cfg) => cfg.api_variant == ApiVariant::VersionedPath,
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> ModelResult<()> {
        let cfg = match self {
            ProviderConfig::Hosted => return Ok(()),
            ProviderConfig::SelfHosted(cfg) => cfg,
        };

        let endpoint = cfg.normalized_endpoint();
        if endpoint.is_empty() {
            return Err(ModelError::MissingField("endpoint"));
        }
        url::Url::parse(endpoint).map_err(|e| {
            ModelError::invalid_provider(format!("endpoint '{}' is not a valid URL: {}", endpoint, e))
        })?;

        if cfg.deployments.video.trim().is_empty() {
            return Err(ModelError::MissingField("deployments.video"));
        }

        let has_version = cfg
            .api_version
            .as_deref()
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);

        match (cfg.api_variant, has_version) {
            (ApiVariant::DeploymentPath, false) => Err(ModelError::MissingField("api_version")),
            (ApiVariant::VersionedPath, true) => Err(ModelError::invalid_provider(
                "api_version is only valid for deployment-addressed endpoints",
            )),
            _ => Ok(()),
        }
    }

    /// Validate the shape of a caller credential for this provider.
    pub fn validate_credential(&self, credential: &str) -> ModelResult<()> {
        let credential = credential.trim();
        match self {
            ProviderConfig::Hosted if !credential.starts_with(HOSTED_KEY_PREFIX) => Err(
                ModelError::invalid_credential(format!("hosted keys start with '{}'", HOSTED_KEY_PREFIX)),
            ),
            ProviderConfig::SelfHosted(_) if credential.is_empty() => {
                Err(ModelError::MissingField("api key"))
            }
            _ => Ok(()),
        }
    }
}

//! Address and authentication derivation.
//!
//! Every request URL and auth header is a pure function of the
//! [`ProviderConfig`]. Call sites never branch on the provider themselves.

use url::Url;
use vchain_models::{ApiVariant, JobId, ProviderConfig};

use crate::error::{ProviderError, ProviderResult};

/// Which deployment a request is addressed to on a deployment-path gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Video,
    Planner,
    Image,
}

/// Authentication header for a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Bearer <key>`
    Bearer(String),
    /// `api-key: <key>`
    ApiKey(String),
}

impl Auth {
    /// Pick the header family for `config`.
    pub fn for_provider(config: &ProviderConfig, credential: &str) -> Self {
        let credential = credential.trim().to_string();
        match config {
            ProviderConfig::Hosted => Auth::Bearer(credential),
            ProviderConfig::SelfHosted(_) => Auth::ApiKey(credential),
        }
    }

    /// Header name and value.
    pub fn header(&self) -> (&'static str, String) {
        match self {
            Auth::Bearer(key) => ("Authorization", format!("Bearer {}", key)),
            Auth::ApiKey(key) => ("api-key", key.clone()),
        }
    }

    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let (name, value) = self.header();
        request.header(name, value)
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Bearer(_) => f.write_str("Auth::Bearer(***)"),
            Auth::ApiKey(_) => f.write_str("Auth::ApiKey(***)"),
        }
    }
}

/// URL builder for one provider configuration.
#[derive(Debug, Clone)]
pub struct Endpoints<'a> {
    config: &'a ProviderConfig,
    hosted_base: &'a str,
}

impl<'a> Endpoints<'a> {
    pub fn new(config: &'a ProviderConfig, hosted_base: &'a str) -> Self {
        Self {
            config,
            hosted_base,
        }
    }

    /// Resolve `path` (starting with `/`) for `capability`.
    pub fn url(&self, capability: Capability, path: &str) -> ProviderResult<Url> {
        let raw = match self.config {
            ProviderConfig::Hosted => format!("{}{}", self.hosted_base.trim_end_matches('/'), path),
            ProviderConfig::SelfHosted(cfg) => {
                let endpoint = cfg.normalized_endpoint();
                match cfg.api_variant {
                    ApiVariant::VersionedPath => format!("{}/openai/v1{}", endpoint, path),
                    ApiVariant::DeploymentPath => {
                        let deployment = match capability {
                            Capability::Video => Some(cfg.deployments.video.as_str()),
                            Capability::Planner => Some(cfg.deployments.planner.as_str()),
                            Capability::Image => cfg.deployments.image_or_fallback(),
                        }
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .ok_or_else(|| {
                            ProviderError::validation(format!(
                                "no deployment configured for {:?} requests",
                                capability
                            ))
                        })?;
                        format!(
                            "{}/openai/deployments/{}{}",
                            endpoint,
                            urlencoding::encode(deployment),
                            path
                        )
                    }
                }
            }
        };

        let mut url = Url::parse(&raw)
            .map_err(|e| ProviderError::validation(format!("invalid provider URL '{}': {}", raw, e)))?;

        if let Some(version) = self.api_version() {
            url.query_pairs_mut().append_pair("api-version", version);
        }
        Ok(url)
    }

    fn api_version(&self) -> Option<&'a str> {
        match self.config {
            ProviderConfig::SelfHosted(cfg) if cfg.api_variant == ApiVariant::DeploymentPath => {
                cfg.api_version.as_deref().map(str::trim)
            }
            _ => None,
        }
    }

    /// `POST /videos`
    pub fn create_video(&self) -> ProviderResult<Url> {
        self.url(Capability::Video, "/videos")
    }

    /// `GET /videos/{id}`
    pub fn video(&self, id: &JobId) -> ProviderResult<Url> {
        self.url(Capability::Video, &format!("/videos/{}", urlencoding::encode(id.as_str())))
    }

    /// `GET /videos/{id}/content?variant=video`
    pub fn content(&self, id: &JobId) -> ProviderResult<Url> {
        let mut url = self.url(
            Capability::Video,
            &format!("/videos/{}/content", urlencoding::encode(id.as_str())),
        )?;
        url.query_pairs_mut().append_pair("variant", "video");
        Ok(url)
    }

    /// `POST /videos/{id}/remix`
    pub fn remix(&self, parent: &JobId) -> ProviderResult<Url> {
        self.url(
            Capability::Video,
            &format!("/videos/{}/remix", urlencoding::encode(parent.as_str())),
        )
    }

    /// `POST /chat/completions`
    pub fn chat(&self) -> ProviderResult<Url> {
        self.url(Capability::Planner, "/chat/completions")
    }

    /// `POST /images/generations`
    pub fn images(&self) -> ProviderResult<Url> {
        self.url(Capability::Image, "/images/generations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vchain_models::{DeploymentNames, SelfHostedConfig};

    const HOSTED: &str = "https://api.openai.com/v1";

    fn names() -> DeploymentNames {
        DeploymentNames {
            video: "sora".into(),
            planner: "gpt-4o".into(),
            image: None,
        }
    }

    #[test]
    fn test_hosted_paths() {
        let config = ProviderConfig::Hosted;
        let ep = Endpoints::new(&config, HOSTED);
        assert_eq!(ep.create_video().unwrap().as_str(), "https://api.openai.com/v1/videos");
        assert_eq!(
            ep.content(&JobId::from("video_1")).unwrap().as_str(),
            "https://api.openai.com/v1/videos/video_1/content?variant=video"
        );
        assert_eq!(
            ep.remix(&JobId::from("video_1")).unwrap().as_str(),
            "https://api.openai.com/v1/videos/video_1/remix"
        );
        assert_eq!(ep.chat().unwrap().as_str(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_versioned_path() {
        let config = ProviderConfig::SelfHosted(SelfHostedConfig::versioned("https://gw.example.com/", names()));
        let ep = Endpoints::new(&config, HOSTED);
        assert_eq!(
            ep.video(&JobId::from("abc")).unwrap().as_str(),
            "https://gw.example.com/openai/v1/videos/abc"
        );
        assert_eq!(
            ep.chat().unwrap().as_str(),
            "https://gw.example.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_deployment_path_carries_version() {
        let config = ProviderConfig::SelfHosted(SelfHostedConfig::deployment(
            "https://gw.example.com",
            names(),
            "2025-04-01-preview",
        ));
        let ep = Endpoints::new(&config, HOSTED);
        assert_eq!(
            ep.create_video().unwrap().as_str(),
            "https://gw.example.com/openai/deployments/sora/videos?api-version=2025-04-01-preview"
        );
        assert_eq!(
            ep.chat().unwrap().as_str(),
            "https://gw.example.com/openai/deployments/gpt-4o/chat/completions?api-version=2025-04-01-preview"
        );
        assert_eq!(
            ep.content(&JobId::from("j1")).unwrap().as_str(),
            "https://gw.example.com/openai/deployments/sora/videos/j1/content?api-version=2025-04-01-preview&variant=video"
        );
        // Image falls back to the planner deployment
        assert!(ep.images().unwrap().path().starts_with("/openai/deployments/gpt-4o/"));
    }

    #[test]
    fn test_same_config_same_address() {
        let config = ProviderConfig::SelfHosted(SelfHostedConfig::deployment("https://gw", names(), "v"));
        let a = Endpoints::new(&config, HOSTED).create_video().unwrap();
        let b = Endpoints::new(&config, "https://ignored").create_video().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_auth_family() {
        let hosted = Auth::for_provider(&ProviderConfig::Hosted, " sk-123 ");
        assert_eq!(hosted.header(), ("Authorization", "Bearer sk-123".to_string()));

        let self_hosted = Auth::for_provider(
            &ProviderConfig::SelfHosted(SelfHostedConfig::versioned("https://gw", names())),
            "key",
        );
        assert_eq!(self_hosted.header(), ("api-key", "key".to_string()));
        assert_eq!(format!("{:?}", self_hosted), "Auth::ApiKey(***)");
    }
}

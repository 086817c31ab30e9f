//! Client for video generation providers.
//!
//! Two provider families share one contract:
//! - Hosted: fixed base URL, bearer auth
//! - Self-hosted: caller-owned gateway, versioned or deployment-addressed
//!   paths, `api-key` auth
//!
//! The pipeline depends only on the [`GenerationProvider`] trait.

pub mod address;
pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
mod wire;


pub use address::{Auth, Capability, Endpoints};
pub use client::{
    GeneratedImage, GenerationProvider, ImageRequest, ProviderClient, ReferenceImages, SubmitRequest,
};
pub use config::{provider_config_from_env, ProviderClientConfig};
pub use error::{ProviderError, ProviderResult};

use std::str::FromStr;
use std::sync::Arc;

use reelsmith_core::config::{env_opt, env_or, parse_value};
use reelsmith_core::CoreError;

use crate::client::StageClient;
use crate::http::HttpStageClient;
use crate::offline::OfflineStageClient;

/// Which provider implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Http,
    Offline,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Backend::Http),
            "offline" => Ok(Backend::Offline),
            other => Err(format!("unknown backend {other:?} (expected http or offline)")),
        }
    }
}

/// Provider connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub backend: Backend,
    /// Base URL of the generation service.
    pub base_url: String,
    /// Optional bearer token forwarded on every request.
    pub token: Option<String>,
}

impl ProviderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `REELSMITH_BACKEND`        | `http`                  |
    /// | `REELSMITH_PROVIDER_URL`   | `http://localhost:8000` |
    /// | `REELSMITH_PROVIDER_TOKEN` | (none)                  |
    pub fn from_env() -> Result<Self, CoreError> {
        let backend = parse_value("REELSMITH_BACKEND", &env_or("REELSMITH_BACKEND", "http"))?;
        let base_url = env_or("REELSMITH_PROVIDER_URL", "http://localhost:8000");
        if backend == Backend::Http && !base_url.starts_with("http") {
            return Err(CoreError::Validation(format!(
                "REELSMITH_PROVIDER_URL must be an http(s) URL, got {base_url:?}"
            )));
        }
        Ok(Self {
            backend,
            base_url,
            token: env_opt("REELSMITH_PROVIDER_TOKEN"),
        })
    }

    /// Build the raw (undecorated) client for this configuration.
    ///
    /// `scene_count` only matters for the offline backend, which generates
    /// its own storyboards.
    pub fn build_client(&self, scene_count: u32) -> Arc<dyn StageClient> {
        match self.backend {
            Backend::Http => Arc::new(HttpStageClient::new(
                self.base_url.clone(),
                self.token.clone(),
            )),
            Backend::Offline => Arc::new(OfflineStageClient::new(scene_count)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("HTTP".parse::<Backend>().unwrap(), Backend::Http);
        assert_eq!("offline".parse::<Backend>().unwrap(), Backend::Offline);
        assert!("grpc".parse::<Backend>().is_err());
    }
}

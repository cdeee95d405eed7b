use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Shape of the JSON envelope returned by `POST /responses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStyle {
    /// `{"response": "..."}`
    Plain,
    /// `{"endpoint": "responses", "status": "success", "response": "..."}`
    Tagged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible API, e.g.
    /// `https://your-resource.cognitiveservices.azure.com/openai/v1/`.
    pub endpoint: String,
    /// Deployment/model name selecting the hosted model.
    pub deployment: String,
    /// Static API key. When absent, managed-identity tokens are used.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub static_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub envelope: EnvelopeStyle,
    /// Prepend "You are a helpful assistant." as a system turn.
    pub system_preamble: bool,
    /// Include a `details` field in 500 bodies. Diagnostic only.
    pub debug_errors: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            upstream: UpstreamConfig {
                endpoint: env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_else(|_| {
                    "https://your-resource.cognitiveservices.azure.com/openai/v1/".to_string()
                }),
                deployment: env::var("AZURE_OPENAI_DEPLOYMENT")
                    .unwrap_or_else(|_| "gpt-4".to_string()),
                api_key: env::var("AZURE_OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            },
            server: ServerConfig {
                bind_addr: env::var("RELAY_BIND_ADDR")
                    .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
                static_dir: env::var("RELAY_STATIC_DIR")
                    .unwrap_or_else(|_| "./static".to_string()),
            },
            relay: RelayConfig {
                envelope: match env::var("RELAY_ENVELOPE").as_deref() {
                    Ok("tagged") => EnvelopeStyle::Tagged,
                    _ => EnvelopeStyle::Plain,
                },
                system_preamble: env_bool("RELAY_SYSTEM_PREAMBLE", true),
                debug_errors: env_bool("RELAY_DEBUG_ERRORS", false),
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.upstream.endpoint.is_empty() {
            return Err(anyhow::anyhow!("upstream endpoint must not be empty"));
        }
        if !self.upstream.endpoint.starts_with("http://")
            && !self.upstream.endpoint.starts_with("https://")
        {
            return Err(anyhow::anyhow!(
                "upstream endpoint must be an http(s) URL: {}",
                self.upstream.endpoint
            ));
        }
        if self.upstream.deployment.is_empty() {
            return Err(anyhow::anyhow!("deployment name must not be empty"));
        }
        self.server
            .bind_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow::anyhow!("invalid bind address {}: {}", self.server.bind_addr, e))?;
        Ok(())
    }

    /// Upstream chat completions URL, tolerant of a missing trailing slash.
    pub fn completions_url(&self) -> String {
        if self.upstream.endpoint.ends_with('/') {
            format!("{}chat/completions", self.upstream.endpoint)
        } else {
            format!("{}/chat/completions", self.upstream.endpoint)
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

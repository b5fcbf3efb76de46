use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Prefix of the environment variables carrying one page access token each,
/// e.g. `PAGE_TOKEN_1234567890=EAAB...`.
pub const PAGE_TOKEN_PREFIX: &str = "PAGE_TOKEN_";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    #[serde(default = "default_graph_config")]
    pub graph: GraphConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
    #[serde(default)]
    pub pages: Vec<PageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Shared secret echoed back by the platform during the subscription handshake.
    pub verify_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    /// Version segment used for the Send API path (`/{version}/me/messages`).
    #[serde(default = "default_graph_api_version")]
    pub api_version: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProfilesConfig {
    /// Upper bound on cached user profiles. `None` keeps every profile for the
    /// lifetime of the process.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PageConfig {
    pub id: String,
    pub access_token: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_api_version() -> String {
    "v19.0".to_string()
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_graph_config() -> GraphConfig {
    GraphConfig {
        base_url: default_graph_base_url(),
        api_version: default_graph_api_version(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Build the configuration from the process environment.
    ///
    /// Reads `MESSENGER_VERIFY_TOKEN`, `PORT`, `GRAPH_API_BASE_URL` and every
    /// `PAGE_TOKEN_<pageId>` variable. The environment is scanned once, here.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut verify_token = None;
        let mut server = default_server_config();
        let mut graph = default_graph_config();
        let mut pages = Vec::new();

        for (key, value) in vars {
            match key.as_str() {
                "MESSENGER_VERIFY_TOKEN" => verify_token = Some(value),
                "PORT" => {
                    server.port = value
                        .parse()
                        .with_context(|| format!("PORT is not a valid port number: {}", value))?;
                }
                "GRAPH_API_BASE_URL" => graph.base_url = value,
                _ => {
                    if let Some(page_id) = key.strip_prefix(PAGE_TOKEN_PREFIX) {
                        pages.push(PageConfig {
                            id: page_id.to_string(),
                            access_token: value,
                        });
                    }
                }
            }
        }

        // Environment order is platform-defined; keep the page list stable.
        pages.sort_by(|a, b| a.id.cmp(&b.id));

        let config = Config {
            server,
            webhook: WebhookConfig {
                verify_token: verify_token.context("MESSENGER_VERIFY_TOKEN is not set")?,
            },
            graph,
            profiles: ProfilesConfig::default(),
            pages,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.webhook.verify_token.is_empty() {
            anyhow::bail!("webhook verify_token must not be empty");
        }

        let mut seen = HashSet::new();
        for page in &self.pages {
            if page.id.is_empty() {
                anyhow::bail!("page entry with an empty id");
            }
            if page.access_token.is_empty() {
                anyhow::bail!("page {} has an empty access_token", page.id);
            }
            if !seen.insert(page.id.as_str()) {
                anyhow::bail!("page {} is configured more than once", page.id);
            }
        }

        if self.profiles.max_entries == Some(0) {
            anyhow::bail!("profiles.max_entries must be greater than zero");
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

//! Configuration system (layered: env > config file > defaults).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoraError;
use crate::mcp::registry::CollisionPolicy;
use crate::mcp::transport::TransportKind;
use crate::types::ModelSettings;

/// Persona used when no `system_prompt` is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Cora, an intelligent and friendly AI assistant for Zava, a home improvement brand. You help customers with their DIY projects by understanding their needs and recommending the most suitable products from Zava's catalog.

Your role is to:
- Engage with the customer in natural conversation to understand their DIY goals.
- Ask thoughtful questions to gather relevant project details.
- Be brief in your responses.
- Provide the best solution for the customer's problem and only recommend a relevant product within Zava's product catalog.
- Search Zava's product database to identify 1 product by name that best match the customer's needs.
- Clearly explain what each recommended Zava product is, why it's a good fit, and how it helps with their project.
- When users provide images, analyze them carefully to understand what they show and how it relates to their DIY project.

Your personality is:
- Warm and welcoming, like a helpful store associate
- Professional and knowledgeable, like a seasoned DIY expert
- Curious and conversational, never assume, always clarify
- Transparent and honest, if something isn't available, offer support anyway

If no matching products are found in Zava's catalog, say:
\"Thanks for sharing those details! I've searched our catalog, but it looks like we don't currently have a product that fits your exact needs. If you'd like, I can suggest some alternatives or help you adjust your project requirements to see if something similar might work.\"";

const CONFIG_ENV_VAR: &str = "CORA_CONFIG";
const CONFIG_FILE_NAME: &str = "cora.toml";

/// Top-level configuration for an [`Orchestrator`](crate::service::Orchestrator).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CoraConfig {
    pub system_prompt: String,
    pub collision_policy: CollisionPolicy,
    pub model: ModelConfig,
    pub limits: LoopLimits,
    pub timeouts: Timeouts,
    pub servers: Vec<ServerSpec>,
}

impl Default for CoraConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            collision_policy: CollisionPolicy::default(),
            model: ModelConfig::default(),
            limits: LoopLimits::default(),
            timeouts: Timeouts::default(),
            servers: Vec::new(),
        }
    }
}

/// Which chat-completions dialect the model service speaks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelApi {
    #[default]
    OpenAi,
    Azure,
}

/// Model service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub api: ModelApi,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api: ModelApi::OpenAi,
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            api_version: "2025-01-01-preview".to_string(),
            max_tokens: Some(4096),
            temperature: None,
            top_p: None,
        }
    }
}

impl ModelConfig {
    /// Generation settings sent with every model request.
    pub fn settings(&self) -> ModelSettings {
        ModelSettings {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

/// Bounds on the tool-call loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopLimits {
    /// Maximum model round trips per user turn.
    pub max_iterations: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// Maximum waits for every I/O boundary, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    pub handshake: u64,
    pub tool_call: u64,
    pub model_request: u64,
    pub shutdown: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: 30,
            tool_call: 60,
            model_request: 120,
            shutdown: 5,
        }
    }
}

impl Timeouts {
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake)
    }

    pub fn tool_call(&self) -> Duration {
        Duration::from_secs(self.tool_call)
    }

    pub fn model_request(&self) -> Duration {
        Duration::from_secs(self.model_request)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown)
    }
}

/// One MCP server to connect to at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSpec {
    pub id: String,
    #[serde(flatten)]
    pub transport: TransportSpec,
}

impl ServerSpec {
    pub fn stdio(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            transport: TransportSpec::Stdio {
                command: command.into(),
                args,
                env: BTreeMap::new(),
            },
        }
    }

    pub fn http(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transport: TransportSpec::Http {
                url: url.into(),
                headers: BTreeMap::new(),
            },
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

/// Endpoint description for one transport kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportSpec {
    /// Spawn a child process and speak MCP over its stdio pipes.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// Streamable HTTP endpoint.
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl TransportSpec {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Http { .. } => TransportKind::StreamableHttp,
        }
    }
}

impl CoraConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, CoraError> {
        toml::from_str(raw)
            .map_err(|e| CoraError::Configuration(format!("invalid config file: {e}")))
    }

    /// Read a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoraError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoraError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Default config file location (`<config dir>/cora/cora.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cora")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load configuration the way the binary does.
    ///
    /// Resolution order for the file: `explicit`, then `$CORA_CONFIG`, then
    /// the default path when it exists, else built-in defaults. Environment
    /// variables (after loading `.env`) override the model section.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CoraError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(|| Self::default_path().filter(|path| path.exists()));

        let mut config = match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading cora config");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api) = lookup("CORA_MODEL_API").and_then(|raw| raw.parse().ok()) {
            self.model.api = api;
        }
        if let Some(model) = lookup("CORA_MODEL") {
            self.model.model = model;
        }
        if let Some(max) = lookup("CORA_MAX_ITERATIONS").and_then(|raw| raw.parse().ok()) {
            self.limits.max_iterations = max;
        }

        let (key_var, url_var) = match self.model.api {
            ModelApi::OpenAi => ("OPENAI_API_KEY", "OPENAI_BASE_URL"),
            ModelApi::Azure => ("AZURE_AI_API_KEY", "AZURE_AI_ENDPOINT"),
        };
        if let Some(key) = lookup(key_var) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup(url_var) {
            self.model.base_url = Some(url);
        }
    }

    /// Check invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), CoraError> {
        if self.limits.max_iterations == 0 {
            return Err(CoraError::Configuration(
                "limits.max_iterations must be at least 1".into(),
            ));
        }
        let timeouts = [
            ("handshake", self.timeouts.handshake),
            ("tool_call", self.timeouts.tool_call),
            ("model_request", self.timeouts.model_request),
            ("shutdown", self.timeouts.shutdown),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(CoraError::Configuration(format!(
                "timeouts.{name} must be at least 1 second"
            )));
        }

        let mut seen = HashSet::with_capacity(self.servers.len());
        for server in &self.servers {
            let id = server.id.trim();
            if id.is_empty() {
                return Err(CoraError::Configuration(
                    "MCP server id must not be empty".into(),
                ));
            }
            if !seen.insert(id) {
                return Err(CoraError::Configuration(format!(
                    "Duplicate MCP server id '{id}'"
                )));
            }
        }
        Ok(())
    }
}

//! Tests for configuration loading from files and the environment.

use std::io::Write;
use std::sync::{Mutex, OnceLock};

use cora::config::{CoraConfig, ModelApi};
use cora::error::CoraError;
use cora::mcp::CollisionPolicy;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 8] = [
    "CORA_CONFIG",
    "CORA_MODEL_API",
    "CORA_MODEL",
    "CORA_MAX_ITERATIONS",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "AZURE_AI_ENDPOINT",
    "AZURE_AI_API_KEY",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clean_env() -> EnvGuard {
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file should be created");
    file.write_all(contents.as_bytes()).expect("write should succeed");
    file
}

#[test]
fn load_uses_cora_config_env_var() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    let file = write_config(
        r#"
collision_policy = "reject"

[[servers]]
id = "zava-customer-sales"
transport = "stdio"
command = "python"
args = ["customer_sales.py", "--stdio"]
"#,
    );
    std::env::set_var("CORA_CONFIG", file.path());

    let config = CoraConfig::load(None).expect("config should load");
    assert_eq!(config.collision_policy, CollisionPolicy::Reject);
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].id, "zava-customer-sales");
}

#[test]
fn environment_overrides_file_values() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    let file = write_config(
        r#"
[model]
api = "openai"
model = "gpt-4o-mini"
api_key = "from-file"

[limits]
max_iterations = 8
"#,
    );
    std::env::set_var("CORA_MODEL", "gpt-4o");
    std::env::set_var("OPENAI_API_KEY", "from-env");
    std::env::set_var("OPENAI_BASE_URL", "http://localhost:9999/v1");
    std::env::set_var("CORA_MAX_ITERATIONS", "2");

    let config = CoraConfig::load(Some(file.path())).expect("config should load");
    assert_eq!(config.model.api, ModelApi::OpenAi);
    assert_eq!(config.model.model, "gpt-4o");
    assert_eq!(config.model.api_key.as_deref(), Some("from-env"));
    assert_eq!(config.model.base_url.as_deref(), Some("http://localhost:9999/v1"));
    assert_eq!(config.limits.max_iterations, 2);
}

#[test]
fn zero_iterations_from_environment_fails_validation() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    let file = write_config("");
    std::env::set_var("CORA_MAX_ITERATIONS", "0");

    let err = CoraConfig::load(Some(file.path())).expect_err("zero iterations must be rejected");
    assert!(matches!(err, CoraError::Configuration(msg) if msg.contains("max_iterations")));
}

#[test]
fn malformed_file_is_configuration_error() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    let file = write_config("[[servers]]\nid = \"x\"\ntransport = \"carrier-pigeon\"\n");
    let err = CoraConfig::load(Some(file.path())).expect_err("unknown transport must fail");
    assert!(matches!(err, CoraError::Configuration(_)));
}

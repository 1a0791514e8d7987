use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub state: StateConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// Base URL of the remote store API, e.g. `https://store.example.com/v1`.
    pub base_url: String,
    /// Id of the traversal root folder.
    #[serde(default = "default_root_id")]
    pub root_id: String,
}

fn default_root_id() -> String {
    "root".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    /// Directory holding the ledger, knowledge store, and index artifacts.
    pub dir: PathBuf,
}

/// Pipeline policy knobs. The defaults mirror the constants the original
/// deployment ran with; all of them are deliberate configuration, not
/// hard-coded behavior.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Items larger than this are quarantined without extraction.
    #[serde(default = "default_size_ceiling")]
    pub size_ceiling_bytes: u64,
    /// Extracted text shorter than this counts as unreadable.
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
    /// Run-local population an extension needs before its mapped bucket is
    /// used instead of Miscellaneous.
    #[serde(default = "default_classify_threshold")]
    pub classify_threshold: usize,
    /// Chunked-download attempts before an item fails as transient I/O.
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,
    /// Wall-clock budget for one item, independent of the retry cap.
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            size_ceiling_bytes: default_size_ceiling(),
            min_text_len: default_min_text_len(),
            classify_threshold: default_classify_threshold(),
            download_retries: default_download_retries(),
            item_timeout_secs: default_item_timeout_secs(),
        }
    }
}

fn default_size_ceiling() -> u64 {
    50 * 1024 * 1024
}
fn default_min_text_len() -> usize {
    10
}
fn default_classify_threshold() -> usize {
    10
}
fn default_download_retries() -> u32 {
    20
}
fn default_item_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hash`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.remote.base_url.is_empty() {
        anyhow::bail!("remote.base_url must not be empty");
    }

    if config.limits.size_ceiling_bytes == 0 {
        anyhow::bail!("limits.size_ceiling_bytes must be > 0");
    }

    if config.limits.download_retries == 0 {
        anyhow::bail!("limits.download_retries must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
            other
        ),
    }

    if config.embedding.provider != "hash" && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config(
            r#"
[remote]
base_url = "https://store.example.com/v1"

[state]
dir = "/tmp/curator-state"
"#,
        );
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.limits.size_ceiling_bytes, 50 * 1024 * 1024);
        assert_eq!(config.limits.classify_threshold, 10);
        assert_eq!(config.limits.download_retries, 20);
        assert_eq!(config.limits.min_text_len, 10);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.remote.root_id, "root");
    }

    #[test]
    fn rejects_unknown_embedding_provider() {
        let f = write_config(
            r#"
[remote]
base_url = "https://store.example.com/v1"

[state]
dir = "/tmp/curator-state"

[embedding]
provider = "word2vec"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn remote_provider_requires_model() {
        let f = write_config(
            r#"
[remote]
base_url = "https://store.example.com/v1"

[state]
dir = "/tmp/curator-state"

[embedding]
provider = "openai"
dims = 1536
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}

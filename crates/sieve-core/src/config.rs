use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::types::SearchMode;

pub const CONFIG_FILE: &str = "sieve.toml";
pub const ENV_PREFIX: &str = "SIEVE_";

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("SIEVE_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join(CONFIG_FILE)));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("sieve.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("sieve.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("sieve.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.validate()?;
        Ok(config)
    }

    /// Builds a config from an inline TOML document, resolving paths against `base_dir`.
    pub fn from_toml_str(toml: &str, base_dir: &Path) -> anyhow::Result<Self> {
        let config = Self { figment: Figment::new().merge(Toml::string(toml)), base_dir: base_dir.to_path_buf() };
        config.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The full typed settings tree, with defaults for anything unset.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        if let Some(dir) = settings.store.persist_directory.take() {
            let resolved = resolve_with_base(&self.base_dir, &dir);
            settings.store.persist_directory = Some(resolved.to_string_lossy().into_owned());
        }
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if settings.search.number_of_results == 0 {
            anyhow::bail!("search.number_of_results must be at least 1");
        }
        if !(0.0..=1.0).contains(&settings.search.mmr_lambda) {
            anyhow::bail!("search.mmr_lambda must be within [0, 1], got {}", settings.search.mmr_lambda);
        }
        if settings.filter.concurrency == 0 {
            anyhow::bail!("filter.concurrency must be at least 1");
        }
        if settings.store.server.is_some() && settings.store.persist_directory.is_some() {
            tracing::warn!("both store.server and store.persist_directory are set; the server wins");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub ingest: IngestSettings,
    pub search: SearchSettings,
    pub filter: FilterSettings,
    pub embedding: EmbeddingSettings,
    pub llm: Option<LlmSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub collection_name: String,
    pub persist_directory: Option<String>,
    pub server: Option<ServerSettings>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { collection_name: "sieve".to_string(), persist_directory: None, server: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_database")]
    pub database: String,
}

impl ServerSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ssl: false, tenant: default_tenant(), database: default_database() }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Root of the v2 REST API for the configured tenant and database.
    pub fn database_url(&self) -> String {
        format!("{}/api/v2/tenants/{}/databases/{}", self.base_url(), self.tenant, self.database)
    }
}

fn default_server_port() -> u16 {
    8000
}

fn default_tenant() -> String {
    "default_tenant".to_string()
}

fn default_database() -> String {
    "default_database".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// When false, documents already present in the store are skipped.
    pub allow_duplicates: bool,
    /// Bounds how many stored documents are compared against; unset means all.
    pub limit: Option<usize>,
}

/// Whether a later search replaces the cached result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// First successful search sticks for the component's lifetime.
    #[default]
    Sticky,
    /// Every search replaces the cache.
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub search_type: SearchMode,
    pub number_of_results: usize,
    pub mmr_fetch_k: usize,
    pub mmr_lambda: f32,
    pub cache_policy: CachePolicy,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            search_type: SearchMode::Similarity,
            number_of_results: 10,
            mmr_fetch_k: 20,
            mmr_lambda: 0.5,
            cache_policy: CachePolicy::Sticky,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStrategy {
    /// One model call per candidate; a failed call drops that candidate.
    Sequential,
    /// One model call for all candidates; any failure keeps them all.
    #[default]
    Batched,
}

/// Verdict for candidates the batched reply has no flag for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub enabled: bool,
    pub strategy: FilterStrategy,
    pub max_content_chars: usize,
    pub concurrency: usize,
    pub out_of_range: OutOfRangePolicy,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: FilterStrategy::Batched,
            max_content_chars: 2000,
            concurrency: 1,
            out_of_range: OutOfRangePolicy::Include,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    None,
    #[default]
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Vector width. Unset means the provider's default for `model`.
    pub dimension: Option<usize>,
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dimension: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
        }
    }
}

const HASHING_DIMENSION: usize = 384;

/// Output widths of the hosted OpenAI embedding models.
fn openai_model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

impl EmbeddingSettings {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| env::var("SIEVE_EMBEDDING_API_KEY").ok())
    }

    /// The configured dimension, or the provider's default for `model`.
    /// `None` when neither is known, e.g. a self-hosted model without `dimension`.
    pub fn resolved_dimension(&self) -> Option<usize> {
        self.dimension.or(match self.provider {
            EmbeddingProvider::None => None,
            EmbeddingProvider::Hashing => Some(HASHING_DIMENSION),
            EmbeddingProvider::OpenAi => openai_model_dimension(&self.model),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl LlmSettings {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| env::var("SIEVE_LLM_API_KEY").ok())
    }
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub firestore: FirestoreConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
}

/// The storage backend selected at startup.
///
/// Read from `storage.backend`, overridable with the `TOOLDEX_BACKEND`
/// environment variable. Unknown and absent values select the local
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Rest,
    Firestore,
    Supabase,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(BackendKind::Local),
            "rest" => Some(BackendKind::Rest),
            "firestore" => Some(BackendKind::Firestore),
            "supabase" => Some(BackendKind::Supabase),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

impl StorageConfig {
    /// Resolved backend selection. Unknown names fall back to local with
    /// a warning, once, at first resolution.
    pub fn kind(&self) -> BackendKind {
        match BackendKind::parse(&self.backend) {
            Some(kind) => kind,
            None => {
                tracing::warn!(backend = %self.backend, "unknown storage backend, using local");
                BackendKind::Local
            }
        }
    }
}

fn default_backend() -> String {
    "local".to_string()
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./data/store")
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Optional path to a dataset file replacing the bundled catalog.
    #[serde(default)]
    pub dataset: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            dataset: None,
        }
    }
}

fn default_page_size() -> usize {
    12
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
    "127.0.0.1:7420".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RestConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FirestoreConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn override_from_env(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        if !value.is_empty() {
            *target = value;
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Environment overrides, read once here: backend selection plus the
    // remote-service connection details.
    if let Ok(backend) = std::env::var("TOOLDEX_BACKEND") {
        if !backend.is_empty() {
            config.storage.backend = backend;
        }
    }
    override_from_env(&mut config.rest.base_url, "TOOLDEX_REST_URL");
    override_from_env(&mut config.firestore.project_id, "TOOLDEX_FIRESTORE_PROJECT");
    override_from_env(&mut config.firestore.api_key, "TOOLDEX_FIRESTORE_API_KEY");
    override_from_env(&mut config.supabase.url, "TOOLDEX_SUPABASE_URL");
    override_from_env(&mut config.supabase.anon_key, "TOOLDEX_SUPABASE_ANON_KEY");

    if config.catalog.page_size == 0 {
        anyhow::bail!("catalog.page_size must be >= 1");
    }

    if config.storage.kind() == BackendKind::Rest && config.rest.base_url.is_empty() {
        anyhow::bail!("rest.base_url must be set when storage.backend is 'rest'");
    }

    if config.server.bind.is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    Ok(config)
}

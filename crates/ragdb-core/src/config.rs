//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_ENGINE__TOP_K=10`). Every section
//! has defaults, so running without any file is fine.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of the whole configuration, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub storage: StorageSettings,
    pub embedding: EmbeddingSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        let e = &self.engine;
        for (name, w) in [("vector_weight", e.vector_weight), ("lexical_weight", e.lexical_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!("engine.{name} must be finite and >= 0, got {w}")));
            }
        }
        if e.top_k == 0 {
            return Err(Error::InvalidConfig("engine.top_k must be >= 1".into()));
        }
        if e.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("engine.candidate_multiplier must be >= 1".into()));
        }
        if e.batch_size == 0 {
            return Err(Error::InvalidConfig("engine.batch_size must be >= 1".into()));
        }
        if e.collection_name.trim().is_empty() {
            return Err(Error::InvalidConfig("engine.collection_name must not be empty".into()));
        }
        if !(e.bm25.k1.is_finite() && e.bm25.k1 >= 0.0) {
            return Err(Error::InvalidConfig(format!("engine.bm25.k1 must be >= 0, got {}", e.bm25.k1)));
        }
        if !(0.0..=1.0).contains(&e.bm25.b) {
            return Err(Error::InvalidConfig(format!("engine.bm25.b must be within [0, 1], got {}", e.bm25.b)));
        }
        if self.embedding.fake_dim == 0 {
            return Err(Error::InvalidConfig("embedding.fake_dim must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub collection_name: String,
    pub top_k: usize,
    pub vector_weight: f32,
    pub lexical_weight: f32,
    /// Each sub-search fetches `candidate_multiplier * top_k` candidates.
    pub candidate_multiplier: usize,
    /// Chunks per ingestion batch when a caller streams a large input.
    pub batch_size: usize,
    pub bm25: Bm25Params,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            collection_name: "documents".to_string(),
            top_k: 5,
            vector_weight: 0.3,
            lexical_weight: 0.7,
            candidate_multiplier: 2,
            batch_size: 64,
            bm25: Bm25Params::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub lancedb_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { lancedb_dir: "./data/lancedb".to_string() }
    }
}

impl StorageSettings {
    pub fn lancedb_path(&self) -> PathBuf {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        resolve_with_base(&cwd, &self.lancedb_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub use_fake: bool,
    pub fake_dim: usize,
    /// Token budget per text for the local model.
    pub max_len: usize,
    /// `auto`, `cpu`, `cuda` or `metal`.
    pub device: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, use_fake: false, fake_dim: 384, max_len: 512, device: "auto".to_string() }
    }
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

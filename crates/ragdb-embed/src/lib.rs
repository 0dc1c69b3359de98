//! Embedding providers.
//!
//! - [`EmbeddingModel`]: local BERT-family sentence encoder (e.g. bge-small-en-v1.5)
//! - [`FakeEmbedder`]: deterministic hashed bag-of-words, for tests and offline work
//! - [`UnavailableEmbedder`]: stands in when no model can be located, so callers
//!   take their deterministic fallback path
//!
//! [`get_default_embedder`] picks one from configuration.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use ragdb_core::config::{expand_path, EmbeddingSettings};
use ragdb_core::error::EmbedError;
use ragdb_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use device::{DevicePreference, select_device};
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_on_device;

pub struct EmbeddingModel { model: BertModel, tokenizer: Tokenizer, device: Device, max_len: usize, id: String }

impl EmbeddingModel {
    /// Load `tokenizer.json`, `config.json` and `model.safetensors` (or
    /// `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, max_len: usize, device: DevicePreference) -> Result<Self> {
        let device = select_device(device)?;
        info!(dir = %model_dir.display(), "loading embedding model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        let name = model_dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "model".to_string());
        let id = format!("local:{}:d{}", name, config.hidden_size);
        info!(%id, "embedding model loaded");
        Ok(Self { model, tokenizer, device, max_len, id })
    }

    pub fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let emb = pooled.squeeze(0)?.to_device(&Device::Cpu)?.to_vec1::<f32>()?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, dim = emb.len(), "embedded text");
        Ok(emb)
    }
}

impl Embedder for EmbeddingModel {
    fn id(&self) -> &str { &self.id }

    fn embed_text(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        let emb = self.encode(text).map_err(|e| EmbedError::Failed(e.to_string()))?;
        if emb.is_empty() || emb.iter().any(|x| !x.is_finite()) {
            return Err(EmbedError::Failed("model produced an empty or non-finite vector".into()));
        }
        Ok(emb)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        return Ok(candle_core::pickle::read_all(&pickle)?.into_iter().collect());
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

/// Hashed bag-of-words embedding. Texts sharing words land close together,
/// which is enough to exercise vector search without a model.
pub struct FakeEmbedder { dim: usize, id: String }

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim, id: format!("fake:d{dim}") } }

    pub fn dim(&self) -> usize { self.dim }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str { &self.id }

    fn embed_text(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        use std::hash::{Hash, Hasher}; use twox_hash::XxHash64;
        if self.dim == 0 { return Err(EmbedError::Failed("fake embedder configured with dim 0".into())); }
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace().map(str::to_lowercase) {
            let mut hasher = XxHash64::with_seed(0); token.hash(&mut hasher); let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6); for x in &mut v { *x /= norm; } Ok(v)
    }
}

/// Always reports [`EmbedError::Unavailable`].
pub struct UnavailableEmbedder { reason: String }

impl UnavailableEmbedder {
    pub fn new(reason: impl Into<String>) -> Self { Self { reason: reason.into() } }
}

impl Embedder for UnavailableEmbedder {
    fn id(&self) -> &str { "unavailable" }

    fn embed_text(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Unavailable(self.reason.clone()))
    }
}

fn fake_forced() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Box<dyn Embedder> {
    if settings.use_fake || fake_forced() {
        info!(dim = settings.fake_dim, "using FakeEmbedder");
        return Box::new(FakeEmbedder::new(settings.fake_dim));
    }
    let Some(dir) = resolve_model_dir(settings.model_dir.as_deref()) else {
        warn!("no embedding model directory found; vectors will use the content-hash fallback");
        return Box::new(UnavailableEmbedder::new("no model directory"));
    };
    let loaded = settings.device.parse().and_then(|pref| EmbeddingModel::load(&dir, settings.max_len, pref));
    match loaded {
        Ok(model) => Box::new(model),
        Err(e) => {
            warn!(error = %e, dir = %dir.display(), "embedding model failed to load");
            Box::new(UnavailableEmbedder::new(e.to_string()))
        }
    }
}

fn resolve_model_dir(configured: Option<&str>) -> Option<PathBuf> {
    let candidates = configured
        .map(expand_path)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([PathBuf::from("models/bge-small-en-v1.5"), PathBuf::from("../models/bge-small-en-v1.5")]);
    for p in candidates {
        if p.exists() { debug!(dir = %p.display(), "resolved model dir"); return Some(p); }
    }
    None
}

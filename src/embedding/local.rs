use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::Deserialize;
use tokenizers::{
    PaddingParams,
    PaddingStrategy,
    Tokenizer,
    TruncationParams,
};
use tracing::info;

use super::Embedder;
use crate::{
    config::DEFAULT_BATCH_SIZE,
    error::{Error, Result},
};

/// Longest input, in tokens, fed to the model.
pub const DEFAULT_MAX_LENGTH: usize = 256;

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

#[derive(Debug, Deserialize)]
struct ModelDims {
    hidden_size: usize,
}

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl ModelFiles {
    /// Locate model files in a local directory, or download them from the
    /// HuggingFace Hub.
    fn resolve(model_id: &str) -> Result<Self> {
        let local = Path::new(model_id);
        if local.is_dir() {
            return Ok(Self {
                config: local.join("config.json"),
                tokenizer: local.join("tokenizer.json"),
                weights: local.join("model.safetensors"),
            });
        }

        let api = hf_hub::api::sync::Api::new()?;
        let repo = api.model(model_id.to_string());
        Ok(Self {
            config: repo.get("config.json")?,
            tokenizer: repo.get("tokenizer.json")?,
            weights: repo.get("model.safetensors")?,
        })
    }
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl LoadedModel {
    fn load(model_id: &str, max_length: usize) -> Result<Self> {
        info!(model = model_id, "loading embedding model");
        let files = ModelFiles::resolve(model_id)?;

        let config_text = std::fs::read_to_string(&files.config)?;
        let config: BertConfig = serde_json::from_str(&config_text)?;
        let dims: ModelDims = serde_json::from_str(&config_text)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tokenizer.with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))?;

        let device = default_device();
        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[&files.weights],
                DType::F32,
                &device,
            )?
        };
        let model = BertModel::load(vb, &config)?;
        info!(
            model = model_id,
            dimension = dims.hidden_size,
            "embedding model loaded"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension: dims.hidden_size,
        })
    }

    /// Mean-pooled, L2-normalized sentence embeddings for one batch.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self.tokenizer.encode_batch(texts.to_vec(), true)?;
        let batch = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());

        let mut ids = Vec::with_capacity(batch * seq_len);
        let mut type_ids = Vec::with_capacity(batch * seq_len);
        let mut mask = Vec::with_capacity(batch * seq_len);
        for encoding in &encodings {
            ids.extend_from_slice(encoding.get_ids());
            type_ids.extend_from_slice(encoding.get_type_ids());
            mask.extend_from_slice(encoding.get_attention_mask());
        }

        let ids = Tensor::from_vec(ids, (batch, seq_len), &self.device)?;
        let type_ids =
            Tensor::from_vec(type_ids, (batch, seq_len), &self.device)?;
        let mask = Tensor::from_vec(mask, (batch, seq_len), &self.device)?;

        let hidden = self.model.forward(&ids, &type_ids, Some(&mask))?;

        // Mean pooling over non-padding tokens.
        let mask = mask.unsqueeze(2)?.to_dtype(hidden.dtype())?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
        let pooled = summed.broadcast_div(&counts)?;

        let norms = pooled
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .clamp(1e-12, f64::MAX)?;
        let normalized = pooled.broadcast_div(&norms)?;

        Ok(normalized.to_vec2::<f32>()?)
    }
}

/// Sentence embeddings from a BERT-family model run on this machine.
///
/// The model is downloaded (or read from a local directory) and loaded on
/// first use, then reused for every subsequent call.
pub struct LocalEmbedder {
    model_id: String,
    batch_size: usize,
    max_length: usize,
    model: OnceLock<LoadedModel>,
}

impl LocalEmbedder {
    /// `model_id` is a HuggingFace Hub repository or a local directory with
    /// `config.json`, `tokenizer.json` and `model.safetensors`.
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_length: DEFAULT_MAX_LENGTH,
            model: OnceLock::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    /// Returns `true` if the model has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    fn ensure_loaded(&self) -> Result<&LoadedModel> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }
        let loaded = LoadedModel::load(&self.model_id, self.max_length)?;
        // A concurrent caller may have won the race; either copy is usable.
        let _ = self.model.set(loaded);
        self.model.get().ok_or_else(|| Error::Embedding {
            provider: "local",
            message: format!("model {} failed to initialize", self.model_id),
        })
    }
}

impl std::fmt::Debug for LocalEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedder")
            .field("model_id", &self.model_id)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl Embedder for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> Result<usize> {
        Ok(self.ensure_loaded()?.dimension)
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.ensure_loaded()?;
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(model.encode(batch)?);
        }
        Ok(embeddings)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.ensure_loaded()?;
        model
            .encode(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Embedding {
                provider: "local",
                message: "model returned no embedding for query".to_string(),
            })
    }
}

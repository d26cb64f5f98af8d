use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::util::{clamp_text, ensure_directory, sha256_hex};

const GENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub model_name: String,
    pub max_chars: usize,
    pub max_pages: usize,
}

impl EmbeddingSettings {
    pub fn disabled(max_pages: usize) -> Self {
        Self {
            enabled: false,
            api_key: None,
            model_name: String::new(),
            max_chars: 0,
            max_pages,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedEmbedding {
    embedding: Vec<f32>,
}

/// Content-addressed store mapping (model, text) to a vector. Entries are
/// one JSON file per key and never expire; the hash key makes re-computing
/// and re-writing the same entry from concurrent workers harmless.
pub struct EmbeddingStore {
    cache_dir: PathBuf,
    pub settings: EmbeddingSettings,
}

impl EmbeddingStore {
    pub fn new(cache_dir: PathBuf, settings: EmbeddingSettings) -> Self {
        Self {
            cache_dir,
            settings,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled && self.settings.api_key.is_some()
    }

    fn cache_path(&self, text: &str) -> PathBuf {
        let digest = sha256_hex(&format!("{}::{}", self.settings.model_name, text));
        self.cache_dir.join(format!("{digest}.json"))
    }

    fn load_cached(path: &Path) -> Option<Vec<f32>> {
        let raw = fs::read(path).ok()?;
        let payload: CachedEmbedding = serde_json::from_slice(&raw).ok()?;
        if payload.embedding.is_empty() {
            return None;
        }
        Some(payload.embedding)
    }

    fn save_cached(&self, path: &Path, embedding: &[f32]) {
        if ensure_directory(&self.cache_dir).is_err() {
            return;
        }
        let payload = CachedEmbedding {
            embedding: embedding.to_vec(),
        };
        match serde_json::to_vec(&payload) {
            Ok(data) => {
                if let Err(error) = fs::write(path, data) {
                    warn!(path = %path.display(), error = %error, "failed to write embedding cache entry");
                }
            }
            Err(error) => {
                warn!(error = %error, "failed to serialize embedding cache entry");
            }
        }
    }

    /// Returns `None` when embeddings are disabled, the service fails, or
    /// the service returns an empty vector; callers score those pages on
    /// base signals only.
    pub fn embed_text(&self, text: &str) -> Option<Vec<f32>> {
        if !self.is_enabled() {
            return None;
        }
        let api_key = self.settings.api_key.as_deref()?;

        let clipped = clamp_text(text, self.settings.max_chars);
        let cache_path = self.cache_path(clipped);
        if let Some(cached) = Self::load_cached(&cache_path) {
            return Some(cached);
        }

        let embedding = request_embedding(api_key, &self.settings.model_name, clipped)?;
        if embedding.is_empty() {
            return None;
        }
        self.save_cached(&cache_path, &embedding);
        Some(embedding)
    }
}

fn request_embedding(api_key: &str, model_name: &str, text: &str) -> Option<Vec<f32>> {
    let model = qualified_model(model_name);
    let url = format!("{GENAI_BASE_URL}/{model}:embedContent?key={api_key}");
    let body = serde_json::json!({
        "model": model,
        "content": { "parts": [ { "text": text } ] },
    });

    let response = match ureq::post(&url).send_json(body) {
        Ok(response) => response,
        Err(error) => {
            warn!(model = %model, error = %error, "embedding request failed");
            return None;
        }
    };

    let value: serde_json::Value = match response.into_json() {
        Ok(value) => value,
        Err(error) => {
            warn!(model = %model, error = %error, "embedding response was not valid json");
            return None;
        }
    };

    let values = value
        .get("embedding")
        .and_then(|embedding| embedding.get("values"))
        .and_then(|values| values.as_array())?;

    Some(
        values
            .iter()
            .filter_map(|entry| entry.as_f64())
            .map(|entry| entry as f32)
            .collect(),
    )
}

pub fn qualified_model(name: &str) -> String {
    if name.starts_with("models/") {
        name.to_string()
    } else {
        format!("models/{name}")
    }
}

/// Cosine similarity over raw (not necessarily normalized) vectors.
/// Mismatched lengths and zero-norm inputs score 0.0 rather than erroring.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_left = 0.0_f64;
    let mut norm_right = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let a = f64::from(*left_value);
        let b = f64::from(*right_value);
        dot += a * b;
        norm_left += a * a;
        norm_right += b * b;
    }

    if norm_left <= 0.0 || norm_right <= 0.0 {
        return 0.0;
    }

    dot / (norm_left.sqrt() * norm_right.sqrt())
}

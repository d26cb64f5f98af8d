use std::path::PathBuf;

use crate::cli::{ExtractArgs, ExtractionMode, ExtractionStrategy, LlmProvider, SectionArg};
use crate::model::RunSettingsSummary;
use crate::semantic::EmbeddingSettings;

use super::selector::Section;

/// Resolved run configuration. Built once per run from the CLI arguments
/// plus `GEMINI_API_KEY` from the environment, then shared read-only by
/// every document worker.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub limit: Option<usize>,
    pub strategy: ExtractionStrategy,
    pub mode: ExtractionMode,
    pub provider: LlmProvider,
    pub model_name: String,
    pub retry_model: Option<String>,
    pub max_chars: usize,
    pub focus_min_chars: usize,
    pub workers: usize,
    pub sections: Vec<Section>,
    pub dry_run: bool,
    pub retries_enabled: bool,
    pub api_key: Option<String>,
    pub embedding: EmbeddingSettings,
}

impl ExtractSettings {
    pub fn resolve(args: &ExtractArgs) -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|value| !value.is_empty());
        let embeddings_enabled = !args.no_embeddings && api_key.is_some();

        let embedding = EmbeddingSettings {
            enabled: embeddings_enabled,
            api_key: api_key.clone(),
            model_name: args.embedding_model.clone(),
            max_chars: args.embedding_max_chars,
            max_pages: args.embedding_max_pages,
        };

        Self {
            data_dir: args.data_dir.clone(),
            output_dir: args.output_dir.clone(),
            sqlite_path: args
                .sqlite_path
                .clone()
                .unwrap_or_else(|| args.output_dir.join("extractions.db")),
            limit: args.limit,
            strategy: args.strategy,
            mode: args.mode,
            provider: args.provider,
            model_name: args.model.clone(),
            retry_model: args
                .retry_model
                .clone()
                .filter(|value| !value.is_empty()),
            max_chars: args.max_chars,
            focus_min_chars: args.focus_min_chars,
            workers: args.workers.max(1),
            sections: resolve_sections(&args.sections),
            dry_run: args.dry_run,
            retries_enabled: !args.no_retries,
            api_key,
            embedding,
        }
    }

    pub fn model_for(&self, retry: bool) -> &str {
        if retry {
            self.retry_model.as_deref().unwrap_or(&self.model_name)
        } else {
            &self.model_name
        }
    }

    pub fn page_cache_dir(&self) -> PathBuf {
        self.output_dir.join("cache").join("pages")
    }

    pub fn embedding_cache_dir(&self) -> PathBuf {
        self.output_dir.join("cache").join("embeddings")
    }

    pub fn summary(&self) -> RunSettingsSummary {
        RunSettingsSummary {
            data_dir: self.data_dir.display().to_string(),
            output_dir: self.output_dir.display().to_string(),
            sqlite_path: self.sqlite_path.display().to_string(),
            strategy: self.strategy.as_str().to_string(),
            mode: self.mode.as_str().to_string(),
            provider: self.provider.as_str().to_string(),
            model_name: self.model_name.clone(),
            retry_model: self.retry_model.clone(),
            max_chars: self.max_chars,
            focus_min_chars: self.focus_min_chars,
            workers: self.workers,
            sections: self
                .sections
                .iter()
                .map(|section| section.name().to_string())
                .collect(),
            dry_run: self.dry_run,
            retries_enabled: self.retries_enabled,
            embeddings_enabled: self.embedding.enabled,
            embedding_model: self.embedding.model_name.clone(),
            api_key: if self.api_key.is_some() { "set" } else { "unset" }.to_string(),
        }
    }
}

fn resolve_sections(requested: &[SectionArg]) -> Vec<Section> {
    if requested.is_empty() {
        return Section::ALL.to_vec();
    }

    Section::ALL
        .iter()
        .copied()
        .filter(|section| {
            requested.iter().any(|arg| {
                matches!(
                    (arg, section),
                    (SectionArg::Metadata, Section::Metadata)
                        | (SectionArg::Resources, Section::Resources)
                        | (SectionArg::Reserves, Section::Reserves)
                        | (SectionArg::Economics, Section::Economics)
                )
            })
        })
        .collect()
}

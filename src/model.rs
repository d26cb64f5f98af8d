use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// A numeric fact as reported in the source document. `raw` keeps the
/// original string even when `value` could not be parsed; all-`None`
/// means "not found", never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Quantity {
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub raw: Option<String>,
}

impl Quantity {
    pub fn has_value(&self) -> bool {
        self.value.is_some() || self.raw.is_some()
    }
}

fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProjectMetadata {
    pub project_name: Option<String>,
    pub company_name: Option<String>,
    pub location_country: Option<String>,
    pub location_region: Option<String>,
    pub report_date: Option<String>,
    pub report_date_raw: Option<String>,
    pub source_pdf: Option<String>,
}

impl ProjectMetadata {
    pub fn is_filled(&self) -> bool {
        self.project_name.as_deref().is_some_and(|v| !v.is_empty())
            || self.company_name.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MineralResource {
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub tonnes: Quantity,
    #[serde(default, deserialize_with = "null_to_default")]
    pub grade: Quantity,
    pub metal: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub contained_metal: Quantity,
    pub source_pages: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MineralReserve {
    pub category: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub tonnes: Quantity,
    #[serde(default, deserialize_with = "null_to_default")]
    pub grade: Quantity,
    pub metal: Option<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub contained_metal: Quantity,
    pub source_pages: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Economics {
    pub capex: Option<Quantity>,
    pub opex: Option<Quantity>,
    pub npv: Option<Quantity>,
    pub irr: Option<Quantity>,
    pub currency: Option<String>,
    pub source_pages: Option<String>,
}

impl Economics {
    pub fn any_present(&self) -> bool {
        self.capex.is_some() || self.opex.is_some() || self.npv.is_some() || self.irr.is_some()
    }

    pub fn any_value(&self) -> bool {
        [&self.capex, &self.opex, &self.npv, &self.irr]
            .into_iter()
            .flatten()
            .any(Quantity::has_value)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MetadataResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub metadata: ProjectMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ResourcesResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub resources: Vec<MineralResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReservesResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub reserves: Vec<MineralReserve>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EconomicsResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub economics: Economics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResult {
    #[serde(default, deserialize_with = "null_to_default")]
    pub metadata: ProjectMetadata,
    #[serde(default, deserialize_with = "null_to_default")]
    pub resources: Vec<MineralResource>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub reserves: Vec<MineralReserve>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub economics: Economics,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub resources_count: usize,
    pub reserves_count: usize,
    pub resource_empty_rows: usize,
    pub reserve_empty_rows: usize,
    pub economics_has_values: bool,
    pub metadata_filled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentDurations {
    pub page_extract_ms: u64,
    pub selection_ms: BTreeMap<String, u64>,
    pub table_extract_ms: BTreeMap<String, u64>,
    pub llm_ms: BTreeMap<String, u64>,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub source_pdf: String,
    pub sha256: Option<String>,
    pub strategy: String,
    pub sections: Vec<String>,
    pub page_count: usize,
    pub cache_hit: bool,
    pub selected_pages: BTreeMap<String, Vec<usize>>,
    pub table_counts: BTreeMap<String, usize>,
    pub table_selected: BTreeMap<String, usize>,
    pub no_reserves_pages: Vec<usize>,
    pub no_economics_pages: Vec<usize>,
    pub durations: DocumentDurations,
    pub llm_input_chars: BTreeMap<String, usize>,
    #[serde(flatten)]
    pub quality: QualityMetrics,
    pub warnings: Vec<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettingsSummary {
    pub data_dir: String,
    pub output_dir: String,
    pub sqlite_path: String,
    pub strategy: String,
    pub mode: String,
    pub provider: String,
    pub model_name: String,
    pub retry_model: Option<String>,
    pub max_chars: usize,
    pub focus_min_chars: usize,
    pub workers: usize,
    pub sections: Vec<String>,
    pub dry_run: bool,
    pub retries_enabled: bool,
    pub embeddings_enabled: bool,
    pub embedding_model: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub started_at: String,
    pub duration_ms: u64,
    pub settings: RunSettingsSummary,
    pub documents: Vec<DocumentMetrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfEntry {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub pdf_count: usize,
    pub pdfs: Vec<PdfEntry>,
}

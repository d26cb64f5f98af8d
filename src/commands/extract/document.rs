use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use schemars::schema_for;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::cli::ExtractionStrategy;
use crate::model::{
    DocumentDurations, DocumentMetrics, EconomicsResult, ExtractionResult, MetadataResult,
    ReservesResult, ResourcesResult,
};
use crate::semantic::EmbeddingStore;
use crate::util::{clamp_text, sha256_file};

use super::context::{combine_contexts, focus_context};
use super::llm;
use super::pages::extract_document_pages;
use super::patterns::{NO_ECONOMICS_PATTERNS, NO_RESERVES_PATTERNS, find_pages_with_patterns};
use super::quality::apply_quality_checks;
use super::selector::{Section, build_context, select_pages};
use super::settings::ExtractSettings;
use super::tables::{
    MAX_TABLES_PER_SECTION, TABLE_CONTEXT_MAX_CHARS, TABLE_CONTEXT_MAX_ROWS, build_table_context,
    extract_tables_for_pages, filter_tables_for_section,
};

/// Drives one document end to end. Always completes and always produces
/// a result: hard failures degrade to maximally-empty output with
/// warnings, never a document-level error.
pub fn process_document(
    pdf_path: &Path,
    settings: &ExtractSettings,
) -> (ExtractionResult, DocumentMetrics) {
    match settings.strategy {
        ExtractionStrategy::TwoStage => process_two_stage(pdf_path, settings),
        ExtractionStrategy::Single => process_single(pdf_path, settings),
    }
}

fn display_name(pdf_path: &Path) -> String {
    pdf_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| pdf_path.display().to_string())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn source_sha256(pdf_path: &Path, pdf_name: &str) -> Option<String> {
    match sha256_file(pdf_path) {
        Ok(digest) => Some(digest),
        Err(error) => {
            warn!(pdf = %pdf_name, error = %error, "failed to hash source pdf");
            None
        }
    }
}

fn join_pages(pages: &[usize]) -> String {
    pages
        .iter()
        .map(|page| page.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

fn schema_value<T: schemars::JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or(serde_json::Value::Null)
}

/// One model call for one section. A failed call is logged and stands in
/// as the schema default, which downstream treats exactly like a
/// legitimately empty extraction.
fn run_section<T>(
    context: &str,
    section: Section,
    label: &str,
    retry: bool,
    settings: &ExtractSettings,
    pdf_name: &str,
) -> (T, u64, usize)
where
    T: DeserializeOwned + Default + schemars::JsonSchema,
{
    let input_chars = context.chars().count();

    if settings.dry_run {
        info!(
            pdf = %pdf_name,
            section = label,
            retry,
            input_chars,
            "section skipped (dry run)"
        );
        return (T::default(), 0, input_chars);
    }

    let schema = schema_value::<T>();
    let clamped = clamp_text(context, settings.max_chars);
    let started = Instant::now();
    let result = match llm::extract_with_schema::<T>(
        clamped,
        settings.model_for(retry),
        settings.provider,
        settings.api_key.as_deref(),
        &schema,
        Some(llm::section_task(section)),
    ) {
        Ok(result) => result,
        Err(error) => {
            warn!(
                pdf = %pdf_name,
                section = label,
                retry,
                error = %error,
                "section extraction failed"
            );
            T::default()
        }
    };
    let duration = elapsed_ms(started);

    info!(
        pdf = %pdf_name,
        section = label,
        retry,
        duration_ms = duration,
        input_chars,
        "section extracted"
    );
    (result, duration, input_chars)
}

fn fallback_context(pages: &[String], section: Section, store: &EmbeddingStore) -> String {
    let config = section.fallback_config();
    let indices = select_pages(pages, config, store);
    build_context(pages, &indices)
}

fn score_result(result: &ExtractionResult) -> f64 {
    let mut score = 0.0_f64;
    if !result.resources.is_empty() {
        score += 1.0;
    }
    if !result.reserves.is_empty() {
        score += 1.0;
    }
    let econ = &result.economics;
    let econ_has_value = [&econ.capex, &econ.opex, &econ.npv, &econ.irr]
        .into_iter()
        .flatten()
        .any(|quantity| quantity.value.is_some());
    if econ_has_value {
        score += 1.0;
    }
    if result.metadata.is_filled() {
        score += 1.0;
    }
    score / 4.0
}

fn process_two_stage(
    pdf_path: &Path,
    settings: &ExtractSettings,
) -> (ExtractionResult, DocumentMetrics) {
    let pdf_name = display_name(pdf_path);
    let sections = settings.sections.as_slice();
    let total_started = Instant::now();
    info!(pdf = %pdf_name, strategy = "two_stage", "document start");

    let page_started = Instant::now();
    let (pages, cache_hit) = extract_document_pages(pdf_path, &settings.page_cache_dir());
    let page_extract_ms = elapsed_ms(page_started);
    info!(
        pdf = %pdf_name,
        page_count = pages.len(),
        cache_hit,
        duration_ms = page_extract_ms,
        "pages extracted"
    );

    let store = EmbeddingStore::new(settings.embedding_cache_dir(), settings.embedding.clone());

    let no_reserves_pages = find_pages_with_patterns(&pages, NO_RESERVES_PATTERNS);
    let no_economics_pages = find_pages_with_patterns(&pages, NO_ECONOMICS_PATTERNS);

    let mut contexts = BTreeMap::<Section, String>::new();
    let mut selected_pages = BTreeMap::<String, Vec<usize>>::new();
    let mut selection_ms = BTreeMap::<String, u64>::new();

    for section in sections {
        let started = Instant::now();
        let indices = select_pages(&pages, section.config(), &store);
        selection_ms.insert(section.name().to_string(), elapsed_ms(started));
        info!(
            pdf = %pdf_name,
            section = section.name(),
            pages = ?indices,
            "pages selected"
        );
        contexts.insert(*section, build_context(&pages, &indices));
        selected_pages.insert(section.name().to_string(), indices);
    }

    // Economics keeps its full context; its few values are easy to lose.
    for section in [Section::Resources, Section::Reserves] {
        if let Some(context) = contexts.remove(&section) {
            let config = section.config();
            let keywords: Vec<&str> = config
                .keywords
                .iter()
                .chain(config.table_keywords.iter())
                .copied()
                .collect();
            contexts.insert(
                section,
                focus_context(context, &keywords, settings.mode, settings.focus_min_chars),
            );
        }
    }

    let mut table_counts = BTreeMap::<String, usize>::new();
    let mut table_selected = BTreeMap::<String, usize>::new();
    let mut table_extract_ms = BTreeMap::<String, u64>::new();

    for section in [Section::Resources, Section::Reserves, Section::Economics] {
        if !sections.contains(&section) {
            continue;
        }

        let indices = selected_pages
            .get(section.name())
            .cloned()
            .unwrap_or_default();
        let started = Instant::now();
        let tables = extract_tables_for_pages(pdf_path, &indices);
        let detected = tables.len();
        let filtered = filter_tables_for_section(tables, section, MAX_TABLES_PER_SECTION);
        let duration = elapsed_ms(started);

        table_extract_ms.insert(section.name().to_string(), duration);
        table_counts.insert(section.name().to_string(), detected);
        table_selected.insert(section.name().to_string(), filtered.len());

        let table_context =
            build_table_context(&filtered, TABLE_CONTEXT_MAX_ROWS, TABLE_CONTEXT_MAX_CHARS);
        if !table_context.is_empty() {
            let text_context = contexts.remove(&section).unwrap_or_default();
            contexts.insert(
                section,
                combine_contexts(&table_context, &text_context, settings.max_chars),
            );
        }

        info!(
            pdf = %pdf_name,
            section = section.name(),
            tables = detected,
            tables_selected = filtered.len(),
            duration_ms = duration,
            "tables extracted"
        );
    }

    let mut llm_ms = BTreeMap::<String, u64>::new();
    let mut llm_input_chars = BTreeMap::<String, usize>::new();
    let mut warnings = Vec::<String>::new();

    let mut metadata_result = MetadataResult::default();
    let mut resources_result = ResourcesResult::default();
    let mut reserves_result = ReservesResult::default();
    let mut economics_result = EconomicsResult::default();

    let section_context =
        |contexts: &BTreeMap<Section, String>, section: Section| -> String {
            contexts.get(&section).cloned().unwrap_or_default()
        };

    if sections.contains(&Section::Metadata) {
        let context = section_context(&contexts, Section::Metadata);
        let (result, duration, chars) = run_section::<MetadataResult>(
            &context,
            Section::Metadata,
            "metadata",
            false,
            settings,
            &pdf_name,
        );
        metadata_result = result;
        llm_ms.insert("metadata".to_string(), duration);
        llm_input_chars.insert("metadata".to_string(), chars);
    }
    if sections.contains(&Section::Resources) {
        let context = section_context(&contexts, Section::Resources);
        let (result, duration, chars) = run_section::<ResourcesResult>(
            &context,
            Section::Resources,
            "resources",
            false,
            settings,
            &pdf_name,
        );
        resources_result = result;
        llm_ms.insert("resources".to_string(), duration);
        llm_input_chars.insert("resources".to_string(), chars);
    }
    if sections.contains(&Section::Reserves) {
        let context = section_context(&contexts, Section::Reserves);
        let (result, duration, chars) = run_section::<ReservesResult>(
            &context,
            Section::Reserves,
            "reserves",
            false,
            settings,
            &pdf_name,
        );
        reserves_result = result;
        llm_ms.insert("reserves".to_string(), duration);
        llm_input_chars.insert("reserves".to_string(), chars);
    }
    if sections.contains(&Section::Economics) {
        let context = section_context(&contexts, Section::Economics);
        let (result, duration, chars) = run_section::<EconomicsResult>(
            &context,
            Section::Economics,
            "economics",
            false,
            settings,
            &pdf_name,
        );
        economics_result = result;
        llm_ms.insert("economics".to_string(), duration);
        llm_input_chars.insert("economics".to_string(), chars);
    }

    // One retry per section, on its fallback selection, never chained.
    if !settings.dry_run {
        if sections.contains(&Section::Metadata) && !metadata_result.metadata.is_filled() {
            if settings.retries_enabled {
                warnings.push("metadata missing; retrying with fallback selection".to_string());
                let fallback = fallback_context(&pages, Section::Metadata, &store);
                if !fallback.is_empty() {
                    let (result, duration, chars) = run_section::<MetadataResult>(
                        &fallback,
                        Section::Metadata,
                        "metadata_retry",
                        true,
                        settings,
                        &pdf_name,
                    );
                    metadata_result = result;
                    llm_ms.insert("metadata_retry".to_string(), duration);
                    llm_input_chars.insert("metadata_retry".to_string(), chars);
                }
            } else {
                warnings.push("metadata missing; retries disabled".to_string());
            }
        }

        if sections.contains(&Section::Resources) && resources_result.resources.is_empty() {
            if settings.retries_enabled {
                warnings.push("resources missing; retrying with fallback selection".to_string());
                let fallback = fallback_context(&pages, Section::Resources, &store);
                if !fallback.is_empty() {
                    let (result, duration, chars) = run_section::<ResourcesResult>(
                        &fallback,
                        Section::Resources,
                        "resources_retry",
                        true,
                        settings,
                        &pdf_name,
                    );
                    resources_result = result;
                    llm_ms.insert("resources_retry".to_string(), duration);
                    llm_input_chars.insert("resources_retry".to_string(), chars);
                }
            } else {
                warnings.push("resources missing; retries disabled".to_string());
            }
        }

        if sections.contains(&Section::Reserves) && reserves_result.reserves.is_empty() {
            if settings.retries_enabled {
                warnings.push("reserves missing; retrying with fallback selection".to_string());
                let fallback = fallback_context(&pages, Section::Reserves, &store);
                if !fallback.is_empty() {
                    let (result, duration, chars) = run_section::<ReservesResult>(
                        &fallback,
                        Section::Reserves,
                        "reserves_retry",
                        true,
                        settings,
                        &pdf_name,
                    );
                    reserves_result = result;
                    llm_ms.insert("reserves_retry".to_string(), duration);
                    llm_input_chars.insert("reserves_retry".to_string(), chars);
                }
            } else {
                warnings.push("reserves missing; retries disabled".to_string());
            }
        }

        if sections.contains(&Section::Economics) && !economics_result.economics.any_present() {
            if settings.retries_enabled {
                warnings.push("economics missing; retrying with fallback selection".to_string());
                let fallback = fallback_context(&pages, Section::Economics, &store);
                if !fallback.is_empty() {
                    let (result, duration, chars) = run_section::<EconomicsResult>(
                        &fallback,
                        Section::Economics,
                        "economics_retry",
                        true,
                        settings,
                        &pdf_name,
                    );
                    economics_result = result;
                    llm_ms.insert("economics_retry".to_string(), duration);
                    llm_input_chars.insert("economics_retry".to_string(), chars);
                }
            } else {
                warnings.push("economics missing; retries disabled".to_string());
            }
        }

        // An explicit negative statement turns persistent emptiness into
        // "absent in the document" rather than an extraction miss.
        if sections.contains(&Section::Reserves)
            && reserves_result.reserves.is_empty()
            && !no_reserves_pages.is_empty()
        {
            warnings.push(format!(
                "no reserves reported in document (pages: {})",
                join_pages(&no_reserves_pages)
            ));
        }
        if sections.contains(&Section::Economics)
            && !economics_result.economics.any_present()
            && !no_economics_pages.is_empty()
        {
            warnings.push(format!(
                "economics not reported in document (pages: {})",
                join_pages(&no_economics_pages)
            ));
        }
    }

    let mut result = ExtractionResult {
        metadata: metadata_result.metadata,
        resources: resources_result.resources,
        reserves: reserves_result.reserves,
        economics: economics_result.economics,
        confidence: None,
        warnings,
    };
    result.metadata.source_pdf = Some(pdf_name.clone());

    let (quality, quality_warnings) = apply_quality_checks(&mut result, sections);
    result.warnings.extend(quality_warnings);
    if settings.dry_run {
        result.warnings.push("dry_run: extraction skipped".to_string());
    }
    if result.confidence.is_none() {
        result.confidence = Some(score_result(&result));
    }

    let total_ms = elapsed_ms(total_started);
    let metrics = DocumentMetrics {
        source_pdf: pdf_name.clone(),
        sha256: source_sha256(pdf_path, &pdf_name),
        strategy: "two_stage".to_string(),
        sections: sections.iter().map(|s| s.name().to_string()).collect(),
        page_count: pages.len(),
        cache_hit,
        selected_pages,
        table_counts,
        table_selected,
        no_reserves_pages,
        no_economics_pages,
        durations: DocumentDurations {
            page_extract_ms,
            selection_ms,
            table_extract_ms,
            llm_ms,
            total_ms,
        },
        llm_input_chars,
        quality,
        warnings: result.warnings.clone(),
        confidence: result.confidence,
    };

    info!(
        pdf = %pdf_name,
        duration_ms = total_ms,
        resources = metrics.quality.resources_count,
        reserves = metrics.quality.reserves_count,
        economics_has_values = metrics.quality.economics_has_values,
        warnings = metrics.warnings.len(),
        "document end"
    );

    (result, metrics)
}

fn process_single(
    pdf_path: &Path,
    settings: &ExtractSettings,
) -> (ExtractionResult, DocumentMetrics) {
    let pdf_name = display_name(pdf_path);
    let sections = settings.sections.as_slice();
    let total_started = Instant::now();
    info!(pdf = %pdf_name, strategy = "single", "document start");

    let page_started = Instant::now();
    let (pages, cache_hit) = extract_document_pages(pdf_path, &settings.page_cache_dir());
    let page_extract_ms = elapsed_ms(page_started);

    let full_text = pages.join("\n\n");
    let clamped = clamp_text(&full_text, settings.max_chars);
    let input_chars = clamped.chars().count();

    let mut llm_ms = BTreeMap::<String, u64>::new();
    let mut result = if settings.dry_run {
        info!(pdf = %pdf_name, input_chars, "extraction skipped (dry run)");
        ExtractionResult::default()
    } else {
        let schema = schema_value::<ExtractionResult>();
        let started = Instant::now();
        let extracted = match llm::extract_with_schema::<ExtractionResult>(
            clamped,
            &settings.model_name,
            settings.provider,
            settings.api_key.as_deref(),
            &schema,
            None,
        ) {
            Ok(extracted) => extracted,
            Err(error) => {
                warn!(pdf = %pdf_name, error = %error, "document extraction failed");
                ExtractionResult::default()
            }
        };
        llm_ms.insert("full".to_string(), elapsed_ms(started));
        extracted
    };

    result.metadata.source_pdf = Some(pdf_name.clone());
    let (quality, quality_warnings) = apply_quality_checks(&mut result, sections);
    result.warnings.extend(quality_warnings);
    if settings.dry_run {
        result.warnings.push("dry_run: extraction skipped".to_string());
    }
    if result.confidence.is_none() {
        result.confidence = Some(score_result(&result));
    }

    let total_ms = elapsed_ms(total_started);
    let metrics = DocumentMetrics {
        source_pdf: pdf_name.clone(),
        sha256: source_sha256(pdf_path, &pdf_name),
        strategy: "single".to_string(),
        sections: sections.iter().map(|s| s.name().to_string()).collect(),
        page_count: pages.len(),
        cache_hit,
        selected_pages: BTreeMap::new(),
        table_counts: BTreeMap::new(),
        table_selected: BTreeMap::new(),
        no_reserves_pages: Vec::new(),
        no_economics_pages: Vec::new(),
        durations: DocumentDurations {
            page_extract_ms,
            selection_ms: BTreeMap::new(),
            table_extract_ms: BTreeMap::new(),
            llm_ms,
            total_ms,
        },
        llm_input_chars: BTreeMap::from([("full".to_string(), input_chars)]),
        quality,
        warnings: result.warnings.clone(),
        confidence: result.confidence,
    };

    info!(
        pdf = %pdf_name,
        duration_ms = total_ms,
        resources = metrics.quality.resources_count,
        reserves = metrics.quality.reserves_count,
        economics_has_values = metrics.quality.economics_has_values,
        warnings = metrics.warnings.len(),
        "document end"
    );

    (result, metrics)
}

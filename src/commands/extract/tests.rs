use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::cli::{ExtractionMode, ExtractionStrategy, LlmProvider};
use crate::model::{
    Economics, ExtractionResult, MineralReserve, MineralResource, Quantity, ResourcesResult,
};
use crate::semantic::{EmbeddingSettings, EmbeddingStore, cosine_similarity};
use crate::util::{clamp_text, normalize_whitespace, sha256_hex};

use super::context::{combine_contexts, extract_relevant_page_snippets, focus_context};
use super::document::process_document;
use super::llm;
use super::pages::extract_document_pages;
use super::patterns::{NO_ECONOMICS_PATTERNS, NO_RESERVES_PATTERNS, find_pages_with_patterns};
use super::quality::apply_quality_checks;
use super::selector::{
    Section, SectionConfig, build_context, is_toc_page, rank_pages, select_pages,
};
use super::settings::ExtractSettings;
use super::tables::{CandidateTable, build_table_context, filter_tables_for_section};

fn disabled_store() -> EmbeddingStore {
    EmbeddingStore::new(
        std::env::temp_dir().join("ni43101-test-embeddings"),
        EmbeddingSettings::disabled(10),
    )
}

fn pages_of(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|text| text.to_string()).collect()
}

#[test]
fn toc_page_detection() {
    let toc = "Table of Contents\n....\n1. Intro\n2. Summary\n3. More";
    assert!(is_toc_page(toc));

    let non_toc = "Executive Summary\nProject overview and objectives";
    assert!(!is_toc_page(non_toc));
}

#[test]
fn toc_detection_requires_dot_leaders_without_contents_word() {
    let figures = "List of Figures\nFigure 1 .... 4\nFigure 2 .... 9\nFigure 3 .... 12";
    assert!(is_toc_page(figures));

    let sparse = "List of Figures\nFigure 1 .... 4";
    assert!(!is_toc_page(sparse));
}

#[test]
fn select_pages_skips_toc() {
    let pages = pages_of(&[
        "Table of Contents\n....\n1. Intro\n2. Summary",
        "Mineral Reserves Table 5-1\nProven  Probable  100  0.5",
        "Background text without signals",
    ]);
    let store = disabled_store();

    let selected = select_pages(&pages, Section::Reserves.config(), &store);
    assert!(!selected.contains(&0));
    assert!(selected.contains(&1));
}

#[test]
fn select_pages_never_empty_for_nonempty_document() {
    let pages = pages_of(&["plain prose", "more prose", "and more"]);
    let store = disabled_store();

    let selected = select_pages(&pages, Section::Reserves.config(), &store);
    assert!(!selected.is_empty());
    let mut sorted = selected.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(selected, sorted);
    assert!(selected.iter().all(|idx| *idx < pages.len()));
}

#[test]
fn select_pages_expands_window_around_hits() {
    let config = SectionConfig {
        name: "reserves",
        query: "reserves",
        keywords: &["mineral reserve"],
        table_keywords: &[],
        top_k: 1,
        window: 1,
        keyword_weight: 1.0,
        table_weight: 0.0,
        numeric_weight: 0.0,
        embedding_weight: 0.0,
    };
    let pages = pages_of(&["aaa", "bbb", "mineral reserve statement", "ccc", "ddd"]);
    let store = disabled_store();

    let selected = select_pages(&pages, &config, &store);
    assert_eq!(selected, vec![1, 2, 3]);
}

#[test]
fn rank_pages_is_stable_on_ties() {
    let pages = pages_of(&["same text", "same text", "same text"]);
    let store = disabled_store();

    let ranked = rank_pages(&pages, Section::Metadata.config(), &store);
    let order: Vec<usize> = ranked.iter().map(|entry| entry.page).collect();
    assert_eq!(order, vec![0, 1, 2]);
}

#[test]
fn build_context_labels_pages_one_based_and_skips_empty() {
    let pages = pages_of(&["", "Reserves discussion"]);
    let context = build_context(&pages, &[0, 1]);
    assert_eq!(context, "Page 2:\nReserves discussion");
}

#[test]
fn clamp_text_truncates_and_is_idempotent() {
    assert_eq!(clamp_text("abcdef", 3), "abc");
    assert_eq!(clamp_text("abc", 3), "abc");

    let once = clamp_text("ééééé", 2);
    assert_eq!(once, "éé");
    assert_eq!(clamp_text(once, 2), once);
}

#[test]
fn normalize_whitespace_collapses_runs() {
    assert_eq!(normalize_whitespace("a\n\n  b\t c"), "a b c");
}

#[test]
fn combine_contexts_returns_other_side_untouched() {
    assert_eq!(combine_contexts("", "text", 100), "text");
    assert_eq!(combine_contexts("tables", "", 100), "tables");
}

#[test]
fn combine_contexts_respects_budget() {
    let table_context = "t".repeat(500);
    let text_context = "x".repeat(500);
    let combined = combine_contexts(&table_context, &text_context, 100);

    assert!(combined.len() <= 100);
    assert!(combined.contains("\n\n"));
    assert!(combined.starts_with('t'));
    assert!(combined.ends_with('x'));
}

#[test]
fn focus_context_keeps_keyword_pages_and_labels() {
    let context = "Page 1:\nintro text\nmore intro\n\nPage 2:\nmineral reserves table 5-1\n100 1.2\n\nPage 3:\nother content";
    let focused = focus_context(
        context.to_string(),
        &["mineral reserves"],
        ExtractionMode::Smart,
        10,
    );

    assert!(focused.contains("Page 2:"));
    assert!(focused.to_lowercase().contains("mineral reserves"));
    assert!(!focused.contains("Page 1:"));
}

#[test]
fn focus_context_falls_back_when_nothing_matches() {
    let context = "Page 1:\nplain line\nanother line".to_string();
    let focused = focus_context(context.clone(), &["absent keyword"], ExtractionMode::Smart, 5);
    assert_eq!(focused, context);
}

#[test]
fn focus_context_skips_short_or_full_mode_contexts() {
    let context = "Page 1:\nmineral reserves".to_string();
    let untouched = focus_context(
        context.clone(),
        &["mineral reserves"],
        ExtractionMode::Smart,
        100_000,
    );
    assert_eq!(untouched, context);

    let untouched = focus_context(context.clone(), &["mineral reserves"], ExtractionMode::Full, 5);
    assert_eq!(untouched, context);
}

#[test]
fn page_snippets_drop_pages_without_hits() {
    let context = "Page 1:\nintro text\nmore intro\n\nPage 2:\nmineral reserves table 5-1\n100 1.2\n\nPage 3:\nother content";
    let focused = extract_relevant_page_snippets(context, &["mineral reserves"], 12);

    assert!(focused.contains("Page 2:"));
    assert!(!focused.contains("Page 1:"));
    assert!(!focused.contains("Page 3:"));
}

fn sample_tables() -> Vec<CandidateTable> {
    vec![
        CandidateTable {
            page: 1,
            method: "layout",
            text: "Noise table\nA,B,C\nfoo,bar,baz".to_string(),
        },
        CandidateTable {
            page: 2,
            method: "layout",
            text: "Mineral Resource Estimate\nMeasured,Indicated,Inferred\n100,1.2,3.4"
                .to_string(),
        },
        CandidateTable {
            page: 3,
            method: "caption",
            text: "Capital Cost\nCapex,US$\n1000,2000".to_string(),
        },
    ]
}

#[test]
fn filter_tables_prefers_section_keywords() {
    let resources = filter_tables_for_section(sample_tables(), Section::Resources, 1);
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].page, 2);

    let economics = filter_tables_for_section(sample_tables(), Section::Economics, 1);
    assert_eq!(economics.len(), 1);
    assert_eq!(economics[0].page, 3);
}

#[test]
fn filter_tables_deduplicates_by_content() {
    let tables = vec![
        CandidateTable {
            page: 2,
            method: "layout",
            text: "Mineral Resource Estimate\n100,1.2,3.4".to_string(),
        },
        CandidateTable {
            page: 2,
            method: "caption",
            text: "Mineral Resource Estimate\n100,1.2,3.4".to_string(),
        },
    ];

    let filtered = filter_tables_for_section(tables, Section::Resources, 8);
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].method, "layout");
}

#[test]
fn filter_tables_keeps_all_when_every_score_is_zero() {
    let tables = vec![
        CandidateTable {
            page: 1,
            method: "layout",
            text: "alpha beta".to_string(),
        },
        CandidateTable {
            page: 2,
            method: "layout",
            text: "gamma delta".to_string(),
        },
    ];

    let filtered = filter_tables_for_section(tables, Section::Resources, 8);
    assert_eq!(filtered.len(), 2);
    assert_eq!(filtered[0].page, 1);
    assert_eq!(filtered[1].page, 2);
}

#[test]
fn table_context_labels_page_and_method() {
    let tables = vec![CandidateTable {
        page: 5,
        method: "layout",
        text: "A,B\n1,2\n3,4".to_string(),
    }];

    let context = build_table_context(&tables, 2, 100);
    assert!(context.starts_with("Page 5 (layout):"));
    assert!(context.contains("A,B"));
    assert!(!context.contains("3,4"));
}

#[test]
fn quality_filters_invalid_reserve_categories() {
    let mut result = ExtractionResult {
        reserves: vec![
            MineralReserve {
                category: Some("Measured".to_string()),
                ..MineralReserve::default()
            },
            MineralReserve {
                category: Some("Proven + Probable".to_string()),
                ..MineralReserve::default()
            },
            MineralReserve::default(),
        ],
        ..ExtractionResult::default()
    };

    let (metrics, warnings) = apply_quality_checks(&mut result, &[Section::Reserves]);

    assert_eq!(result.reserves.len(), 2);
    assert_eq!(metrics.reserves_count, 2);
    assert!(
        warnings
            .iter()
            .any(|warning| warning.contains("reserve category filtered: Measured"))
    );
}

#[test]
fn quality_warnings_are_gated_by_active_sections() {
    let mut result = ExtractionResult::default();
    let (metrics, warnings) = apply_quality_checks(&mut result, &[Section::Economics]);

    assert!(!metrics.economics_has_values);
    assert!(
        warnings
            .iter()
            .any(|warning| warning.contains("economics missing numeric values"))
    );

    let mut result = ExtractionResult::default();
    let (_, warnings) = apply_quality_checks(&mut result, &[Section::Reserves]);
    assert!(
        !warnings
            .iter()
            .any(|warning| warning.contains("economics missing numeric values"))
    );
}

#[test]
fn quality_counts_empty_rows() {
    let mut result = ExtractionResult {
        resources: vec![
            MineralResource {
                category: Some("Indicated".to_string()),
                ..MineralResource::default()
            },
            MineralResource {
                tonnes: Quantity {
                    value: Some(100.0),
                    unit: Some("Mt".to_string()),
                    raw: Some("100 Mt".to_string()),
                },
                ..MineralResource::default()
            },
        ],
        ..ExtractionResult::default()
    };

    let (metrics, warnings) = apply_quality_checks(&mut result, &[Section::Resources]);
    assert_eq!(metrics.resource_empty_rows, 1);
    assert!(
        warnings
            .iter()
            .any(|warning| warning.contains("resources with empty quantities: 1"))
    );
}

#[test]
fn quality_detects_economics_values_from_raw() {
    let mut result = ExtractionResult {
        economics: Economics {
            npv: Some(Quantity {
                value: None,
                unit: None,
                raw: Some("US$250 million".to_string()),
            }),
            ..Economics::default()
        },
        ..ExtractionResult::default()
    };

    let (metrics, warnings) = apply_quality_checks(&mut result, &[Section::Economics]);
    assert!(metrics.economics_has_values);
    assert!(warnings.is_empty());
}

#[test]
fn pattern_scan_reports_one_based_pages() {
    let pages = pages_of(&[
        "General discussion of the project.",
        "No reserves conforming to CIM standards have been estimated.",
        "Capital and operating costs are not determined at this time.",
    ]);

    let reserves = find_pages_with_patterns(&pages, NO_RESERVES_PATTERNS);
    let economics = find_pages_with_patterns(&pages, NO_ECONOMICS_PATTERNS);
    assert_eq!(reserves, vec![2]);
    assert_eq!(economics, vec![3]);
}

#[test]
fn parse_json_object_repairs_prose_wrapped_output() {
    let direct = llm::parse_json_object("{\"a\": 1}").unwrap();
    assert_eq!(direct["a"], 1);

    let wrapped = llm::parse_json_object("Here you go: {\"a\": {\"b\": 2}, \"c\": \"}\"} done")
        .unwrap();
    assert_eq!(wrapped["a"]["b"], 2);
    assert_eq!(wrapped["c"], "}");

    assert!(llm::parse_json_object("no json here").is_err());
}

#[test]
fn mock_provider_returns_schema_default() {
    let result: ResourcesResult = llm::extract_with_schema(
        "irrelevant",
        "models/gemini-flash-latest",
        LlmProvider::Mock,
        None,
        &serde_json::Value::Null,
        None,
    )
    .unwrap();

    assert!(result.resources.is_empty());
}

#[test]
fn null_quantities_deserialize_to_defaults() {
    let row: MineralResource = serde_json::from_value(serde_json::json!({
        "category": "Measured",
        "tonnes": null,
        "grade": { "value": 1.5, "unit": "g/t" },
    }))
    .unwrap();

    assert!(row.tonnes.value.is_none());
    assert!(row.tonnes.raw.is_none());
    assert_eq!(row.grade.value, Some(1.5));

    let result: ExtractionResult = serde_json::from_value(serde_json::json!({
        "metadata": null,
        "resources": null,
    }))
    .unwrap();
    assert!(result.resources.is_empty());
    assert!(result.metadata.project_name.is_none());
}

#[test]
fn cosine_similarity_handles_degenerate_inputs() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);

    let similarity = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
    assert!((similarity - 1.0).abs() < 1e-9);
}

#[test]
fn embedding_store_disabled_returns_none() {
    let store = disabled_store();
    assert!(store.embed_text("anything").is_none());
}

#[test]
fn embedding_store_serves_cached_vectors_without_calling_out() {
    let dir = tempfile::tempdir().unwrap();
    let settings = EmbeddingSettings {
        enabled: true,
        api_key: Some("test-key".to_string()),
        model_name: "models/test-embedding".to_string(),
        max_chars: 100,
        max_pages: 10,
    };

    let digest = sha256_hex("models/test-embedding::hello");
    fs::write(
        dir.path().join(format!("{digest}.json")),
        "{\"embedding\": [1.0, 2.0, 3.0]}",
    )
    .unwrap();

    let store = EmbeddingStore::new(dir.path().to_path_buf(), settings);
    assert_eq!(store.embed_text("hello"), Some(vec![1.0, 2.0, 3.0]));
}

#[test]
fn page_extraction_cache_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("report.pdf");
    fs::write(&pdf_path, b"not a real pdf").unwrap();
    let cache_dir = dir.path().join("cache");

    let (first_pages, first_hit) = extract_document_pages(&pdf_path, &cache_dir);
    assert!(!first_hit);

    let (second_pages, second_hit) = extract_document_pages(&pdf_path, &cache_dir);
    assert!(second_hit);
    assert_eq!(first_pages, second_pages);
}

fn dry_run_settings(output_dir: PathBuf, strategy: ExtractionStrategy) -> ExtractSettings {
    ExtractSettings {
        data_dir: PathBuf::from("data"),
        output_dir: output_dir.clone(),
        sqlite_path: output_dir.join("extractions.db"),
        limit: None,
        strategy,
        mode: ExtractionMode::Smart,
        provider: LlmProvider::Mock,
        model_name: "models/gemini-flash-latest".to_string(),
        retry_model: None,
        max_chars: 350_000,
        focus_min_chars: 20_000,
        workers: 1,
        sections: Section::ALL.to_vec(),
        dry_run: true,
        retries_enabled: true,
        api_key: None,
        embedding: EmbeddingSettings::disabled(60),
    }
}

#[test]
fn dry_run_two_stage_completes_with_empty_result() {
    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("report.pdf");
    fs::write(&pdf_path, b"not a real pdf").unwrap();

    let settings = dry_run_settings(dir.path().join("output"), ExtractionStrategy::TwoStage);
    let (result, metrics) = process_document(&pdf_path, &settings);

    assert!(result.resources.is_empty());
    assert!(result.reserves.is_empty());
    assert_eq!(result.confidence, Some(0.0));
    assert!(
        result
            .warnings
            .iter()
            .any(|warning| warning.contains("dry_run: extraction skipped"))
    );

    assert_eq!(metrics.strategy, "two_stage");
    assert_eq!(metrics.page_count, 1);
    assert_eq!(metrics.selected_pages.len(), Section::ALL.len());
    assert_eq!(metrics.llm_input_chars.len(), Section::ALL.len());
    assert_eq!(metrics.confidence, Some(0.0));
}

#[test]
fn dry_run_single_strategy_reports_full_input() {
    let dir = tempfile::tempdir().unwrap();
    let pdf_path = dir.path().join("report.pdf");
    fs::write(&pdf_path, b"not a real pdf").unwrap();

    let settings = dry_run_settings(dir.path().join("output"), ExtractionStrategy::Single);
    let (result, metrics) = process_document(&pdf_path, &settings);

    assert!(result.metadata.source_pdf.as_deref() == Some("report.pdf"));
    assert_eq!(metrics.strategy, "single");
    assert!(metrics.selected_pages.is_empty());
    assert_eq!(
        metrics.llm_input_chars,
        BTreeMap::from([("full".to_string(), 0)])
    );
}

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::semantic::{EmbeddingStore, cosine_similarity};
use crate::util::normalize_whitespace;

const TOC_MARKERS: [&str; 4] = [
    "table of contents",
    "contents",
    "list of tables",
    "list of figures",
];

/// The four extraction topics. Each carries its page-selection tuning and
/// a broader fallback tuning used for the one retry after an empty result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Section {
    Metadata,
    Resources,
    Reserves,
    Economics,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Metadata,
        Section::Resources,
        Section::Reserves,
        Section::Economics,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Resources => "resources",
            Self::Reserves => "reserves",
            Self::Economics => "economics",
        }
    }

    pub fn config(self) -> &'static SectionConfig {
        match self {
            Self::Metadata => &METADATA_CONFIG,
            Self::Resources => &RESOURCES_CONFIG,
            Self::Reserves => &RESERVES_CONFIG,
            Self::Economics => &ECONOMICS_CONFIG,
        }
    }

    pub fn fallback_config(self) -> &'static SectionConfig {
        match self {
            Self::Metadata => &METADATA_FALLBACK,
            Self::Resources => &RESOURCES_FALLBACK,
            Self::Reserves => &RESERVES_FALLBACK,
            Self::Economics => &ECONOMICS_FALLBACK,
        }
    }
}

#[derive(Debug)]
pub struct SectionConfig {
    pub name: &'static str,
    pub query: &'static str,
    pub keywords: &'static [&'static str],
    pub table_keywords: &'static [&'static str],
    pub top_k: usize,
    pub window: usize,
    pub keyword_weight: f64,
    pub table_weight: f64,
    pub numeric_weight: f64,
    pub embedding_weight: f64,
}

const METADATA_CONFIG: SectionConfig = SectionConfig {
    name: "metadata",
    query: "technical report project name company name location country region report date effective date",
    keywords: &[
        "technical report",
        "project",
        "company",
        "location",
        "effective date",
        "report date",
    ],
    table_keywords: &[],
    top_k: 3,
    window: 0,
    keyword_weight: 0.8,
    table_weight: 0.0,
    numeric_weight: 0.1,
    embedding_weight: 1.5,
};

const RESOURCES_CONFIG: SectionConfig = SectionConfig {
    name: "resources",
    query: "mineral resources measured indicated inferred tonnes grade contained metal table",
    keywords: &[
        "mineral resource",
        "mineral resources",
        "resource estimate",
        "resource statement",
        "measured",
        "indicated",
        "inferred",
        "measured and indicated",
        "measured + indicated",
        "tonnes",
        "grade",
        "contained",
    ],
    table_keywords: &["table"],
    top_k: 6,
    window: 1,
    keyword_weight: 0.6,
    table_weight: 1.2,
    numeric_weight: 0.4,
    embedding_weight: 2.0,
};

const RESERVES_CONFIG: SectionConfig = SectionConfig {
    name: "reserves",
    query: "mineral reserves proven probable tonnes grade contained metal table",
    keywords: &[
        "mineral reserve",
        "mineral reserves",
        "reserve estimate",
        "reserve statement",
        "proven",
        "probable",
        "proven and probable",
        "proven + probable",
        "p&p",
        "tonnes",
        "grade",
        "contained",
    ],
    table_keywords: &["table"],
    top_k: 6,
    window: 1,
    keyword_weight: 0.7,
    table_weight: 1.4,
    numeric_weight: 0.4,
    embedding_weight: 2.0,
};

const ECONOMICS_CONFIG: SectionConfig = SectionConfig {
    name: "economics",
    query: "capital cost operating cost capex opex capital and operating costs npv irr cash flow payback",
    keywords: &[
        "capital cost",
        "capital costs",
        "capital expenditure",
        "operating cost",
        "operating costs",
        "operating expenditure",
        "capital and operating costs",
        "capex",
        "opex",
        "npv",
        "irr",
        "economic",
        "sustaining capital",
        "initial capital",
        "total capital",
        "cash flow",
        "payback",
        "life of mine",
        "mine life",
    ],
    table_keywords: &["table"],
    top_k: 6,
    window: 1,
    keyword_weight: 0.7,
    table_weight: 1.2,
    numeric_weight: 0.4,
    embedding_weight: 2.0,
};

const METADATA_FALLBACK: SectionConfig = SectionConfig {
    name: "metadata",
    query: "title page prepared for prepared by qualified person report date project company",
    keywords: &[
        "prepared for",
        "prepared by",
        "technical report",
        "qualified person",
        "project",
        "company",
        "effective date",
        "date",
    ],
    table_keywords: &[],
    top_k: 8,
    window: 2,
    keyword_weight: 0.7,
    table_weight: 0.0,
    numeric_weight: 0.1,
    embedding_weight: 1.5,
};

const RESOURCES_FALLBACK: SectionConfig = SectionConfig {
    name: "resources",
    query: "resource conclusions mineral resources measured indicated inferred",
    keywords: &[
        "resource conclusions",
        "historic resource",
        "mineral resources",
        "measured",
        "indicated",
        "inferred",
        "resource estimate",
        "the author believes",
        "the project has",
        "project has",
    ],
    table_keywords: &[],
    top_k: 8,
    window: 2,
    keyword_weight: 0.7,
    table_weight: 0.5,
    numeric_weight: 0.5,
    embedding_weight: 2.0,
};

const RESERVES_FALLBACK: SectionConfig = SectionConfig {
    name: "reserves",
    query: "reserve conclusions mineral reserves proven probable",
    keywords: &[
        "reserve conclusions",
        "mineral reserves",
        "reserve estimate",
        "proven",
        "probable",
    ],
    table_keywords: &[],
    top_k: 8,
    window: 2,
    keyword_weight: 0.7,
    table_weight: 0.5,
    numeric_weight: 0.5,
    embedding_weight: 2.0,
};

const ECONOMICS_FALLBACK: SectionConfig = SectionConfig {
    name: "economics",
    query: "capital cost operating cost sustaining capital LOM cash flow NPV IRR",
    keywords: &[
        "capital cost",
        "operating cost",
        "capital and operating costs",
        "sustaining capital",
        "life of mine",
        "cash flow",
        "npv",
        "irr",
    ],
    table_keywords: &[],
    top_k: 8,
    window: 2,
    keyword_weight: 0.7,
    table_weight: 0.5,
    numeric_weight: 0.5,
    embedding_weight: 2.0,
};

#[derive(Debug, Clone, Copy)]
pub struct PageScore {
    pub page: usize,
    pub score: f64,
}

pub fn is_toc_page(text: &str) -> bool {
    let lower = text.to_lowercase();
    if !TOC_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return false;
    }
    if lower.contains("contents") {
        return true;
    }
    let dot_lines = text.lines().filter(|line| line.contains("....")).count();
    dot_lines >= 3
}

fn toc_page_set(page_texts: &[String]) -> HashSet<usize> {
    page_texts
        .iter()
        .enumerate()
        .filter(|(_, text)| is_toc_page(text))
        .map(|(idx, _)| idx)
        .collect()
}

fn keyword_hits<'a>(lower: &str, keywords: impl Iterator<Item = &'a &'a str>) -> usize {
    keywords.filter(|keyword| lower.contains(**keyword)).count()
}

fn numeric_density(text: &str) -> f64 {
    let mut tokens = 0_usize;
    let mut numeric = 0_usize;
    for token in text.split(|character: char| {
        !(character.is_ascii_alphanumeric() || matches!(character, '.' | '%' | '/' | '-'))
    }) {
        if token.is_empty() {
            continue;
        }
        tokens += 1;
        if token.chars().any(|character| character.is_ascii_digit()) {
            numeric += 1;
        }
    }

    if tokens == 0 {
        0.0
    } else {
        numeric as f64 / tokens as f64
    }
}

fn has_table_signal(text: &str, lower: &str) -> bool {
    if lower.contains("table") {
        return true;
    }

    text.lines().any(|line| {
        line.matches("  ").count() >= 2
            && line
                .chars()
                .filter(|character| character.is_ascii_digit())
                .count()
                >= 2
    })
}

fn sort_descending(scores: &mut [PageScore]) {
    // Stable: equal scores keep original page order.
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Scores every non-TOC page against a section's configuration and
/// returns the pages sorted by descending composite score.
pub fn rank_pages(
    page_texts: &[String],
    config: &SectionConfig,
    store: &EmbeddingStore,
) -> Vec<PageScore> {
    let table_number = Regex::new(r"(?i)\btable\s+\d+(?:[-.]\d+)?").ok();
    let toc_pages = toc_page_set(page_texts);

    let mut base_scores = Vec::<PageScore>::new();
    for (idx, text) in page_texts.iter().enumerate() {
        if toc_pages.contains(&idx) {
            continue;
        }

        let lower = text.to_lowercase();
        let hits = keyword_hits(
            &lower,
            config.keywords.iter().chain(config.table_keywords.iter()),
        );
        let table_hit = has_table_signal(text, &lower);
        let number_hit = table_number
            .as_ref()
            .map(|pattern| pattern.is_match(text))
            .unwrap_or(false);
        let density = numeric_density(text);

        let score = hits as f64 * config.keyword_weight
            + if table_hit { config.table_weight } else { 0.0 }
            + if number_hit {
                config.table_weight * 0.5
            } else {
                0.0
            }
            + density * config.numeric_weight;
        base_scores.push(PageScore { page: idx, score });
    }

    // Bound the semantic-similarity calls: every positive-scoring page is a
    // candidate, unless there are none (or too many), in which case the top
    // pages by base score stand in.
    let max_pages = store.settings.max_pages.max(1);
    let mut candidates: Vec<usize> = base_scores
        .iter()
        .filter(|entry| entry.score > 0.0)
        .map(|entry| entry.page)
        .collect();
    if candidates.is_empty() || candidates.len() > max_pages {
        let mut by_score = base_scores.clone();
        sort_descending(&mut by_score);
        candidates = by_score
            .iter()
            .take(max_pages)
            .map(|entry| entry.page)
            .collect();
    }

    let mut similarity = HashMap::<usize, f64>::new();
    if store.is_enabled() {
        if let Some(query_embedding) = store.embed_text(config.query) {
            for idx in &candidates {
                if let Some(page_embedding) = store.embed_text(&page_texts[*idx]) {
                    similarity.insert(*idx, cosine_similarity(&page_embedding, &query_embedding));
                }
            }
        }
    }

    let mut ranked: Vec<PageScore> = base_scores
        .iter()
        .map(|entry| PageScore {
            page: entry.page,
            score: entry.score
                + similarity.get(&entry.page).copied().unwrap_or(0.0) * config.embedding_weight,
        })
        .collect();
    sort_descending(&mut ranked);
    ranked
}

/// Turns a ranking into the concrete page set for a section: top-k
/// positive pages (or top-k regardless when nothing scored), expanded by
/// the section window, TOC pages removed, sorted and deduplicated.
pub fn select_pages(
    page_texts: &[String],
    config: &SectionConfig,
    store: &EmbeddingStore,
) -> Vec<usize> {
    let toc_pages = toc_page_set(page_texts);
    let ranked = rank_pages(page_texts, config, store);

    let mut selected: Vec<usize> = ranked
        .iter()
        .take(config.top_k)
        .filter(|entry| entry.score > 0.0)
        .map(|entry| entry.page)
        .collect();
    if selected.is_empty() {
        selected = ranked
            .iter()
            .take(config.top_k)
            .map(|entry| entry.page)
            .collect();
    }

    let mut expanded = HashSet::<usize>::new();
    for page in selected {
        let start = page.saturating_sub(config.window);
        let end = (page + config.window + 1).min(page_texts.len());
        expanded.extend(start..end);
    }
    for toc in &toc_pages {
        expanded.remove(toc);
    }

    let mut pages: Vec<usize> = expanded.into_iter().collect();
    pages.sort_unstable();
    pages
}

/// Joins the selected pages into one labeled blob; the `Page N:` labels
/// are what lets the model cite source pages.
pub fn build_context(page_texts: &[String], page_indices: &[usize]) -> String {
    let mut chunks = Vec::<String>::new();
    for idx in page_indices {
        let Some(text) = page_texts.get(*idx) else {
            continue;
        };
        if normalize_whitespace(text).is_empty() {
            continue;
        }
        chunks.push(format!("Page {}:\n{}", idx + 1, text.trim()));
    }
    chunks.join("\n\n")
}
